//! Power of Attorney document: built from the signed POA form, rendered to
//! PDF and attached to the negotiation case as a multipart upload.

use std::io::BufWriter;

use chrono::NaiveDate;
use printpdf::*;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::UploadFile;
use crate::validation::{field_text, poa_schema, ValidationErrors};

pub const POA_FILE_NAME: &str = "power_of_attorney.pdf";

#[derive(Debug, Error)]
pub enum PoaError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error("PDF rendering failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoaDocument {
    pub principal_name: String,
    pub principal_address: String,
    pub principal_date_of_birth: String,
    pub agent_name: String,
    pub provider_name: String,
    pub account_number: Option<String>,
    pub signature: String,
    pub signed_date: NaiveDate,
}

impl PoaDocument {
    /// Validate the POA form and collect its fields.
    pub fn from_form(form: &Map<String, Value>) -> Result<Self, PoaError> {
        poa_schema().validate(form)?;

        let text = |field: &str| field_text(form, field).trim().to_string();
        let signed_date = NaiveDate::parse_from_str(&text("signedDate"), "%Y-%m-%d").map_err(|_| {
            let mut errors = ValidationErrors::default();
            errors
                .0
                .insert("signedDate".to_string(), "Enter the date as YYYY-MM-DD".to_string());
            PoaError::Validation(errors)
        })?;
        let account_number = Some(text("accountNumber")).filter(|s| !s.is_empty());

        Ok(Self {
            principal_name: text("principalName"),
            principal_address: text("principalAddress"),
            principal_date_of_birth: text("principalDateOfBirth"),
            agent_name: text("agentName"),
            provider_name: text("providerName"),
            account_number,
            signature: text("signature"),
            signed_date,
        })
    }

    pub fn title(&self) -> &'static str {
        "Limited Power of Attorney for Medical Billing"
    }

    /// Body paragraphs, in print order.
    pub fn authorization_text(&self) -> Vec<String> {
        let mut paragraphs = vec![
            format!(
                "I, {}, residing at {}, born {}, hereby appoint {} as my agent \
                 to act on my behalf in matters concerning my medical bills.",
                self.principal_name, self.principal_address, self.principal_date_of_birth, self.agent_name
            ),
            format!(
                "My agent may request itemized statements, review charges, dispute errors and \
                 negotiate reductions of the balance owed to {}.",
                self.provider_name
            ),
        ];
        if let Some(account) = &self.account_number {
            paragraphs.push(format!("This authorization covers account number {account}."));
        }
        paragraphs.push(
            "This authorization does not permit my agent to make payments, sign settlements \
             that increase what I owe, or make decisions about my medical care. I may revoke \
             it at any time in writing."
                .to_string(),
        );
        paragraphs
    }

    pub fn to_pdf(&self) -> Result<Vec<u8>, PoaError> {
        generate_poa_pdf(self)
    }

    /// PDF wrapped as the attachment of a negotiation case submit.
    pub fn to_upload_file(&self) -> Result<UploadFile, PoaError> {
        Ok(UploadFile::with_mime(POA_FILE_NAME, "application/pdf", self.to_pdf()?))
    }
}

// ─── PDF generation ───────────────────────────────────────────────────────────

/// Renders the POA on one A4 page. Returns PDF bytes.
pub fn generate_poa_pdf(poa: &PoaDocument) -> Result<Vec<u8>, PoaError> {
    let (doc, page1, layer1) = PdfDocument::new(poa.title(), Mm(210.0), Mm(297.0), "Layer 1");
    let layer = doc.get_page(page1).get_layer(layer1);
    let font = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| PoaError::Render(format!("PDF font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| PoaError::Render(format!("PDF font error: {e}")))?;

    let mut y = Mm(275.0);

    layer.use_text(poa.title(), 15.0, Mm(20.0), y, &bold);
    y -= Mm(12.0);

    // Parties
    layer.use_text("PRINCIPAL:", 10.0, Mm(20.0), y, &bold);
    layer.use_text(&poa.principal_name, 10.0, Mm(55.0), y, &font);
    y -= Mm(5.5);
    layer.use_text("AGENT:", 10.0, Mm(20.0), y, &bold);
    layer.use_text(&poa.agent_name, 10.0, Mm(55.0), y, &font);
    y -= Mm(5.5);
    layer.use_text("PROVIDER:", 10.0, Mm(20.0), y, &bold);
    layer.use_text(&poa.provider_name, 10.0, Mm(55.0), y, &font);
    y -= Mm(5.5);
    if let Some(account) = &poa.account_number {
        layer.use_text("ACCOUNT:", 10.0, Mm(20.0), y, &bold);
        layer.use_text(account, 10.0, Mm(55.0), y, &font);
        y -= Mm(5.5);
    }
    y -= Mm(6.0);

    // Authorization
    layer.use_text("AUTHORIZATION", 11.0, Mm(20.0), y, &bold);
    y -= Mm(7.0);
    for paragraph in poa.authorization_text() {
        for line in wrap_text(&paragraph, 90) {
            layer.use_text(&line, 10.0, Mm(20.0), y, &font);
            y -= Mm(5.0);
        }
        y -= Mm(3.0);
    }

    // Signature block
    y -= Mm(12.0);
    layer.use_text(&poa.signature, 12.0, Mm(20.0), y, &font);
    layer.use_text(poa.signed_date.format("%B %-d, %Y").to_string(), 10.0, Mm(130.0), y, &font);
    y -= Mm(2.5);
    layer.use_text("_".repeat(40), 10.0, Mm(20.0), y, &font);
    layer.use_text("_".repeat(25), 10.0, Mm(130.0), y, &font);
    y -= Mm(5.0);
    layer.use_text("Signature of principal", 8.0, Mm(20.0), y, &font);
    layer.use_text("Date", 8.0, Mm(130.0), y, &font);

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| PoaError::Render(format!("PDF save error: {e}")))?;
    let bytes = buf
        .into_inner()
        .map_err(|e| PoaError::Render(format!("PDF buffer error: {e}")))?;
    tracing::info!(size = bytes.len(), "POA document rendered");
    Ok(bytes)
}

/// Greedy word wrap on character count.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if !current.is_empty() && current.chars().count() + word.chars().count() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form() -> Map<String, Value> {
        match json!({
            "principalName": "Jane Doe",
            "principalAddress": "12 Elm Street, Springfield",
            "principalDateOfBirth": "1980-04-02",
            "agentName": "BillPilot Advocacy Services",
            "providerName": "St. Mary Hospital",
            "accountNumber": "ACC-2024-77",
            "signature": "jane  doe",
            "signedDate": "2024-05-10"
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn builds_from_valid_form() {
        let poa = PoaDocument::from_form(&form()).unwrap();
        assert_eq!(poa.signed_date, NaiveDate::from_ymd_opt(2024, 5, 10).unwrap());
        assert_eq!(poa.account_number.as_deref(), Some("ACC-2024-77"));
        assert!(poa.authorization_text()[0].contains("BillPilot Advocacy Services"));
        assert!(poa
            .authorization_text()
            .iter()
            .any(|p| p.contains("ACC-2024-77")));
    }

    #[test]
    fn mismatched_signature_is_rejected() {
        let mut f = form();
        f.insert("signature".into(), json!("John Smith"));
        match PoaDocument::from_form(&f) {
            Err(PoaError::Validation(errors)) => assert!(errors.get("signature").is_some()),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn renders_pdf_bytes() {
        let poa = PoaDocument::from_form(&form()).unwrap();
        let bytes = generate_poa_pdf(&poa).unwrap();
        assert!(bytes.starts_with(b"%PDF"));

        let upload = poa.to_upload_file().unwrap();
        assert_eq!(upload.file_name, POA_FILE_NAME);
        assert_eq!(upload.mime_type, "application/pdf");
        assert!(upload.bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn optional_account_is_left_out() {
        let mut f = form();
        f.insert("accountNumber".into(), json!(""));
        let poa = PoaDocument::from_form(&f).unwrap();
        assert_eq!(poa.account_number, None);
        assert_eq!(poa.authorization_text().len(), 3);
    }

    #[test]
    fn wrap_respects_width() {
        let lines = wrap_text("one two three four five six", 9);
        assert_eq!(lines, vec!["one two", "three", "four five", "six"]);
        assert!(wrap_text("", 10).is_empty());
    }
}
