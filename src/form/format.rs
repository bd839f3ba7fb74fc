//! Per-field input formatters.
//!
//! Formatting is data: each field name maps to a [`FieldFormat`], and the
//! form applies it on every keystroke and again on blur.

use std::sync::LazyLock;

use regex::Regex;

static SPACE_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r" {2,}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// `(XXX) XXX-XXXX`
    Phone,
    /// `XXX-XX-XXXX`
    Ssn,
    /// `XX-XXXXXXX`
    TaxId,
    /// Digits and a single decimal point.
    Amount,
    /// Runs of spaces collapse while typing; trimmed on blur.
    FreeText,
    Plain,
}

const NEGOTIATION_FORMATS: &[(&str, FieldFormat)] = &[
    ("patientPhone", FieldFormat::Phone),
    ("hospitalPhone", FieldFormat::Phone),
    ("patientSsn", FieldFormat::Ssn),
    ("hospitalTaxId", FieldFormat::TaxId),
    ("requestedDiscountValue", FieldFormat::Amount),
    ("patientName", FieldFormat::FreeText),
    ("patientAddress", FieldFormat::FreeText),
    ("hospitalProviderName", FieldFormat::FreeText),
    ("hospitalAddress", FieldFormat::FreeText),
    ("insuranceProviderName", FieldFormat::FreeText),
    ("notes", FieldFormat::FreeText),
];

/// Formatter registered for a negotiation case field. Unknown fields are
/// stored as typed.
pub fn format_for(field: &str) -> FieldFormat {
    NEGOTIATION_FORMATS
        .iter()
        .find(|(name, _)| *name == field)
        .map(|(_, format)| *format)
        .unwrap_or(FieldFormat::Plain)
}

impl FieldFormat {
    /// Transform applied while typing.
    pub fn apply(self, raw: &str) -> String {
        match self {
            FieldFormat::Phone => format_phone(raw),
            FieldFormat::Ssn => group_digits(raw, &[3, 2, 4], "-"),
            FieldFormat::TaxId => group_digits(raw, &[2, 7], "-"),
            FieldFormat::Amount => format_amount(raw),
            FieldFormat::FreeText => SPACE_RUN.replace_all(raw, " ").into_owned(),
            FieldFormat::Plain => raw.to_string(),
        }
    }

    /// Transform applied when the field loses focus.
    pub fn on_blur(self, value: &str) -> String {
        match self {
            FieldFormat::FreeText => self.apply(value.trim()),
            FieldFormat::Plain => value.to_string(),
            _ => self.apply(value),
        }
    }
}

fn digits(raw: &str, max: usize) -> String {
    raw.chars().filter(char::is_ascii_digit).take(max).collect()
}

/// Non-digits are dropped; partial input formats as far as it goes.
pub fn format_phone(raw: &str) -> String {
    let d = digits(raw, 10);
    match d.len() {
        0..=3 => d,
        4..=6 => format!("({}) {}", &d[..3], &d[3..]),
        _ => format!("({}) {}-{}", &d[..3], &d[3..6], &d[6..]),
    }
}

/// Split the digits of `raw` into groups of the given sizes, joined by
/// `sep`. Trailing groups are left out until a digit lands in them.
fn group_digits(raw: &str, groups: &[usize], sep: &str) -> String {
    let d = digits(raw, groups.iter().sum());
    let mut parts = Vec::with_capacity(groups.len());
    let mut start = 0;
    for size in groups {
        if start >= d.len() {
            break;
        }
        let end = (start + size).min(d.len());
        parts.push(&d[start..end]);
        start = end;
    }
    parts.join(sep)
}

fn format_amount(raw: &str) -> String {
    let mut seen_point = false;
    raw.chars()
        .filter(|c| match *c {
            '0'..='9' => true,
            '.' if !seen_point => {
                seen_point = true;
                true
            }
            _ => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_formats_incrementally() {
        let mut value = String::new();
        let mut seen = Vec::new();
        for c in "5551234567".chars() {
            value.push(c);
            value = format_phone(&value);
            seen.push(value.clone());
        }
        assert_eq!(seen[2], "555");
        assert_eq!(seen[3], "(555) 1");
        assert_eq!(seen[5], "(555) 123");
        assert_eq!(seen[6], "(555) 123-4");
        assert_eq!(value, "(555) 123-4567");
    }

    #[test]
    fn phone_strips_non_digits() {
        assert_eq!(format_phone("555.123.4567"), "(555) 123-4567");
        assert_eq!(format_phone("+1 (555) abc"), "(155) 5");
        assert_eq!(format_phone("55512345678999"), "(555) 123-4567");
        assert_eq!(format_phone(""), "");
    }

    #[test]
    fn ssn_and_tax_id_grouping() {
        assert_eq!(FieldFormat::Ssn.apply("123"), "123");
        assert_eq!(FieldFormat::Ssn.apply("1234"), "123-4");
        assert_eq!(FieldFormat::Ssn.apply("123456789"), "123-45-6789");
        assert_eq!(FieldFormat::Ssn.apply("123-45-67890"), "123-45-6789");
        assert_eq!(FieldFormat::TaxId.apply("12"), "12");
        assert_eq!(FieldFormat::TaxId.apply("123456789"), "12-3456789");
    }

    #[test]
    fn free_text_collapses_then_trims_on_blur() {
        let typed = FieldFormat::FreeText.apply("St.  Mary   Hospital ");
        assert_eq!(typed, "St. Mary Hospital ");
        assert_eq!(FieldFormat::FreeText.on_blur("  St. Mary  "), "St. Mary");
    }

    #[test]
    fn amount_keeps_single_point() {
        assert_eq!(FieldFormat::Amount.apply("$1,250.50.1"), "1250.501");
        assert_eq!(FieldFormat::Amount.apply("15%"), "15");
    }

    #[test]
    fn registry_lookup() {
        assert_eq!(format_for("hospitalPhone"), FieldFormat::Phone);
        assert_eq!(format_for("hospitalTaxId"), FieldFormat::TaxId);
        assert_eq!(format_for("accountNumber"), FieldFormat::Plain);
    }
}
