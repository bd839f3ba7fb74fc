use super::ModelError;

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// Wire format is the string form, so serde goes through the same table.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = ModelError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(ModelError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

str_enum!(BillStatus {
    Uploaded => "uploaded",
    Parsing => "parsing",
    ParseFailed => "parse_failed",
    WaitingUserInput => "waiting_user_input",
    UserInputReceived => "user_input_received",
    WaitingProviderInput => "waiting_provider_input",
    ProviderInputReceived => "provider_input_received",
    ReadyForNegotiation => "ready_for_negotiation",
    NegotiationInitiated => "negotiation_initiated",
});

str_enum!(NegotiationStatus {
    Pending => "Pending",
    Negotiating => "Negotiating",
    UnderReview => "Under review",
    InProgress => "In Progress",
    Completed => "Completed",
});

str_enum!(DiscountType {
    Percentage => "percentage",
    FixedAmount => "fixed_amount",
});

impl BillStatus {
    /// Server is still working on the file.
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Uploaded | Self::Parsing)
    }

    /// Only failed parses expose the Retry action.
    pub fn can_retry(&self) -> bool {
        matches!(self, Self::ParseFailed)
    }

    /// The patient has something to do before the bill moves on.
    pub fn needs_user_input(&self) -> bool {
        matches!(self, Self::WaitingUserInput)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Uploaded => "Uploaded",
            Self::Parsing => "Analyzing",
            Self::ParseFailed => "Analysis failed",
            Self::WaitingUserInput => "Needs your input",
            Self::UserInputReceived => "Input received",
            Self::WaitingProviderInput => "Waiting on provider",
            Self::ProviderInputReceived => "Provider responded",
            Self::ReadyForNegotiation => "Ready to negotiate",
            Self::NegotiationInitiated => "Negotiation started",
        }
    }
}

impl NegotiationStatus {
    /// Cases in a terminal state cannot be edited.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn bill_status_round_trip() {
        for (variant, s) in [
            (BillStatus::Uploaded, "uploaded"),
            (BillStatus::Parsing, "parsing"),
            (BillStatus::ParseFailed, "parse_failed"),
            (BillStatus::WaitingUserInput, "waiting_user_input"),
            (BillStatus::UserInputReceived, "user_input_received"),
            (BillStatus::WaitingProviderInput, "waiting_provider_input"),
            (BillStatus::ProviderInputReceived, "provider_input_received"),
            (BillStatus::ReadyForNegotiation, "ready_for_negotiation"),
            (BillStatus::NegotiationInitiated, "negotiation_initiated"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(BillStatus::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn negotiation_status_keeps_display_spelling() {
        assert_eq!(NegotiationStatus::UnderReview.as_str(), "Under review");
        assert_eq!(
            NegotiationStatus::from_str("In Progress").unwrap(),
            NegotiationStatus::InProgress
        );
        assert!(NegotiationStatus::from_str("in progress").is_err());
    }

    #[test]
    fn serde_uses_wire_strings() {
        let json = serde_json::to_string(&BillStatus::ReadyForNegotiation).unwrap();
        assert_eq!(json, "\"ready_for_negotiation\"");
        let parsed: NegotiationStatus = serde_json::from_str("\"Under review\"").unwrap();
        assert_eq!(parsed, NegotiationStatus::UnderReview);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(BillStatus::from_str("done").is_err());
        assert!(serde_json::from_str::<BillStatus>("\"bogus\"").is_err());
        assert!(DiscountType::from_str("").is_err());
    }

    #[test]
    fn only_parse_failures_can_retry() {
        assert!(BillStatus::ParseFailed.can_retry());
        assert!(!BillStatus::Parsing.can_retry());
        assert!(BillStatus::Parsing.is_processing());
        assert!(!BillStatus::ReadyForNegotiation.is_processing());
    }
}
