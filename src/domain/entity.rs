//! Entity-type vocabulary.
//!
//! Detectors emit free-form labels; everything downstream dispatches on
//! [`EntityType`]. Adding a type is a compile-time-checked change to every
//! exhaustive match in the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of sensitive entity a span covers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Person,
    Location,
    Address,
    Organization,
    DateTime,
    Dob,
    Age,
    PhoneNumber,
    Email,
    Ssn,
    Mrn,
    Id,
    License,
    BankNumber,
    CreditCard,
    ZipCode,
    Url,
    Title,
    Nrp,
    /// Span forced into redaction by a reviewer deny list.
    ReviewerFlag,
    /// Any label the pipeline does not know. Passed through unmodified.
    Other(String),
}

impl EntityType {
    /// Maps a detector label (including known aliases) onto an entity type.
    ///
    /// Matching is case-insensitive. Unknown labels become [`EntityType::Other`]
    /// carrying the original label.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "PERSON" | "PER" | "PATIENT" | "STAFF" | "HCW" => Self::Person,
            "LOCATION" | "LOC" | "GPE" | "US_CITY" | "CITY" | "HOSP" | "HOSPITAL"
            | "FACILITY" => Self::Location,
            "ADDRESS" | "STREET_ADDRESS" => Self::Address,
            "ORGANIZATION" | "ORG" | "PATORG" | "VENDOR" => Self::Organization,
            "DATE_TIME" | "DATE" | "TIME" => Self::DateTime,
            "DOB" | "DATE_OF_BIRTH" => Self::Dob,
            "AGE" => Self::Age,
            "PHONE_NUMBER" | "PHONE" | "PHONENUMBER" => Self::PhoneNumber,
            "EMAIL" | "EMAIL_ADDRESS" => Self::Email,
            "SSN" | "US_SSN" => Self::Ssn,
            "MRN" | "MEDICAL_RECORD_NUMBER" => Self::Mrn,
            "ID" => Self::Id,
            "LICENSE" | "US_DRIVER_LICENSE" | "DRIVER_LICENSE" => Self::License,
            "US_BANK_NUMBER" | "BANK_NUMBER" => Self::BankNumber,
            "CREDIT_CARD" => Self::CreditCard,
            "ZIPCODE" | "ZIP_CODE" => Self::ZipCode,
            "URL" => Self::Url,
            "TITLE" => Self::Title,
            "NRP" => Self::Nrp,
            "REVIEWER_FLAG" | "HITL" => Self::ReviewerFlag,
            _ => Self::Other(label.trim().to_string()),
        }
    }

    /// Canonical label used in exports and configuration files.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Person => "PERSON",
            Self::Location => "LOCATION",
            Self::Address => "ADDRESS",
            Self::Organization => "ORGANIZATION",
            Self::DateTime => "DATE_TIME",
            Self::Dob => "DOB",
            Self::Age => "AGE",
            Self::PhoneNumber => "PHONE_NUMBER",
            Self::Email => "EMAIL",
            Self::Ssn => "SSN",
            Self::Mrn => "MRN",
            Self::Id => "ID",
            Self::License => "LICENSE",
            Self::BankNumber => "BANK_NUMBER",
            Self::CreditCard => "CREDIT_CARD",
            Self::ZipCode => "ZIPCODE",
            Self::Url => "URL",
            Self::Title => "TITLE",
            Self::Nrp => "NRP",
            Self::ReviewerFlag => "REVIEWER_FLAG",
            Self::Other(label) => label,
        }
    }

    /// Returns true for types whose surface forms are clustered into identities.
    pub fn is_person(&self) -> bool {
        matches!(self, Self::Person)
    }

    /// Returns true for date-like types that share the session day-shift.
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::DateTime | Self::Dob)
    }
}

impl From<String> for EntityType {
    fn from(label: String) -> Self {
        Self::parse(&label)
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aliases() {
        assert_eq!(EntityType::parse("GPE"), EntityType::Location);
        assert_eq!(EntityType::parse("us_ssn"), EntityType::Ssn);
        assert_eq!(EntityType::parse("EMAIL_ADDRESS"), EntityType::Email);
        assert_eq!(EntityType::parse("HITL"), EntityType::ReviewerFlag);
        assert_eq!(EntityType::parse("ZIP_CODE"), EntityType::ZipCode);
    }

    #[test]
    fn test_unknown_label_is_preserved() {
        let entity = EntityType::parse("MONEY");
        assert_eq!(entity, EntityType::Other("MONEY".to_string()));
        assert_eq!(entity.as_str(), "MONEY");
    }

    #[test]
    fn test_serde_uses_canonical_label() {
        let json = serde_json::to_string(&EntityType::DateTime).unwrap();
        assert_eq!(json, "\"DATE_TIME\"");
        let parsed: EntityType = serde_json::from_str("\"DATE\"").unwrap();
        assert_eq!(parsed, EntityType::DateTime);
    }
}
