//! Enquiry documents.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A student enquiry against an institution (or one of its courses).
///
/// `enquiry_type` is free-form text from the enquiry form; lead counting
/// matches it case-insensitively against the known lead types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Enquiry {
    /// Document ID
    pub id: String,

    /// Institution the enquiry targets
    pub institution_id: String,

    /// Optional course the enquiry is about
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_id: Option<String>,

    /// Name entered on the enquiry form
    pub student_name: String,

    /// Contact email
    pub email: String,

    /// Contact phone
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    /// Enquiry kind ("callback", "demo", "general", ...)
    pub enquiry_type: String,

    /// Free-form message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the enquiry was submitted
    pub created_at: DateTime<Utc>,
}

impl Enquiry {
    /// Whether this enquiry counts as a lead for rollup purposes.
    pub fn is_lead(&self) -> bool {
        let t = self.enquiry_type.to_lowercase();
        t == "callback" || t == "demo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enquiry(enquiry_type: &str) -> Enquiry {
        Enquiry {
            id: "e1".to_string(),
            institution_id: "i1".to_string(),
            course_id: None,
            student_name: "Asha".to_string(),
            email: "asha@example.com".to_string(),
            phone: None,
            enquiry_type: enquiry_type.to_string(),
            message: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn lead_matching_is_case_insensitive() {
        assert!(enquiry("Callback").is_lead());
        assert!(enquiry("DEMO").is_lead());
        assert!(!enquiry("general").is_lead());
    }
}
