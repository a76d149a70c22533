//! Persisted notification records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::realtime::Room;

/// Who a notification is addressed to. The recipient type determines
/// which target id field must be set and which room the fan-out worker
/// publishes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecipientType {
    Institution,
    Admin,
    Student,
    Branch,
}

/// A notification as submitted for persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewNotification {
    pub title: String,
    pub description: String,
    pub category: String,
    pub recipient: RecipientType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,
    /// Arbitrary extra context rendered by the UI
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A persisted notification. Never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Document ID
    pub id: String,

    pub title: String,
    pub description: String,
    pub category: String,
    pub recipient: RecipientType,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<String>,

    #[serde(default)]
    pub metadata: serde_json::Value,

    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Resolve the single room this notification broadcasts to.
    ///
    /// Returns `None` when the id field for the recipient type is absent
    /// or empty; the fan-out worker then skips the publish, the durable
    /// write already happened.
    pub fn target_room(&self) -> Option<Room> {
        let non_empty = |id: &Option<String>| {
            id.as_deref().filter(|s| !s.is_empty()).map(str::to_string)
        };
        match self.recipient {
            RecipientType::Institution => non_empty(&self.institution_id).map(Room::Institution),
            RecipientType::Admin => non_empty(&self.admin_id).map(Room::Admin),
            RecipientType::Student => non_empty(&self.student_id).map(Room::Student),
            RecipientType::Branch => non_empty(&self.branch_id).map(Room::Branch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(recipient: RecipientType) -> Notification {
        Notification {
            id: "n1".to_string(),
            title: "Payment received".to_string(),
            description: "Your order is confirmed".to_string(),
            category: "payment".to_string(),
            recipient,
            institution_id: None,
            admin_id: None,
            student_id: None,
            branch_id: None,
            metadata: serde_json::Value::Null,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn recipient_type_selects_exactly_one_room() {
        let mut n = notification(RecipientType::Student);
        n.student_id = Some("st_1".to_string());
        // An unrelated id must not influence room resolution.
        n.institution_id = Some("i_1".to_string());
        assert_eq!(n.target_room(), Some(Room::Student("st_1".to_string())));
    }

    #[test]
    fn missing_target_id_resolves_to_no_room() {
        let n = notification(RecipientType::Branch);
        assert_eq!(n.target_room(), None);

        let mut n = notification(RecipientType::Institution);
        n.institution_id = Some(String::new());
        assert_eq!(n.target_room(), None);
    }

    #[test]
    fn recipient_type_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&RecipientType::Institution).unwrap();
        assert_eq!(json, "\"INSTITUTION\"");
    }
}
