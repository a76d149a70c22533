//! Realtime rooms, broadcast event envelopes and client join messages.
//!
//! These types define the wire contract between the worker processes
//! (publishers), the gateway and connected clients.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enquiry::Enquiry;
use crate::notification::Notification;

/// A broadcast scope a connection can join. Rendered as `"<scope>:<id>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Room {
    Institution(String),
    InstitutionAdmin(String),
    Student(String),
    Branch(String),
    Program(String),
    Admin(String),
}

impl Room {
    /// Scope prefix used in the room key.
    pub fn scope(&self) -> &'static str {
        match self {
            Room::Institution(_) => "institution",
            Room::InstitutionAdmin(_) => "institutionAdmin",
            Room::Student(_) => "student",
            Room::Branch(_) => "branch",
            Room::Program(_) => "program",
            Room::Admin(_) => "admin",
        }
    }

    /// The scoped entity id.
    pub fn id(&self) -> &str {
        match self {
            Room::Institution(id)
            | Room::InstitutionAdmin(id)
            | Room::Student(id)
            | Room::Branch(id)
            | Room::Program(id)
            | Room::Admin(id) => id,
        }
    }

    /// Room key, e.g. `institution:64af...`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.scope(), self.id())
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Events published to rooms, serialized as `{"event": <name>, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum RealtimeEvent {
    /// A notification record was persisted
    #[serde(rename_all = "camelCase")]
    NotificationCreated { notification: Notification },

    /// A course's view counters changed
    #[serde(rename_all = "camelCase")]
    CourseViewsUpdated {
        institution_id: String,
        course_id: String,
        course_views: i64,
    },

    /// Recomputed total views across an admin's institutions
    #[serde(rename_all = "camelCase")]
    InstitutionAdminTotalViews { total_views: i64 },

    /// A course's comparison counters changed
    #[serde(rename_all = "camelCase")]
    ComparisonsUpdated {
        institution_id: String,
        course_id: String,
        comparisons: i64,
    },

    /// Recomputed total comparisons across an admin's institutions
    #[serde(rename_all = "camelCase")]
    InstitutionAdminTotalComparisons { total_comparisons: i64 },

    /// An enquiry was inserted
    #[serde(rename_all = "camelCase")]
    EnquiryCreated { enquiry: Enquiry },

    /// Recomputed lead count across an admin's institutions
    #[serde(rename_all = "camelCase")]
    InstitutionAdminTotalLeads { total_leads: u64 },
}

impl RealtimeEvent {
    /// Wire event name, as carried in the `event` tag.
    pub fn event_name(&self) -> &'static str {
        match self {
            RealtimeEvent::NotificationCreated { .. } => "notificationCreated",
            RealtimeEvent::CourseViewsUpdated { .. } => "courseViewsUpdated",
            RealtimeEvent::InstitutionAdminTotalViews { .. } => "institutionAdminTotalViews",
            RealtimeEvent::ComparisonsUpdated { .. } => "comparisonsUpdated",
            RealtimeEvent::InstitutionAdminTotalComparisons { .. } => {
                "institutionAdminTotalComparisons"
            }
            RealtimeEvent::EnquiryCreated { .. } => "enquiryCreated",
            RealtimeEvent::InstitutionAdminTotalLeads { .. } => "institutionAdminTotalLeads",
        }
    }

    pub fn notification_created(notification: Notification) -> Self {
        RealtimeEvent::NotificationCreated { notification }
    }

    pub fn course_views_updated(
        institution_id: impl Into<String>,
        course_id: impl Into<String>,
        course_views: i64,
    ) -> Self {
        RealtimeEvent::CourseViewsUpdated {
            institution_id: institution_id.into(),
            course_id: course_id.into(),
            course_views,
        }
    }

    pub fn comparisons_updated(
        institution_id: impl Into<String>,
        course_id: impl Into<String>,
        comparisons: i64,
    ) -> Self {
        RealtimeEvent::ComparisonsUpdated {
            institution_id: institution_id.into(),
            course_id: course_id.into(),
            comparisons,
        }
    }

    pub fn enquiry_created(enquiry: Enquiry) -> Self {
        RealtimeEvent::EnquiryCreated { enquiry }
    }
}

/// Client-to-gateway join messages, `{"action": "joinInstitution", ...}`.
///
/// A join with an empty id is invalid; the gateway answers with an error
/// frame and leaves the connection's room set unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum JoinRequest {
    #[serde(rename_all = "camelCase")]
    JoinInstitution { institution_id: String },
    #[serde(rename_all = "camelCase")]
    JoinInstitutionAdmin { admin_id: String },
    #[serde(rename_all = "camelCase")]
    JoinStudent { student_id: String },
    #[serde(rename_all = "camelCase")]
    JoinBranch { branch_id: String },
    #[serde(rename_all = "camelCase")]
    JoinProgram { program_id: String },
    #[serde(rename_all = "camelCase")]
    JoinAdmin { admin_id: String },
}

impl JoinRequest {
    /// Resolve the requested room, or `None` when the id is empty.
    pub fn room(&self) -> Option<Room> {
        let make = |id: &str, f: fn(String) -> Room| {
            if id.is_empty() {
                None
            } else {
                Some(f(id.to_string()))
            }
        };
        match self {
            JoinRequest::JoinInstitution { institution_id } => {
                make(institution_id, Room::Institution)
            }
            JoinRequest::JoinInstitutionAdmin { admin_id } => {
                make(admin_id, Room::InstitutionAdmin)
            }
            JoinRequest::JoinStudent { student_id } => make(student_id, Room::Student),
            JoinRequest::JoinBranch { branch_id } => make(branch_id, Room::Branch),
            JoinRequest::JoinProgram { program_id } => make(program_id, Room::Program),
            JoinRequest::JoinAdmin { admin_id } => make(admin_id, Room::Admin),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_keys_match_wire_format() {
        assert_eq!(Room::Institution("i1".to_string()).key(), "institution:i1");
        assert_eq!(
            Room::InstitutionAdmin("a1".to_string()).key(),
            "institutionAdmin:a1"
        );
        assert_eq!(Room::Program("p1".to_string()).key(), "program:p1");
    }

    #[test]
    fn event_serialization_carries_camel_case_tag() {
        let event = RealtimeEvent::course_views_updated("i1", "c1", 42);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"courseViewsUpdated\""));
        assert!(json.contains("\"institutionId\":\"i1\""));
        assert!(json.contains("\"courseViews\":42"));
        assert_eq!(event.event_name(), "courseViewsUpdated");
    }

    #[test]
    fn event_round_trips() {
        let event = RealtimeEvent::InstitutionAdminTotalLeads { total_leads: 7 };
        let json = serde_json::to_string(&event).unwrap();
        let decoded: RealtimeEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn join_request_parses_and_resolves_room() {
        let req: JoinRequest =
            serde_json::from_str(r#"{"action":"joinInstitutionAdmin","adminId":"a9"}"#).unwrap();
        assert_eq!(req.room(), Some(Room::InstitutionAdmin("a9".to_string())));
    }

    #[test]
    fn empty_join_id_resolves_to_no_room() {
        let req: JoinRequest =
            serde_json::from_str(r#"{"action":"joinStudent","studentId":""}"#).unwrap();
        assert_eq!(req.room(), None);
    }
}
