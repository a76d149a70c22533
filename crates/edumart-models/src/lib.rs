//! Shared data models for the EduMart backend.
//!
//! This crate provides Serde-serializable types for:
//! - Domain documents (courses, enquiries, institutions, students, subscriptions)
//! - Persisted notifications and their recipient targeting
//! - Realtime rooms, broadcast event envelopes and client join messages
//! - Queue job identifiers

pub mod course;
pub mod enquiry;
pub mod institution;
pub mod job;
pub mod notification;
pub mod realtime;
pub mod student;
pub mod subscription;

// Re-export common types
pub use course::Course;
pub use enquiry::Enquiry;
pub use institution::Institution;
pub use job::JobId;
pub use notification::{NewNotification, Notification, RecipientType};
pub use realtime::{JoinRequest, RealtimeEvent, Room};
pub use student::{AccountRole, Student, WishlistAction};
pub use subscription::{Subscription, SubscriptionStatus};
