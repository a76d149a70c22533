//! Document store abstraction for the EduMart backend.
//!
//! This crate provides:
//! - The [`DocumentStore`] trait the job handlers and CDC watchers
//!   consume (persistence, aggregates, the transactional wishlist
//!   toggle, change streams)
//! - [`ChangeEvent`] types delivered by the change streams
//! - [`MemoryStore`], an in-process backend used by tests and by the
//!   embedded deployment
//!
//! The production document database sits behind this trait; the core
//! never issues raw queries, it asks for the semantic operation
//! ("persist this notification", "sum course views under this admin").

pub mod change;
pub mod error;
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;

use edumart_models::{Course, Enquiry, NewNotification, Notification, Student, WishlistAction};

pub use change::{ChangeEvent, ChangeOperation};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;

/// Result of a wishlist toggle. The no-op outcomes are reported (and
/// logged by the handler) but are not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistOutcome {
    Added,
    AlreadyPresent,
    Removed,
    NotPresent,
}

impl WishlistOutcome {
    /// Whether the toggle actually mutated state.
    pub fn mutated(&self) -> bool {
        matches!(self, WishlistOutcome::Added | WishlistOutcome::Removed)
    }
}

/// Primary document store operations consumed by the job/fan-out core.
#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    /// Resolve the admin account owning an institution, if claimed.
    async fn find_owning_admin(&self, institution_id: &str) -> StoreResult<Option<String>>;

    /// Sum `courseViews` across every course of every institution owned
    /// by the admin. Missing counters count as zero.
    async fn sum_course_views(&self, admin_id: &str) -> StoreResult<i64>;

    /// Sum `comparisons` the same way.
    async fn sum_course_comparisons(&self, admin_id: &str) -> StoreResult<i64>;

    /// Count lead enquiries (type `callback`/`demo`, case-insensitive)
    /// across the admin's institutions.
    async fn count_leads(&self, admin_id: &str) -> StoreResult<u64>;

    /// Persist a notification record and return it with id/timestamp.
    async fn insert_notification(&self, notification: NewNotification)
        -> StoreResult<Notification>;

    /// Look up a student account.
    async fn get_student(&self, student_id: &str) -> StoreResult<Option<Student>>;

    /// Toggle a course in a student's wishlist.
    ///
    /// Membership change and the course's `wishlist_count` adjustment
    /// commit as one unit; any failure inside the boundary leaves both
    /// untouched. No-op toggles (add of a present id, remove of an
    /// absent one) commit nothing and report the outcome.
    async fn wishlist_toggle(
        &self,
        student_id: &str,
        course_id: &str,
        action: WishlistAction,
    ) -> StoreResult<WishlistOutcome>;

    /// Mark every active subscription with `end_date <= now` expired.
    /// Returns how many were flipped; idempotent per run.
    async fn expire_due_subscriptions(&self, now: DateTime<Utc>) -> StoreResult<u64>;

    /// Subscribe to course mutations (update/replace), commit order.
    /// The stream is infinite and ends only when the backend shuts down.
    fn watch_courses(&self) -> BoxStream<'static, ChangeEvent<Course>>;

    /// Subscribe to enquiry inserts, commit order.
    fn watch_enquiries(&self) -> BoxStream<'static, ChangeEvent<Enquiry>>;
}
