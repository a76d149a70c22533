//! Change-stream watchers.
//!
//! Each watcher owns one long-lived change subscription and hands every
//! event to its own spawned task, so a failing or slow handler never
//! stalls the stream. Handler errors are logged and the watcher keeps
//! consuming.

pub mod courses;
pub mod enquiries;

pub use courses::CourseWatcher;
pub use enquiries::EnquiryWatcher;
