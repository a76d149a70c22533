//! EduMart background worker.
//!
//! This crate provides:
//! - The five queue handlers (analytics, email, notification,
//!   subscription sweep, wishlist)
//! - The course and enquiry change-stream watchers
//! - The outbound mailer seam
//! - Worker configuration and structured job logging

pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod mailer;
pub mod watchers;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use handlers::{
    AnalyticsHandler, EmailHandler, NotificationHandler, SubscriptionHandler, WishlistHandler,
};
pub use logging::JobLogger;
pub use mailer::{Mailer, MailerError, PaymentEmail, TracingMailer};
pub use watchers::{CourseWatcher, EnquiryWatcher};
