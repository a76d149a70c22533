//! Job handlers, one per queue.

pub mod analytics;
pub mod email;
pub mod notification;
pub mod subscription;
pub mod wishlist;

pub use analytics::AnalyticsHandler;
pub use email::EmailHandler;
pub use notification::NotificationHandler;
pub use subscription::SubscriptionHandler;
pub use wishlist::WishlistHandler;
