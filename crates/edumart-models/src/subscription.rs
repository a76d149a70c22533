//! Institution subscription documents.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Expired,
    Cancelled,
}

/// A paid subscription held by an institution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    /// Document ID
    pub id: String,

    /// Subscribing institution
    pub institution_id: String,

    /// Plan name
    pub plan: String,

    /// Current state
    pub status: SubscriptionStatus,

    /// Billing period start
    pub start_date: DateTime<Utc>,

    /// Billing period end; the daily sweep expires active subscriptions
    /// whose end date has passed.
    pub end_date: DateTime<Utc>,
}

impl Subscription {
    /// Whether the daily sweep should flip this subscription to expired.
    pub fn is_expirable(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active && self.end_date <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, ends_in_hours: i64) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: "s1".to_string(),
            institution_id: "i1".to_string(),
            plan: "premium".to_string(),
            status,
            start_date: now - Duration::days(365),
            end_date: now + Duration::hours(ends_in_hours),
        }
    }

    #[test]
    fn only_active_past_due_subscriptions_expire() {
        let now = Utc::now();
        assert!(subscription(SubscriptionStatus::Active, -1).is_expirable(now));
        assert!(!subscription(SubscriptionStatus::Active, 1).is_expirable(now));
        assert!(!subscription(SubscriptionStatus::Expired, -1).is_expirable(now));
        assert!(!subscription(SubscriptionStatus::Cancelled, -1).is_expirable(now));
    }
}
