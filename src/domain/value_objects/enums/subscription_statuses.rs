use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Lifecycle of a recurring billing agreement.
///
/// `pending` covers both a card subscription awaiting initial payment
/// confirmation and a wallet subscription awaiting buyer approval.
/// `cancelled` is terminal; a cancelled row may coexist with a fresh row for
/// the same buyer and product after resubscription.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Pending,
    Trialing,
    Active,
    Paused,
    PendingCancellation,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Pending => "pending",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::PendingCancellation => "pending_cancellation",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "pending" => SubscriptionStatus::Pending,
            "trialing" => SubscriptionStatus::Trialing,
            "active" => SubscriptionStatus::Active,
            "paused" => SubscriptionStatus::Paused,
            "pending_cancellation" => SubscriptionStatus::PendingCancellation,
            "cancelled" => SubscriptionStatus::Cancelled,
            other => {
                // A corrupt row must not unlock admin state transitions.
                warn!(status = other, "unrecognized subscription status, treating as pending");
                SubscriptionStatus::Pending
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }

    pub fn can_pause(&self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Trialing)
    }

    pub fn can_resume(&self) -> bool {
        matches!(self, SubscriptionStatus::Paused)
    }

    pub fn can_cancel(&self) -> bool {
        !matches!(
            self,
            SubscriptionStatus::Cancelled | SubscriptionStatus::PendingCancellation
        )
    }
}

impl Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_terminal_for_every_admin_action() {
        let cancelled = SubscriptionStatus::Cancelled;
        assert!(cancelled.is_terminal());
        assert!(!cancelled.can_pause());
        assert!(!cancelled.can_resume());
        assert!(!cancelled.can_cancel());
    }

    #[test]
    fn paused_can_only_resume() {
        let paused = SubscriptionStatus::Paused;
        assert!(!paused.can_pause());
        assert!(paused.can_resume());
        assert!(paused.can_cancel());
    }

    #[test]
    fn unrecognized_status_is_never_treated_as_active() {
        let garbled = SubscriptionStatus::from_str("actve");
        assert_eq!(garbled, SubscriptionStatus::Pending);
        assert!(!garbled.can_pause());
    }

    #[test]
    fn round_trips_through_db_strings() {
        for status in [
            SubscriptionStatus::Pending,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::Active,
            SubscriptionStatus::Paused,
            SubscriptionStatus::PendingCancellation,
            SubscriptionStatus::Cancelled,
        ] {
            assert_eq!(SubscriptionStatus::from_str(status.as_str()), status);
        }
    }
}
