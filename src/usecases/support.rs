use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::payments::provider::ProviderStatus;

/// Explicit bounded-retry policy for eventual-consistency waits. Kept as a
/// visible parameter at each call site rather than ambient sugar.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

/// Waiting for the wallet provider's transaction ledger to populate fee data.
pub const FEE_LOOKUP_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    delay: Duration::from_secs(2),
};

/// Waiting on slow best-effort side effects (CRM tags, sequence enrollment).
pub const SIDE_EFFECT_RETRY: RetryPolicy = RetryPolicy {
    max_attempts: 3,
    delay: Duration::from_millis(300),
};

pub async fn retry_with_delay<T, E, F, Fut>(
    policy: RetryPolicy,
    label: &str,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts => {
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %err,
                    "{label}: attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Try-log-continue wrapper for side effects that must never fail the parent
/// operation: by the time these run, money has already moved.
pub async fn best_effort<T, E, Fut>(step: &str, fut: Fut) -> Option<T>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            error!(step, error = %err, "best-effort step failed, continuing");
            None
        }
    }
}

/// Maps a provider-side status onto the local subscription lifecycle.
pub fn subscription_status_from_provider(status: ProviderStatus) -> SubscriptionStatus {
    match status {
        ProviderStatus::Pending => SubscriptionStatus::Pending,
        ProviderStatus::Trialing => SubscriptionStatus::Trialing,
        ProviderStatus::Active => SubscriptionStatus::Active,
        ProviderStatus::Paused => SubscriptionStatus::Paused,
        ProviderStatus::Cancelled => SubscriptionStatus::Cancelled,
    }
}

pub fn epoch_to_datetime(epoch_seconds: Option<i64>) -> Option<DateTime<Utc>> {
    epoch_seconds.and_then(|secs| DateTime::from_timestamp(secs, 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };

        let result: Result<u32, &str> = retry_with_delay(policy, "test", || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 { Err("not yet") } else { Ok(attempt) }
            }
        })
        .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1),
        };

        let result: Result<u32, &str> = retry_with_delay(policy, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("still broken") }
        })
        .await;

        assert_eq!(result, Err("still broken"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let failed: Option<u32> = best_effort("tagging", async { Err::<u32, _>("crm down") }).await;
        assert_eq!(failed, None);

        let ok = best_effort("tagging", async { Ok::<_, &str>(7) }).await;
        assert_eq!(ok, Some(7));
    }
}
