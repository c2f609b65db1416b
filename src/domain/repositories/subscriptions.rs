use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, SubscriptionEntity, SubscriptionPeriodUpdate,
};

#[async_trait]
#[automock]
pub trait SubscriptionRepository {
    /// Upserts on the unique provider_subscription_id so a webhook and the
    /// checkout path converge on one row.
    async fn insert_or_update(
        &self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity>;

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>>;
    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>>;

    async fn update_status(
        &self,
        subscription_id: Uuid,
        status: &str,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    async fn update_status_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: &str,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()>;

    /// Price edit / coupon apply / coupon remove. No state change.
    async fn update_amount(
        &self,
        subscription_id: Uuid,
        amount_minor: i64,
        coupon_code: Option<String>,
        discount_minor: i64,
    ) -> Result<()>;

    async fn update_period_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        update: SubscriptionPeriodUpdate,
    ) -> Result<()>;

    async fn attach_user(&self, subscription_id: Uuid, user_id: Uuid) -> Result<()>;

    /// Hard delete. Callers must unlink referencing orders first.
    async fn delete(&self, subscription_id: Uuid) -> Result<()>;

    /// Every non-cancelled subscription for one provider, for the sync poll.
    async fn list_open_by_provider(&self, provider: &str) -> Result<Vec<SubscriptionEntity>>;
}
