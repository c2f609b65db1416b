use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::orders::{
    InsertOrderEntity, OrderBackfill, OrderEntity, OrderRefundUpdate,
};

#[async_trait]
#[automock]
pub trait OrderRepository {
    /// Insert-or-backfill keyed on (provider_payment_id, product_id, provider).
    /// A conflicting insert fills only the previously-null columns of the
    /// existing row, upgrades a pending status to the incoming one, and
    /// returns the row, so a webhook and a checkout handler converge on one
    /// row instead of racing to create duplicates.
    async fn insert_or_backfill(&self, order: InsertOrderEntity) -> Result<OrderEntity>;

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderEntity>>;
    async fn find_by_provider_payment_id(
        &self,
        provider: &str,
        provider_payment_id: &str,
    ) -> Result<Vec<OrderEntity>>;

    /// Fills only the columns that are currently null.
    async fn backfill(&self, order_id: Uuid, fill: OrderBackfill) -> Result<()>;

    async fn apply_refund(&self, order_id: Uuid, update: OrderRefundUpdate) -> Result<()>;

    /// Nulls the subscription FK on every order referencing the subscription.
    /// Run before a subscription hard-delete; never a cascade.
    async fn unlink_subscription(&self, subscription_id: Uuid) -> Result<usize>;

    async fn delete_order(&self, order_id: Uuid) -> Result<()>;
}
