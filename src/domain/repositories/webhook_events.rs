use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::webhook_events::InsertWebhookEventEntity;

#[async_trait]
#[automock]
pub trait WebhookEventRepository {
    /// Inserts the event if its (provider, event_id) pair is unseen.
    /// Returns None on a duplicate delivery so callers can short-circuit.
    async fn insert_if_new(&self, event: InsertWebhookEventEntity) -> Result<Option<i64>>;

    async fn mark_processed(&self, event_row_id: i64) -> Result<()>;
}
