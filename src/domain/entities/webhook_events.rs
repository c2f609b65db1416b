use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::infrastructure::postgres::schema::webhook_events;

/// Durable log of received provider events. The unique (provider, event_id)
/// pair is what makes webhook processing idempotent under redelivery.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = webhook_events)]
pub struct WebhookEventEntity {
    pub id: i64,
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = webhook_events)]
pub struct InsertWebhookEventEntity {
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}
