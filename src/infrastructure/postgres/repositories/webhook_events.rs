use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::{insert_into, update};

use crate::domain::entities::webhook_events::InsertWebhookEventEntity;
use crate::domain::repositories::webhook_events::WebhookEventRepository;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::webhook_events};

pub struct WebhookEventPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl WebhookEventPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl WebhookEventRepository for WebhookEventPostgres {
    async fn insert_if_new(&self, event: InsertWebhookEventEntity) -> Result<Option<i64>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // ON CONFLICT DO NOTHING returns no row for a duplicate, which is the
        // dedup signal callers rely on.
        let row_id = insert_into(webhook_events::table)
            .values(&event)
            .on_conflict((webhook_events::provider, webhook_events::event_id))
            .do_nothing()
            .returning(webhook_events::id)
            .get_result::<i64>(&mut conn)
            .optional()?;

        Ok(row_id)
    }

    async fn mark_processed(&self, event_row_id: i64) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(webhook_events::table.find(event_row_id))
            .set(webhook_events::processed_at.eq(diesel::dsl::now))
            .execute(&mut conn)?;
        Ok(())
    }
}
