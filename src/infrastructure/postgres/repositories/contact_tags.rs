use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::insert_into;
use diesel::prelude::*;
use uuid::Uuid;

use crate::domain::entities::contact_tags::InsertContactTagEntity;
use crate::domain::repositories::contact_tags::ContactTagRepository;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::contact_tags};

pub struct ContactTagPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ContactTagPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ContactTagRepository for ContactTagPostgres {
    async fn upsert_tag(&self, user_id: Uuid, tag: &str) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(contact_tags::table)
            .values(&InsertContactTagEntity {
                user_id,
                tag: tag.to_string(),
            })
            .on_conflict_do_nothing()
            .execute(&mut conn)?;
        Ok(())
    }
}
