use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::contact_tags;

#[derive(Debug, Clone, Selectable, Queryable)]
#[diesel(table_name = contact_tags)]
pub struct ContactTagEntity {
    pub user_id: Uuid,
    pub tag: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = contact_tags)]
pub struct InsertContactTagEntity {
    pub user_id: Uuid,
    pub tag: String,
}
