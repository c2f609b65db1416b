use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::{insert_into, update};
use uuid::Uuid;

use crate::domain::entities::users::{InsertUserEntity, UserEntity};
use crate::domain::repositories::users::UserRepository;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::users};

pub struct UserPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl UserPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl UserRepository for UserPostgres {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = users::table
            .filter(users::email.eq(email))
            .select(UserEntity::as_select())
            .first::<UserEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn insert_user(&self, user: InsertUserEntity) -> Result<UserEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = insert_into(users::table)
            .values(&user)
            .returning(UserEntity::as_returning())
            .get_result::<UserEntity>(&mut conn)?;

        Ok(row)
    }

    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(users::table.find(user_id))
            .set(users::is_premium.eq(is_premium))
            .execute(&mut conn)?;
        Ok(())
    }
}
