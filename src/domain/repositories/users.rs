use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::users::{InsertUserEntity, UserEntity};

#[async_trait]
#[automock]
pub trait UserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntity>>;
    async fn insert_user(&self, user: InsertUserEntity) -> Result<UserEntity>;
    async fn set_premium(&self, user_id: Uuid, is_premium: bool) -> Result<()>;
}
