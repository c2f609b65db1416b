use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

#[async_trait]
#[automock]
pub trait ContactTagRepository {
    async fn upsert_tag(&self, user_id: Uuid, tag: &str) -> Result<()>;
}
