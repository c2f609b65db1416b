use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::enrollments::UpsertEnrollmentEntity;

#[async_trait]
#[automock]
pub trait EnrollmentRepository {
    /// Idempotent upsert keyed on (user_id, course_id); reactivates a
    /// previously revoked row.
    async fn upsert_enrollment(&self, enrollment: UpsertEnrollmentEntity) -> Result<()>;

    /// Flips is_active=false on every enrollment granted by the given
    /// order or subscription. Rows are never deleted.
    async fn deactivate_for_source(&self, source_id: Uuid) -> Result<usize>;
}
