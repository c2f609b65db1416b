use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::course_enrollments;

/// One enrollment row per (user, course). Revocation flips `is_active`
/// instead of deleting so a later re-purchase reactivates via upsert.
#[derive(Debug, Clone, Selectable, Queryable)]
#[diesel(table_name = course_enrollments)]
pub struct CourseEnrollmentEntity {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub source: String,
    pub source_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = course_enrollments)]
pub struct UpsertEnrollmentEntity {
    pub user_id: Uuid,
    pub course_id: Uuid,
    pub source: String,
    pub source_id: Option<Uuid>,
    pub is_active: bool,
}
