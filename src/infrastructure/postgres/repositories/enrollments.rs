use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::{insert_into, update};
use uuid::Uuid;

use crate::domain::entities::enrollments::UpsertEnrollmentEntity;
use crate::domain::repositories::enrollments::EnrollmentRepository;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad, schema::course_enrollments,
};

pub struct EnrollmentPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl EnrollmentPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl EnrollmentRepository for EnrollmentPostgres {
    async fn upsert_enrollment(&self, enrollment: UpsertEnrollmentEntity) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        insert_into(course_enrollments::table)
            .values(&enrollment)
            .on_conflict((course_enrollments::user_id, course_enrollments::course_id))
            .do_update()
            .set((
                course_enrollments::source.eq(excluded(course_enrollments::source)),
                course_enrollments::source_id.eq(excluded(course_enrollments::source_id)),
                course_enrollments::is_active.eq(excluded(course_enrollments::is_active)),
                course_enrollments::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn deactivate_for_source(&self, source_id: Uuid) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let deactivated = update(
            course_enrollments::table
                .filter(course_enrollments::source_id.eq(source_id))
                .filter(course_enrollments::is_active.eq(true)),
        )
        .set((
            course_enrollments::is_active.eq(false),
            course_enrollments::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;

        Ok(deactivated)
    }
}
