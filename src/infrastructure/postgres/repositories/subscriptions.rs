use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::upsert::excluded;
use diesel::{delete, insert_into, update};
use uuid::Uuid;

use crate::domain::entities::subscriptions::{
    InsertSubscriptionEntity, SubscriptionEntity, SubscriptionPeriodUpdate,
};
use crate::domain::repositories::subscriptions::SubscriptionRepository;
use crate::domain::value_objects::enums::subscription_statuses::SubscriptionStatus;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::subscriptions};

pub struct SubscriptionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl SubscriptionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl SubscriptionRepository for SubscriptionPostgres {
    async fn insert_or_update(
        &self,
        subscription: InsertSubscriptionEntity,
    ) -> Result<SubscriptionEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = insert_into(subscriptions::table)
            .values(&subscription)
            .on_conflict(subscriptions::provider_subscription_id)
            .do_update()
            .set((
                subscriptions::status.eq(excluded(subscriptions::status)),
                subscriptions::amount_minor.eq(excluded(subscriptions::amount_minor)),
                subscriptions::currency.eq(excluded(subscriptions::currency)),
                subscriptions::current_period_start
                    .eq(excluded(subscriptions::current_period_start)),
                subscriptions::current_period_end.eq(excluded(subscriptions::current_period_end)),
                subscriptions::trial_end.eq(excluded(subscriptions::trial_end)),
                subscriptions::coupon_code.eq(excluded(subscriptions::coupon_code)),
                subscriptions::discount_minor.eq(excluded(subscriptions::discount_minor)),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .returning(SubscriptionEntity::as_returning())
            .get_result::<SubscriptionEntity>(&mut conn)?;

        Ok(row)
    }

    async fn find_by_id(&self, subscription_id: Uuid) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = subscriptions::table
            .find(subscription_id)
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn find_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = subscriptions::table
            .filter(subscriptions::provider_subscription_id.eq(provider_subscription_id))
            .select(SubscriptionEntity::as_select())
            .first::<SubscriptionEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn update_status(
        &self,
        subscription_id: Uuid,
        status: &str,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set((
                subscriptions::status.eq(status),
                subscriptions::cancelled_at.eq(cancelled_at),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn update_status_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        status: &str,
        cancelled_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            subscriptions::table
                .filter(subscriptions::provider_subscription_id.eq(provider_subscription_id)),
        )
        .set((
            subscriptions::status.eq(status),
            subscriptions::cancelled_at.eq(cancelled_at),
            subscriptions::updated_at.eq(diesel::dsl::now),
        ))
        .execute(&mut conn)?;
        Ok(())
    }

    async fn update_amount(
        &self,
        subscription_id: Uuid,
        amount_minor: i64,
        coupon_code: Option<String>,
        discount_minor: i64,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set((
                subscriptions::amount_minor.eq(amount_minor),
                subscriptions::coupon_code.eq(coupon_code),
                subscriptions::discount_minor.eq(discount_minor),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn update_period_by_provider_subscription_id(
        &self,
        provider_subscription_id: &str,
        period: SubscriptionPeriodUpdate,
    ) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(
            subscriptions::table
                .filter(subscriptions::provider_subscription_id.eq(provider_subscription_id)),
        )
        .set((&period, subscriptions::updated_at.eq(diesel::dsl::now)))
        .execute(&mut conn)?;
        Ok(())
    }

    async fn attach_user(&self, subscription_id: Uuid, user_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(subscriptions::table.find(subscription_id))
            .set((
                subscriptions::user_id.eq(user_id),
                subscriptions::updated_at.eq(diesel::dsl::now),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn delete(&self, subscription_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        delete(subscriptions::table.find(subscription_id)).execute(&mut conn)?;
        Ok(())
    }

    async fn list_open_by_provider(&self, provider: &str) -> Result<Vec<SubscriptionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = subscriptions::table
            .filter(subscriptions::provider.eq(provider))
            .filter(subscriptions::status.ne(SubscriptionStatus::Cancelled.as_str()))
            .select(SubscriptionEntity::as_select())
            .order(subscriptions::created_at.asc())
            .load::<SubscriptionEntity>(&mut conn)?;

        Ok(rows)
    }
}
