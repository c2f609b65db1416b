use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::sql_types::{Nullable, SingleValue, Text};
use diesel::upsert::excluded;
use diesel::{define_sql_function, delete, insert_into, update};
use uuid::Uuid;

use crate::domain::entities::orders::{
    InsertOrderEntity, OrderBackfill, OrderEntity, OrderRefundUpdate,
};
use crate::domain::repositories::orders::OrderRepository;
use crate::infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::orders};

define_sql_function! {
    fn coalesce<T: SingleValue>(a: Nullable<T>, b: Nullable<T>) -> Nullable<T>;
}

pub struct OrderPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl OrderPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl OrderRepository for OrderPostgres {
    async fn insert_or_backfill(&self, order: InsertOrderEntity) -> Result<OrderEntity> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Conflicts keep existing non-null values and only upgrade a pending
        // status, so concurrent writers for the same payment converge.
        let row = insert_into(orders::table)
            .values(&order)
            .on_conflict((
                orders::provider_payment_id,
                orders::product_id,
                orders::provider,
            ))
            .do_update()
            .set((
                orders::user_id.eq(coalesce(orders::user_id, excluded(orders::user_id))),
                orders::provider_transaction_id.eq(coalesce(
                    orders::provider_transaction_id,
                    excluded(orders::provider_transaction_id),
                )),
                orders::fee_minor.eq(coalesce(orders::fee_minor, excluded(orders::fee_minor))),
                orders::net_minor.eq(coalesce(orders::net_minor, excluded(orders::net_minor))),
                orders::subscription_id.eq(coalesce(
                    orders::subscription_id,
                    excluded(orders::subscription_id),
                )),
                orders::status.eq(sql::<Text>(
                    "CASE WHEN orders.status = 'pending' THEN excluded.status ELSE orders.status END",
                )),
            ))
            .returning(OrderEntity::as_returning())
            .get_result::<OrderEntity>(&mut conn)?;

        Ok(row)
    }

    async fn find_by_id(&self, order_id: Uuid) -> Result<Option<OrderEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = orders::table
            .find(order_id)
            .select(OrderEntity::as_select())
            .first::<OrderEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn find_by_provider_payment_id(
        &self,
        provider: &str,
        provider_payment_id: &str,
    ) -> Result<Vec<OrderEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = orders::table
            .filter(orders::provider.eq(provider))
            .filter(orders::provider_payment_id.eq(provider_payment_id))
            .select(OrderEntity::as_select())
            .order(orders::created_at.asc())
            .load::<OrderEntity>(&mut conn)?;

        Ok(rows)
    }

    async fn backfill(&self, order_id: Uuid, fill: OrderBackfill) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(orders::table.find(order_id))
            .set((
                orders::provider_transaction_id.eq(coalesce(
                    orders::provider_transaction_id,
                    fill.provider_transaction_id,
                )),
                orders::fee_minor.eq(coalesce(orders::fee_minor, fill.fee_minor)),
                orders::net_minor.eq(coalesce(orders::net_minor, fill.net_minor)),
                orders::user_id.eq(coalesce(orders::user_id, fill.user_id)),
                orders::subscription_id
                    .eq(coalesce(orders::subscription_id, fill.subscription_id)),
            ))
            .execute(&mut conn)?;
        Ok(())
    }

    async fn apply_refund(&self, order_id: Uuid, refund: OrderRefundUpdate) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        update(orders::table.find(order_id))
            .set(&refund)
            .execute(&mut conn)?;
        Ok(())
    }

    async fn unlink_subscription(&self, subscription_id: Uuid) -> Result<usize> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let unlinked = update(orders::table.filter(orders::subscription_id.eq(subscription_id)))
            .set(orders::subscription_id.eq(None::<Uuid>))
            .execute(&mut conn)?;

        Ok(unlinked)
    }

    async fn delete_order(&self, order_id: Uuid) -> Result<()> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        delete(orders::table.find(order_id)).execute(&mut conn)?;
        Ok(())
    }
}
