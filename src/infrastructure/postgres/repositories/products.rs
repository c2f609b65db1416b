use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use diesel::define_sql_function;
use diesel::prelude::*;
use diesel::sql_types::Text;
use uuid::Uuid;

use crate::domain::entities::products::{
    CouponEntity, ProductEntity, ProductItemEntity, RegionalPriceEntity,
};
use crate::domain::repositories::products::ProductRepository;
use crate::infrastructure::postgres::{
    postgres_connection::PgPoolSquad,
    schema::{coupons, course_group_courses, product_items, product_regional_pricing, products},
};

define_sql_function! {
    fn lower(value: Text) -> Text;
}

pub struct ProductPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl ProductPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProductRepository for ProductPostgres {
    async fn find_active_by_id(&self, product_id: Uuid) -> Result<Option<ProductEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = products::table
            .find(product_id)
            .filter(products::is_active.eq(true))
            .select(ProductEntity::as_select())
            .first::<ProductEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn find_regional_price(
        &self,
        product_id: Uuid,
        region: &str,
    ) -> Result<Option<RegionalPriceEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let row = product_regional_pricing::table
            .filter(product_regional_pricing::product_id.eq(product_id))
            .filter(product_regional_pricing::region.eq(region))
            .select(RegionalPriceEntity::as_select())
            .first::<RegionalPriceEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn find_coupon(&self, code: &str) -> Result<Option<CouponEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Coupon codes match case-insensitively.
        let row = coupons::table
            .filter(lower(coupons::code).eq(code.to_lowercase()))
            .filter(coupons::is_active.eq(true))
            .select(CouponEntity::as_select())
            .first::<CouponEntity>(&mut conn)
            .optional()?;

        Ok(row)
    }

    async fn list_bundle_items(&self, product_id: Uuid) -> Result<Vec<ProductItemEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = product_items::table
            .filter(product_items::product_id.eq(product_id))
            .select(ProductItemEntity::as_select())
            .load::<ProductItemEntity>(&mut conn)?;

        Ok(rows)
    }

    async fn list_group_courses(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let rows = course_group_courses::table
            .filter(course_group_courses::group_id.eq(group_id))
            .select(course_group_courses::course_id)
            .load::<Uuid>(&mut conn)?;

        Ok(rows)
    }
}
