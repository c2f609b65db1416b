use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;
use uuid::Uuid;

use crate::domain::entities::products::{
    CouponEntity, ProductEntity, ProductItemEntity, RegionalPriceEntity,
};

#[async_trait]
#[automock]
pub trait ProductRepository {
    async fn find_active_by_id(&self, product_id: Uuid) -> Result<Option<ProductEntity>>;
    async fn find_regional_price(
        &self,
        product_id: Uuid,
        region: &str,
    ) -> Result<Option<RegionalPriceEntity>>;
    async fn find_coupon(&self, code: &str) -> Result<Option<CouponEntity>>;
    async fn list_bundle_items(&self, product_id: Uuid) -> Result<Vec<ProductItemEntity>>;
    async fn list_group_courses(&self, group_id: Uuid) -> Result<Vec<Uuid>>;
}
