use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::{
    coupons, course_group_courses, product_items, product_regional_pricing, products,
};

/// Immutable reference data: created and edited by admins, read-only here.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = products)]
pub struct ProductEntity {
    pub id: Uuid,
    pub name: String,
    pub product_type: String,
    pub base_amount_minor: i64,
    pub base_currency: String,
    pub billing_interval: Option<String>,
    pub trial_enabled: bool,
    pub trial_days: i32,
    pub trial_amount_minor: i64,
    pub min_amount_minor: Option<i64>,
    pub max_amount_minor: Option<i64>,
    pub suggested_amount_minor: Option<i64>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ProductEntity {
    /// Pay-what-you-feel products carry a configured min/max band.
    pub fn is_pwyf(&self) -> bool {
        self.min_amount_minor.is_some() && self.max_amount_minor.is_some()
    }
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = product_regional_pricing)]
pub struct RegionalPriceEntity {
    pub id: i64,
    pub product_id: Uuid,
    pub region: String,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = product_items)]
pub struct ProductItemEntity {
    pub id: i64,
    pub product_id: Uuid,
    pub item_id: Uuid,
    pub item_type: String,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = course_group_courses)]
pub struct CourseGroupCourseEntity {
    pub id: i64,
    pub group_id: Uuid,
    pub course_id: Uuid,
}

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = coupons)]
pub struct CouponEntity {
    pub id: i64,
    pub code: String,
    pub kind: String,
    pub percent: Option<i32>,
    pub amount_minor: Option<i64>,
    /// None means the coupon applies to every product.
    pub product_id: Option<Uuid>,
    pub is_active: bool,
}

impl CouponEntity {
    pub fn applies_to(&self, product_id: Uuid) -> bool {
        self.is_active && self.product_id.map_or(true, |p| p == product_id)
    }
}
