use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::subscriptions;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub full_name: String,
    pub product_id: Uuid,
    pub provider: String,
    pub provider_subscription_id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub interval: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub coupon_code: Option<String>,
    pub discount_minor: i64,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = subscriptions)]
pub struct InsertSubscriptionEntity {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub full_name: String,
    pub product_id: Uuid,
    pub provider: String,
    pub provider_subscription_id: String,
    pub status: String,
    pub amount_minor: i64,
    pub currency: String,
    pub interval: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub trial_end: Option<DateTime<Utc>>,
    pub coupon_code: Option<String>,
    pub discount_minor: i64,
}

/// Period roll applied from a provider webhook or the sync poll.
/// None period bounds leave the stored bounds untouched.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = subscriptions)]
pub struct SubscriptionPeriodUpdate {
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub status: String,
}
