use chrono::{DateTime, Utc};
use diesel::prelude::*;
use uuid::Uuid;

use crate::infrastructure::postgres::schema::orders;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = orders)]
pub struct OrderEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub email: String,
    pub full_name: String,
    pub product_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_id: String,
    pub provider_transaction_id: Option<String>,
    pub status: String,
    pub coupon_code: Option<String>,
    pub discount_minor: i64,
    pub fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub subscription_id: Option<Uuid>,
    pub refund_minor: i64,
    pub refund_reason: Option<String>,
    pub provider_refund_id: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = orders)]
pub struct InsertOrderEntity {
    pub user_id: Option<Uuid>,
    pub email: String,
    pub full_name: String,
    pub product_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub provider: String,
    pub provider_payment_id: String,
    pub provider_transaction_id: Option<String>,
    pub status: String,
    pub coupon_code: Option<String>,
    pub discount_minor: i64,
    pub fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub subscription_id: Option<Uuid>,
    pub refund_minor: i64,
}

/// Fields a reconciling second writer may fill on an existing order row.
/// Only previously-null columns are touched.
#[derive(Debug, Clone, Default)]
pub struct OrderBackfill {
    pub provider_transaction_id: Option<String>,
    pub fee_minor: Option<i64>,
    pub net_minor: Option<i64>,
    pub user_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
}

/// Refund bookkeeping applied by the ledger writer.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = orders)]
pub struct OrderRefundUpdate {
    pub refund_minor: i64,
    pub status: String,
    pub refund_reason: Option<String>,
    pub provider_refund_id: Option<String>,
    pub refunded_at: DateTime<Utc>,
}
