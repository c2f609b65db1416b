use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::entities::orders::{
    InsertOrderEntity, OrderBackfill, OrderEntity, OrderRefundUpdate,
};
use crate::domain::repositories::orders::OrderRepository;
use crate::domain::value_objects::enums::order_statuses::OrderStatus;
use crate::domain::value_objects::enums::payment_providers::PaymentProvider;
use crate::payments::provider::{ChargeLineItem, TransactionDetail};

/// Splits `total_minor` across `weights` proportionally using the largest
/// remainder method. The shares always sum to exactly `total_minor`; ties
/// on remainders resolve toward earlier entries. A zero weight sum divides
/// the total as evenly as possible instead.
pub fn allocate_proportionally(total_minor: i64, weights: &[i64]) -> Vec<i64> {
    if weights.is_empty() {
        return Vec::new();
    }

    let weight_sum: i64 = weights.iter().sum();
    if weight_sum <= 0 {
        let n = weights.len() as i64;
        let base = total_minor / n;
        let mut leftover = total_minor - base * n;
        return weights
            .iter()
            .map(|_| {
                let extra = if leftover > 0 { 1 } else { 0 };
                leftover -= extra;
                base + extra
            })
            .collect();
    }

    let mut shares: Vec<i64> = Vec::with_capacity(weights.len());
    let mut remainders: Vec<(usize, i128)> = Vec::with_capacity(weights.len());
    for (idx, weight) in weights.iter().enumerate() {
        // Widen before multiplying; total * weight can exceed i64.
        let numerator = i128::from(total_minor) * i128::from(*weight);
        shares.push((numerator / i128::from(weight_sum)) as i64);
        remainders.push((idx, numerator % i128::from(weight_sum)));
    }

    let mut leftover = total_minor - shares.iter().sum::<i64>();
    remainders.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    for (idx, _) in remainders {
        if leftover == 0 {
            break;
        }
        shares[idx] += 1;
        leftover -= 1;
    }

    shares
}

/// One captured charge to be written into the order ledger, possibly
/// spanning several basket lines.
pub struct BasketCharge<'a> {
    pub user_id: Option<Uuid>,
    pub email: &'a str,
    pub full_name: &'a str,
    pub currency: &'a str,
    pub provider: PaymentProvider,
    pub provider_payment_id: &'a str,
    pub detail: Option<&'a TransactionDetail>,
    pub status: OrderStatus,
    pub subscription_id: Option<Uuid>,
    pub coupon_code: Option<&'a str>,
    pub discount_minor: i64,
}

pub struct RefundOutcome {
    pub cumulative_refund_minor: i64,
    pub is_full: bool,
}

/// Order ledger bookkeeping. Every write funnels through the repository's
/// insert-or-backfill upsert so checkout handlers and webhooks converge on
/// one row per (provider payment, product).
pub struct LedgerWriter<O>
where
    O: OrderRepository + Send + Sync + 'static,
{
    order_repo: Arc<O>,
}

impl<O> LedgerWriter<O>
where
    O: OrderRepository + Send + Sync + 'static,
{
    pub fn new(order_repo: Arc<O>) -> Self {
        Self { order_repo }
    }

    pub async fn record_order(&self, order: InsertOrderEntity) -> Result<OrderEntity> {
        let recorded = self.order_repo.insert_or_backfill(order).await?;
        info!(
            order_id = %recorded.id,
            provider = %recorded.provider,
            provider_payment_id = %recorded.provider_payment_id,
            amount_minor = recorded.amount_minor,
            "ledger: order recorded"
        );
        Ok(recorded)
    }

    /// Writes one order row per basket line. Provider fees arrive as a
    /// single figure for the whole charge, so each line takes its
    /// proportional share and net is amount minus that share.
    pub async fn record_basket(
        &self,
        charge: BasketCharge<'_>,
        lines: &[ChargeLineItem],
    ) -> Result<Vec<OrderEntity>> {
        let weights: Vec<i64> = lines.iter().map(|line| line.amount_minor).collect();
        let fee_total = charge.detail.and_then(|d| d.fee_minor);
        let fee_shares = match fee_total {
            Some(total) => allocate_proportionally(total, &weights)
                .into_iter()
                .map(Some)
                .collect(),
            None => vec![None; lines.len()],
        };
        let discount_shares = allocate_proportionally(charge.discount_minor, &weights);

        let mut recorded = Vec::with_capacity(lines.len());
        for ((line, fee_share), discount_share) in
            lines.iter().zip(fee_shares).zip(discount_shares)
        {
            let order = InsertOrderEntity {
                user_id: charge.user_id,
                email: charge.email.to_string(),
                full_name: charge.full_name.to_string(),
                product_id: line.product_id,
                amount_minor: line.amount_minor,
                currency: charge.currency.to_string(),
                provider: charge.provider.as_str().to_string(),
                provider_payment_id: charge.provider_payment_id.to_string(),
                provider_transaction_id: charge
                    .detail
                    .map(|d| d.transaction_id.clone()),
                status: charge.status.as_str().to_string(),
                coupon_code: charge.coupon_code.map(str::to_string),
                discount_minor: discount_share,
                fee_minor: fee_share,
                net_minor: fee_share.map(|fee| line.amount_minor - fee),
                subscription_id: charge.subscription_id,
                refund_minor: 0,
            };
            recorded.push(self.record_order(order).await?);
        }

        Ok(recorded)
    }

    /// Backfills fee and net once the balance transaction settles. Only
    /// touches columns that are still null.
    pub async fn backfill_fee(&self, order: &OrderEntity, detail: &TransactionDetail) -> Result<()> {
        if order.fee_minor.is_some() && order.net_minor.is_some() {
            return Ok(());
        }
        let fill = OrderBackfill {
            provider_transaction_id: Some(detail.transaction_id.clone()),
            fee_minor: detail.fee_minor,
            net_minor: detail
                .fee_minor
                .map(|fee| detail.amount_minor.unwrap_or(order.amount_minor) - fee),
            user_id: None,
            subscription_id: None,
        };
        self.order_repo.backfill(order.id, fill).await?;
        info!(order_id = %order.id, fee_minor = ?detail.fee_minor, "ledger: fee backfilled");
        Ok(())
    }

    /// Applies a refund to the running total. `refund_minor` only ever
    /// grows; the order flips to refunded once the cumulative total covers
    /// the original amount and to partial_refund otherwise.
    pub async fn apply_refund(
        &self,
        order: &OrderEntity,
        refund_amount_minor: i64,
        reason: Option<&str>,
        provider_refund_id: Option<&str>,
    ) -> Result<RefundOutcome> {
        let cumulative = order.refund_minor + refund_amount_minor;
        if cumulative > order.amount_minor {
            warn!(
                order_id = %order.id,
                cumulative,
                amount_minor = order.amount_minor,
                "ledger: cumulative refund exceeds order amount"
            );
        }
        let is_full = cumulative >= order.amount_minor;
        let status = if is_full {
            OrderStatus::Refunded
        } else {
            OrderStatus::PartialRefund
        };

        let update = OrderRefundUpdate {
            refund_minor: cumulative,
            status: status.as_str().to_string(),
            refund_reason: reason.map(str::to_string),
            provider_refund_id: provider_refund_id.map(str::to_string),
            refunded_at: Utc::now(),
        };
        self.order_repo.apply_refund(order.id, update).await?;

        info!(
            order_id = %order.id,
            refund_amount_minor,
            cumulative,
            is_full,
            "ledger: refund applied"
        );
        Ok(RefundOutcome {
            cumulative_refund_minor: cumulative,
            is_full,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::orders::MockOrderRepository;

    #[test]
    fn allocation_is_proportional_and_exact() {
        // 300 in fees over a 9000/1000 basket.
        assert_eq!(allocate_proportionally(300, &[9000, 1000]), vec![270, 30]);
    }

    #[test]
    fn allocation_distributes_rounding_remainder() {
        let shares = allocate_proportionally(100, &[1, 1, 1]);
        assert_eq!(shares.iter().sum::<i64>(), 100);
        assert_eq!(shares, vec![34, 33, 33]);
    }

    #[test]
    fn allocation_handles_zero_weights() {
        let shares = allocate_proportionally(10, &[0, 0]);
        assert_eq!(shares.iter().sum::<i64>(), 10);
    }

    #[test]
    fn allocation_of_zero_total_is_all_zero() {
        assert_eq!(allocate_proportionally(0, &[500, 500]), vec![0, 0]);
    }

    #[test]
    fn allocation_survives_amounts_whose_product_exceeds_i64() {
        let big = 5_000_000_000_000;
        let shares = allocate_proportionally(big, &[big, big]);
        assert_eq!(shares.iter().sum::<i64>(), big);
        assert_eq!(shares, vec![2_500_000_000_000, 2_500_000_000_000]);
    }

    fn order_fixture(amount_minor: i64, refund_minor: i64) -> OrderEntity {
        OrderEntity {
            id: Uuid::new_v4(),
            user_id: None,
            email: "buyer@example.com".to_string(),
            full_name: "Buyer".to_string(),
            product_id: Uuid::new_v4(),
            amount_minor,
            currency: "USD".to_string(),
            provider: "card".to_string(),
            provider_payment_id: "pi_123".to_string(),
            provider_transaction_id: None,
            status: "completed".to_string(),
            coupon_code: None,
            discount_minor: 0,
            fee_minor: None,
            net_minor: None,
            subscription_id: None,
            refund_minor,
            refund_reason: None,
            provider_refund_id: None,
            refunded_at: None,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn partial_then_final_refund_flips_status() {
        let order = order_fixture(10000, 0);

        let mut order_repo = MockOrderRepository::new();
        order_repo
            .expect_apply_refund()
            .withf(|_, update| update.refund_minor == 4000 && update.status == "partial_refund")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let ledger = LedgerWriter::new(Arc::new(order_repo));
        let outcome = ledger
            .apply_refund(&order, 4000, Some("requested_by_customer"), Some("re_1"))
            .await
            .unwrap();
        assert!(!outcome.is_full);
        assert_eq!(outcome.cumulative_refund_minor, 4000);

        // Second refund covers the remainder.
        let order = order_fixture(10000, 4000);
        let mut order_repo = MockOrderRepository::new();
        order_repo
            .expect_apply_refund()
            .withf(|_, update| update.refund_minor == 10000 && update.status == "refunded")
            .times(1)
            .returning(|_, _| Box::pin(async { Ok(()) }));

        let ledger = LedgerWriter::new(Arc::new(order_repo));
        let outcome = ledger
            .apply_refund(&order, 6000, None, Some("re_2"))
            .await
            .unwrap();
        assert!(outcome.is_full);
    }

    #[tokio::test]
    async fn basket_lines_share_the_fee_proportionally() {
        let detail = TransactionDetail {
            transaction_id: "txn_1".to_string(),
            fee_minor: Some(300),
            net_minor: Some(9700),
            amount_minor: Some(10000),
        };
        let lines = vec![
            ChargeLineItem {
                product_id: Uuid::new_v4(),
                name: "Flagship course".to_string(),
                amount_minor: 9000,
            },
            ChargeLineItem {
                product_id: Uuid::new_v4(),
                name: "Workbook".to_string(),
                amount_minor: 1000,
            },
        ];

        let mut order_repo = MockOrderRepository::new();
        let mut expected_fees = vec![270i64, 30];
        order_repo
            .expect_insert_or_backfill()
            .times(2)
            .returning(move |insert| {
                let expected_fee = expected_fees.remove(0);
                assert_eq!(insert.fee_minor, Some(expected_fee));
                assert_eq!(insert.net_minor, Some(insert.amount_minor - expected_fee));
                Box::pin(async move {
                    Ok(OrderEntity {
                        id: Uuid::new_v4(),
                        user_id: insert.user_id,
                        email: insert.email,
                        full_name: insert.full_name,
                        product_id: insert.product_id,
                        amount_minor: insert.amount_minor,
                        currency: insert.currency,
                        provider: insert.provider,
                        provider_payment_id: insert.provider_payment_id,
                        provider_transaction_id: insert.provider_transaction_id,
                        status: insert.status,
                        coupon_code: insert.coupon_code,
                        discount_minor: insert.discount_minor,
                        fee_minor: insert.fee_minor,
                        net_minor: insert.net_minor,
                        subscription_id: insert.subscription_id,
                        refund_minor: insert.refund_minor,
                        refund_reason: None,
                        provider_refund_id: None,
                        refunded_at: None,
                        created_at: Utc::now(),
                    })
                })
            });

        let ledger = LedgerWriter::new(Arc::new(order_repo));
        let charge = BasketCharge {
            user_id: None,
            email: "buyer@example.com",
            full_name: "Buyer",
            currency: "USD",
            provider: PaymentProvider::Card,
            provider_payment_id: "pi_123",
            detail: Some(&detail),
            status: OrderStatus::Completed,
            subscription_id: None,
            coupon_code: None,
            discount_minor: 0,
        };
        let recorded = ledger.record_basket(charge, &lines).await.unwrap();
        assert_eq!(recorded.len(), 2);
    }
}
