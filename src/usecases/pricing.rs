use std::sync::Arc;

use anyhow::Result;
use tracing::{debug, info};

use crate::domain::entities::products::ProductEntity;
use crate::domain::repositories::products::ProductRepository;
use crate::domain::value_objects::pricing::{
    CouponKind, Region, RequestedPrice, ResolvedPrice,
};

/// Tolerance band around the configured PWYF min/max: buyers may go 10%
/// under the minimum or 10% over the maximum before we fall back.
const PWYF_MIN_FACTOR_PCT: i64 = 90;
const PWYF_MAX_FACTOR_PCT: i64 = 110;

/// Resolves the charge amount, currency and discount for one line item.
/// The resolved amount already reflects the coupon; a discount is only ever
/// registered provider-side in the one recurring-card case, flagged on the
/// output, so it cannot be applied twice.
pub struct PriceResolver<P>
where
    P: ProductRepository + Send + Sync + 'static,
{
    product_repo: Arc<P>,
}

impl<P> PriceResolver<P>
where
    P: ProductRepository + Send + Sync + 'static,
{
    pub fn new(product_repo: Arc<P>) -> Self {
        Self { product_repo }
    }

    pub async fn resolve(
        &self,
        product: &ProductEntity,
        country_code: Option<&str>,
        requested: Option<&RequestedPrice>,
        coupon_code: Option<&str>,
    ) -> Result<ResolvedPrice> {
        let region = Region::from_country_code(country_code);
        let regional = self
            .product_repo
            .find_regional_price(product.id, region.as_str())
            .await?;

        let currency = match (&regional, requested) {
            // Regional price is authoritative for currency when present.
            (Some(regional), _) => regional.currency.clone(),
            (None, Some(requested)) => requested.currency.clone(),
            (None, None) => product.base_currency.clone(),
        };

        let mut amount_minor = if product.is_pwyf() {
            self.resolve_pwyf_amount(product, regional.as_ref().map(|r| r.amount_minor), requested)
        } else {
            regional
                .as_ref()
                .map(|r| r.amount_minor)
                .unwrap_or(product.base_amount_minor)
        };

        let mut discount_minor = 0;
        let mut applied_coupon = None;
        if let Some(code) = coupon_code {
            match self.product_repo.find_coupon(code).await? {
                Some(coupon) if coupon.applies_to(product.id) => {
                    discount_minor = match CouponKind::from_str(&coupon.kind) {
                        CouponKind::Percent => {
                            amount_minor * i64::from(coupon.percent.unwrap_or(0)) / 100
                        }
                        CouponKind::Fixed => coupon.amount_minor.unwrap_or(0).min(amount_minor),
                    };
                    applied_coupon = Some(coupon.code);
                }
                // Invalid or inapplicable coupons resolve to zero discount,
                // never an error.
                _ => {
                    debug!(coupon = code, "pricing: coupon not applicable, ignoring");
                }
            }
        }
        amount_minor = (amount_minor - discount_minor).max(0);

        info!(
            product_id = %product.id,
            region = region.as_str(),
            amount_minor,
            currency = %currency,
            discount_minor,
            "pricing: resolved charge"
        );

        Ok(ResolvedPrice {
            amount_minor,
            currency,
            discount_minor,
            coupon_code: applied_coupon,
            register_provider_discount: discount_minor > 0
                && crate::domain::value_objects::enums::product_types::ProductType::from_str(
                    &product.product_type,
                )
                .is_recurring(),
        })
    }

    fn resolve_pwyf_amount(
        &self,
        product: &ProductEntity,
        regional_amount: Option<i64>,
        requested: Option<&RequestedPrice>,
    ) -> i64 {
        let min = product.min_amount_minor.unwrap_or(product.base_amount_minor);
        let max = product.max_amount_minor.unwrap_or(product.base_amount_minor);
        let floor = min * PWYF_MIN_FACTOR_PCT / 100;
        let ceiling = max * PWYF_MAX_FACTOR_PCT / 100;

        match requested {
            Some(requested)
                if requested.amount_minor >= floor && requested.amount_minor <= ceiling =>
            {
                requested.amount_minor
            }
            _ => regional_amount
                .or(product.suggested_amount_minor)
                .unwrap_or(product.base_amount_minor),
        }
    }
}
