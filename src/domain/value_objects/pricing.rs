use serde::{Deserialize, Serialize};

/// Pricing region a buyer country maps to. Regional price rows are keyed on
/// these values, not on raw country codes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Region {
    Uk,
    Eu,
    Us,
    RestOfWorld,
}

impl Region {
    pub fn as_str(&self) -> &'static str {
        match self {
            Region::Uk => "uk",
            Region::Eu => "eu",
            Region::Us => "us",
            Region::RestOfWorld => "row",
        }
    }

    /// Maps an ISO 3166-1 alpha-2 country code to a pricing region.
    /// Unknown or absent countries price as rest-of-world.
    pub fn from_country_code(country: Option<&str>) -> Self {
        let Some(country) = country else {
            return Region::RestOfWorld;
        };

        match country.to_ascii_uppercase().as_str() {
            "GB" | "UK" => Region::Uk,
            "US" => Region::Us,
            "AT" | "BE" | "BG" | "HR" | "CY" | "CZ" | "DK" | "EE" | "FI" | "FR" | "DE" | "GR"
            | "HU" | "IE" | "IT" | "LV" | "LT" | "LU" | "MT" | "NL" | "PL" | "PT" | "RO" | "SK"
            | "SI" | "ES" | "SE" => Region::Eu,
            _ => Region::RestOfWorld,
        }
    }
}

/// Caller-supplied amount for pay-what-you-feel products.
#[derive(Debug, Clone, Deserialize)]
pub struct RequestedPrice {
    pub amount_minor: i64,
    pub currency: String,
}

/// Output of the price resolver: what the provider will be asked to charge.
/// `amount_minor` already reflects the coupon discount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub amount_minor: i64,
    pub currency: String,
    pub discount_minor: i64,
    pub coupon_code: Option<String>,
    /// True only for recurring card-provider discounts, which are also
    /// registered provider-side so renewals re-apply them. The resolved
    /// amount is never discounted twice.
    pub register_provider_discount: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    Percent,
    Fixed,
}

impl CouponKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CouponKind::Percent => "percent",
            CouponKind::Fixed => "fixed",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "percent" => CouponKind::Percent,
            _ => CouponKind::Fixed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_countries_to_regions() {
        assert_eq!(Region::from_country_code(Some("GB")), Region::Uk);
        assert_eq!(Region::from_country_code(Some("de")), Region::Eu);
        assert_eq!(Region::from_country_code(Some("US")), Region::Us);
        assert_eq!(Region::from_country_code(Some("JP")), Region::RestOfWorld);
        assert_eq!(Region::from_country_code(None), Region::RestOfWorld);
    }
}
