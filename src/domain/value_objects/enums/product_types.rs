use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    OneTime,
    Subscription,
    Membership,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::OneTime => "one_time",
            ProductType::Subscription => "subscription",
            ProductType::Membership => "membership",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "subscription" => ProductType::Subscription,
            "membership" => ProductType::Membership,
            _ => ProductType::OneTime,
        }
    }

    /// Memberships and subscriptions both bill on a recurring agreement.
    pub fn is_recurring(&self) -> bool {
        matches!(self, ProductType::Subscription | ProductType::Membership)
    }
}

impl Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
