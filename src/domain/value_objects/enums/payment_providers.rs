use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Discriminant stored on every order and subscription row; selects which
/// provider client handles the row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    Card,
    Wallet,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Card => "card",
            PaymentProvider::Wallet => "wallet",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "card" => Some(PaymentProvider::Card),
            "wallet" => Some(PaymentProvider::Wallet),
            _ => None,
        }
    }
}

impl Display for PaymentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
