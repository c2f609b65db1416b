use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingInterval {
    Month,
    Year,
}

impl BillingInterval {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingInterval::Month => "month",
            BillingInterval::Year => "year",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "year" => BillingInterval::Year,
            _ => BillingInterval::Month,
        }
    }

    pub fn days(&self) -> i64 {
        match self {
            BillingInterval::Month => 30,
            BillingInterval::Year => 365,
        }
    }
}

impl Display for BillingInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
