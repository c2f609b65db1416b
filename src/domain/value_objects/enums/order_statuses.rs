use std::fmt::Display;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Refunded,
    PartialRefund,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Refunded => "refunded",
            OrderStatus::PartialRefund => "partial_refund",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "pending" => OrderStatus::Pending,
            "refunded" => OrderStatus::Refunded,
            "partial_refund" => OrderStatus::PartialRefund,
            _ => OrderStatus::Completed,
        }
    }
}

impl Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
