use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// What a product bundle row points at. Groups expand to their constituent
/// courses; a nested product expands through its own bundle rows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementItemType {
    Course,
    CourseGroup,
    Product,
}

impl EntitlementItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntitlementItemType::Course => "course",
            EntitlementItemType::CourseGroup => "course_group",
            EntitlementItemType::Product => "product",
        }
    }

    pub fn from_str(value: &str) -> Self {
        match value {
            "course_group" => EntitlementItemType::CourseGroup,
            "product" => EntitlementItemType::Product,
            _ => EntitlementItemType::Course,
        }
    }
}

impl Display for EntitlementItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an entitlement grant came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GrantSource {
    Purchase,
    Subscription,
}

impl GrantSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantSource::Purchase => "purchase",
            GrantSource::Subscription => "subscription",
        }
    }
}

impl Display for GrantSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
