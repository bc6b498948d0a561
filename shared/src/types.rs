use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CounterId = i32;

const UPGRADE_SEPARATOR: char = ',';

/// The singleton progress record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counter {
    pub id: CounterId,
    pub value: i64,
    pub clicks_per_click: i64,
    pub upgrades: Vec<String>,
}

impl Counter {
    pub const DEFAULT_VALUE: i64 = 0;
    pub const DEFAULT_CLICKS_PER_CLICK: i64 = 1;

    pub fn new(id: CounterId) -> Self {
        Self {
            id,
            value: Self::DEFAULT_VALUE,
            clicks_per_click: Self::DEFAULT_CLICKS_PER_CLICK,
            upgrades: Vec::new(),
        }
    }

    pub fn owns(&self, upgrade_id: &str) -> bool {
        self.upgrades.iter().any(|u| u == upgrade_id)
    }
}

/// Splits the persisted upgrade column. Blank entries are dropped, so `""`
/// is the empty set.
pub fn parse_upgrades(raw: &str) -> Vec<String> {
    raw.split(UPGRADE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn join_upgrades(upgrades: &[String]) -> String {
    upgrades.join(&UPGRADE_SEPARATOR.to_string())
}

/// Partial update applied by id. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CounterUpdate {
    pub value: Option<i64>,
    pub clicks_per_click: Option<i64>,
    pub upgrades: Option<Vec<String>>,
}

impl CounterUpdate {
    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.clicks_per_click.is_none() && self.upgrades.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClickEvent {
    pub action: String,
    pub amount: i64,
}

impl ClickEvent {
    pub const CLICK: &'static str = "click";
    pub const AUTO: &'static str = "auto";
    pub const PURCHASE: &'static str = "purchase";
    pub const RESET: &'static str = "reset";

    pub fn new(action: impl Into<String>, amount: i64) -> Self {
        Self {
            action: action.into(),
            amount,
        }
    }

    pub fn stamped(&self, timestamp: DateTime<Utc>) -> StampedClickEvent<'_> {
        StampedClickEvent {
            action: &self.action,
            amount: self.amount,
            timestamp,
        }
    }
}

/// Wire form of a [`ClickEvent`], stamped when it is handed to the broker.
#[derive(Debug, Serialize)]
pub struct StampedClickEvent<'a> {
    pub action: &'a str,
    pub amount: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub cost: i64,
    pub click_bonus: i64,
    pub auto_rate: i64,
    pub is_purchased: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickValue {
    pub click_value: i64,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub success: bool,
    pub message: String,
    pub new_click_total: i64,
    pub purchased_upgrade: Option<UpgradeDescriptor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}
