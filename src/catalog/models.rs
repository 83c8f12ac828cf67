use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::api::models::{de_opt_timestamp, de_user_id, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingKind {
    #[serde(alias = "car", alias = "ev", alias = "bike")]
    Vehicle,
    #[serde(alias = "pin")]
    Battery,
}

impl FromStr for ListingKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vehicle" | "car" | "ev" => Ok(Self::Vehicle),
            "battery" => Ok(Self::Battery),
            other => Err(format!("unknown listing type `{other}` (vehicle, battery)")),
        }
    }
}

impl fmt::Display for ListingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Self::Vehicle => "vehicle",
            Self::Battery => "battery",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatteryInfo {
    #[serde(alias = "capacity")]
    pub capacity_kwh: f64,
    #[serde(default, alias = "health", alias = "soh")]
    pub health_percent: Option<f64>,
    #[serde(default, alias = "cycleCount")]
    pub cycles: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(deserialize_with = "de_listing_id")]
    pub id: String,
    #[serde(alias = "type", alias = "category")]
    pub kind: ListingKind,
    pub title: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub year: Option<u16>,
    pub price: u64,
    #[serde(default, alias = "mileage", alias = "odo")]
    pub mileage_km: Option<u32>,
    #[serde(default)]
    pub battery: Option<BatteryInfo>,
    #[serde(default)]
    pub location: String,
    #[serde(deserialize_with = "de_user_id", alias = "sellerID", alias = "userId")]
    pub seller_id: UserId,
    #[serde(default, deserialize_with = "de_opt_timestamp")]
    pub created_at: Option<i64>,
}

impl Listing {
    pub fn health(&self) -> Option<f64> {
        self.battery.as_ref().and_then(|b| b.health_percent)
    }
}

fn de_listing_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s),
        other => Err(serde::de::Error::custom(format!("unexpected listing id: {other}"))),
    }
}

/// Formats a price in dong with dot grouping, e.g. `450.000.000 ₫`.
pub fn format_price(price: u64) -> String {
    let digits = price.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(ch);
    }
    out.push_str(" ₫");
    out
}
