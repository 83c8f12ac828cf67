use thiserror::Error;

use super::models::{format_price, Listing};

pub const MAX_COMPARED: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompareError {
    #[error("pick at least one listing to compare")]
    Empty,
    #[error("at most {MAX_COMPARED} listings can be compared, got {0}")]
    TooMany(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonRow {
    pub label: &'static str,
    pub values: Vec<String>,
    /// Not every column shows the same value.
    pub differs: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonTable {
    pub headers: Vec<String>,
    pub rows: Vec<ComparisonRow>,
    /// Column with the lowest price; the first one wins a tie.
    pub best_price: Option<usize>,
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".into())
}

fn text_or_dash(value: &str) -> String {
    if value.trim().is_empty() { "-".into() } else { value.to_string() }
}

pub fn compare(listings: &[Listing]) -> Result<ComparisonTable, CompareError> {
    if listings.is_empty() {
        return Err(CompareError::Empty);
    }
    if listings.len() > MAX_COMPARED {
        return Err(CompareError::TooMany(listings.len()));
    }

    type Cell = fn(&Listing) -> String;
    let fields: [(&'static str, Cell); 9] = [
        ("Price", |l| format_price(l.price)),
        ("Year", |l| or_dash(l.year)),
        ("Brand", |l| text_or_dash(&l.brand)),
        ("Model", |l| text_or_dash(&l.model)),
        ("Mileage (km)", |l| or_dash(l.mileage_km)),
        ("Battery (kWh)", |l| or_dash(l.battery.as_ref().map(|b| b.capacity_kwh))),
        ("Battery health (%)", |l| or_dash(l.health())),
        ("Charge cycles", |l| or_dash(l.battery.as_ref().and_then(|b| b.cycles))),
        ("Location", |l| text_or_dash(&l.location)),
    ];

    let rows = fields
        .iter()
        .map(|&(label, cell)| {
            let values: Vec<String> = listings.iter().map(cell).collect();
            let differs = values.windows(2).any(|w| w[0] != w[1]);
            ComparisonRow {
                label,
                values,
                differs,
            }
        })
        .collect();

    let best_price = listings
        .iter()
        .enumerate()
        .min_by_key(|(i, l)| (l.price, *i))
        .map(|(i, _)| i);

    Ok(ComparisonTable {
        headers: listings.iter().map(|l| l.title.clone()).collect(),
        rows,
        best_price,
    })
}
