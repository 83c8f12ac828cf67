use std::cmp::Ordering;
use std::str::FromStr;

use super::models::{Listing, ListingKind};

/// Filter controls of the browse page. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingFilter {
    pub kind: Option<ListingKind>,
    pub brand: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub min_year: Option<u16>,
    pub max_year: Option<u16>,
    pub min_health: Option<f64>,
    pub query: Option<String>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &Listing) -> bool {
        if self.kind.is_some_and(|k| k != listing.kind) {
            return false;
        }
        if let Some(brand) = self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            if !listing.brand.eq_ignore_ascii_case(brand) {
                return false;
            }
        }
        if self.min_price.is_some_and(|p| listing.price < p)
            || self.max_price.is_some_and(|p| listing.price > p)
        {
            return false;
        }
        if self.min_year.is_some() || self.max_year.is_some() {
            let Some(year) = listing.year else {
                return false;
            };
            if self.min_year.is_some_and(|y| year < y) || self.max_year.is_some_and(|y| year > y) {
                return false;
            }
        }
        if let Some(min) = self.min_health {
            if !listing.health().is_some_and(|h| h >= min) {
                return false;
            }
        }
        if let Some(query) = self.query.as_deref() {
            let needle = query.trim().to_lowercase();
            let hay = format!("{} {} {}", listing.title, listing.brand, listing.model).to_lowercase();
            if !needle.is_empty() && !hay.contains(&needle) {
                return false;
            }
        }
        true
    }

    pub fn apply(&self, listings: Vec<Listing>) -> Vec<Listing> {
        listings.into_iter().filter(|l| self.matches(l)).collect()
    }

    /// Query parameters for the listings endpoint.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(kind) = self.kind {
            pairs.push(("type", kind.to_string()));
        }
        if let Some(brand) = self.brand.as_deref().map(str::trim).filter(|b| !b.is_empty()) {
            pairs.push(("brand", brand.to_string()));
        }
        let numbers = [
            ("minPrice", self.min_price),
            ("maxPrice", self.max_price),
            ("minYear", self.min_year.map(u64::from)),
            ("maxYear", self.max_year.map(u64::from)),
        ];
        for (name, value) in numbers {
            if let Some(v) = value {
                pairs.push((name, v.to_string()));
            }
        }
        if let Some(q) = self.query.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            pairs.push(("q", q.to_string()));
        }
        pairs
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    YearDesc,
    MileageAsc,
    HealthDesc,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Self::Newest,
            "price-asc" | "price" => Self::PriceAsc,
            "price-desc" => Self::PriceDesc,
            "year-desc" | "year" => Self::YearDesc,
            "mileage-asc" | "mileage" => Self::MileageAsc,
            "health-desc" | "health" => Self::HealthDesc,
            other => {
                return Err(format!(
                    "unknown sort `{other}` (newest, price-asc, price-desc, year-desc, mileage-asc, health-desc)"
                ));
            }
        })
    }
}

/// Stable sort; listings missing the sort field go last.
pub fn sort_listings(listings: &mut [Listing], key: SortKey) {
    match key {
        SortKey::Newest => listings.sort_by(|a, b| missing_last(a.created_at, b.created_at, |x, y| y.cmp(x))),
        SortKey::PriceAsc => listings.sort_by_key(|l| l.price),
        SortKey::PriceDesc => listings.sort_by(|a, b| b.price.cmp(&a.price)),
        SortKey::YearDesc => listings.sort_by(|a, b| missing_last(a.year, b.year, |x, y| y.cmp(x))),
        SortKey::MileageAsc => listings.sort_by(|a, b| missing_last(a.mileage_km, b.mileage_km, Ord::cmp)),
        SortKey::HealthDesc => listings.sort_by(|a, b| {
            missing_last(a.health(), b.health(), |x, y| y.partial_cmp(x).unwrap_or(Ordering::Equal))
        }),
    }
}

fn missing_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
