//! Storefront side of the client: listings, filter/sort controls, the
//! comparison table and profile editing.

pub mod compare;
pub mod filter;
pub mod models;
pub mod profile;
