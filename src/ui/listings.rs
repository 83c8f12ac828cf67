use std::io::{self, Write};

use crate::catalog::compare::ComparisonTable;
use crate::catalog::models::{format_price, Listing};
use crate::catalog::profile::Profile;

pub fn print_listings(out: &mut impl Write, listings: &[Listing]) -> io::Result<()> {
    if listings.is_empty() {
        return writeln!(out, "No listings match.");
    }
    for l in listings {
        let year = l.year.map(|y| y.to_string()).unwrap_or_else(|| "----".into());
        let extra = match (&l.battery, l.mileage_km) {
            (Some(b), _) => match b.health_percent {
                Some(h) => format!("{} kWh, {h}% health", b.capacity_kwh),
                None => format!("{} kWh", b.capacity_kwh),
            },
            (None, Some(km)) => format!("{km} km"),
            (None, None) => String::new(),
        };
        writeln!(
            out,
            "#{:<8} {:<8} {year}  {:<40} {:>18}  {extra}",
            l.id,
            l.kind,
            truncate(&l.title, 40),
            format_price(l.price)
        )?;
    }
    writeln!(out, "{} listing(s)", listings.len())
}

pub fn print_listing(out: &mut impl Write, l: &Listing) -> io::Result<()> {
    writeln!(out, "{} (#{})", l.title, l.id)?;
    writeln!(out, "  type:     {}", l.kind)?;
    writeln!(out, "  brand:    {} {}", l.brand, l.model)?;
    if let Some(year) = l.year {
        writeln!(out, "  year:     {year}")?;
    }
    writeln!(out, "  price:    {}", format_price(l.price))?;
    if let Some(km) = l.mileage_km {
        writeln!(out, "  mileage:  {km} km")?;
    }
    if let Some(b) = &l.battery {
        writeln!(out, "  battery:  {} kWh", b.capacity_kwh)?;
        if let Some(h) = b.health_percent {
            writeln!(out, "  health:   {h}%")?;
        }
        if let Some(c) = b.cycles {
            writeln!(out, "  cycles:   {c}")?;
        }
    }
    if !l.location.is_empty() {
        writeln!(out, "  location: {}", l.location)?;
    }
    writeln!(out, "  seller:   #{} (chat: evmarket chat --with {})", l.seller_id, l.seller_id)
}

pub fn print_comparison(out: &mut impl Write, table: &ComparisonTable) -> io::Result<()> {
    const LABEL: usize = 20;
    const CELL: usize = 24;
    write!(out, "{:width$}", "", width = LABEL)?;
    for (i, h) in table.headers.iter().enumerate() {
        let title = truncate(h, CELL - 2);
        let mark = if table.best_price == Some(i) { "$" } else { " " };
        write!(out, "{mark}{title:<width$}", width = CELL - 1)?;
    }
    writeln!(out)?;
    for row in &table.rows {
        let flag = if row.differs { '≠' } else { ' ' };
        write!(out, "{flag}{:<width$}", row.label, width = LABEL - 1)?;
        for v in &row.values {
            write!(out, "{:<width$}", truncate(v, CELL - 1), width = CELL)?;
        }
        writeln!(out)?;
    }
    writeln!(out, "$ lowest price, ≠ values differ")
}

pub fn print_profile(out: &mut impl Write, p: &Profile) -> io::Result<()> {
    writeln!(out, "#{}  {}", p.id, p.full_name)?;
    writeln!(out, "  email:   {}", p.email)?;
    writeln!(out, "  phone:   {}", p.phone.as_deref().unwrap_or("-"))?;
    writeln!(out, "  address: {}", p.address.as_deref().unwrap_or("-"))
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max.saturating_sub(1)).collect();
        t.push('…');
        t
    }
}
