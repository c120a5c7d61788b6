//! Public Listing
//!
//! Approved memorials are shown every year on the month and day of passing.

use chrono::{Datelike, NaiveDate};

use crate::error::Result;
use crate::model::Memorial;
use crate::store::MemorialStore;

/// True when `date_of_death` falls on the same month and day as `today`.
/// The year is ignored; Feb 29 only matches Feb 29.
pub fn is_anniversary(date_of_death: NaiveDate, today: NaiveDate) -> bool {
    date_of_death.month() == today.month() && date_of_death.day() == today.day()
}

/// Approved memorials whose anniversary is `today`, sorted by name
pub async fn todays_memorials(
    store: &dyn MemorialStore,
    today: NaiveDate,
) -> Result<Vec<Memorial>> {
    let mut memorials: Vec<Memorial> = store
        .list_approved()
        .await?
        .into_iter()
        .filter(|m| is_anniversary(m.date_of_death, today))
        .collect();

    memorials.sort_by(|a, b| a.full_name.cmp(&b.full_name));

    tracing::debug!(date = %today, count = memorials.len(), "Listed anniversary memorials");
    Ok(memorials)
}
