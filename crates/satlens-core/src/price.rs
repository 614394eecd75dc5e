//! Historical fiat price resolution against a daily price series.
//!
//! Intraday prices are unavailable, so a transaction is valued at the
//! daily observation for its UTC calendar date, or at the observation
//! closest in wall-clock time when that date is missing from the series.

use serde::{Deserialize, Serialize};
use time::{Date, Duration, OffsetDateTime};

// ==============================================================================
// Price Series
// ==============================================================================

/// One daily price point. Chart services stamp each point at the start of
/// its UTC day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Fiat units per whole BTC.
    pub price: f64,
}

impl PriceObservation {
    pub fn new(timestamp: i64, price: f64) -> Self {
        Self { timestamp, price }
    }

    /// UTC calendar day of the observation.
    pub fn date_key(&self) -> Option<Date> {
        utc_date(self.timestamp)
    }
}

/// An unordered, read-only collection of daily observations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PriceSeries {
    observations: Vec<PriceObservation>,
}

impl PriceSeries {
    pub fn new(observations: Vec<PriceObservation>) -> Self {
        Self { observations }
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriceObservation> {
        self.observations.iter()
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl FromIterator<PriceObservation> for PriceSeries {
    fn from_iter<I: IntoIterator<Item = PriceObservation>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// ==============================================================================
// Resolution
// ==============================================================================

/// Resolve the fiat price for `target_timestamp`.
///
/// The first observation on the same UTC date wins outright, even when an
/// observation from a neighbouring day is closer in time. Otherwise the
/// observation with the smallest absolute time difference wins, the first
/// one encountered on ties. Observations with a non-finite or non-positive
/// price are ignored. Returns `None` when nothing usable remains.
#[must_use]
pub fn resolve_fiat_price(series: &PriceSeries, target_timestamp: i64) -> Option<f64> {
    let target_date = utc_date(target_timestamp);
    let mut closest: Option<(u64, f64)> = None;

    for observation in series.iter() {
        if !observation.price.is_finite() || observation.price <= 0.0 {
            continue;
        }
        if target_date.is_some() && observation.date_key() == target_date {
            return Some(observation.price);
        }

        let diff = observation.timestamp.abs_diff(target_timestamp);
        match closest {
            Some((best, _)) if best <= diff => {}
            _ => closest = Some((diff, observation.price)),
        }
    }

    closest.map(|(_, price)| price)
}

/// First day of the chart window to request for `target_timestamp`.
///
/// Returned as `YYYY-MM-DD`, the format chart endpoints accept.
pub fn chart_window_start(target_timestamp: i64, days_before: i64) -> Option<String> {
    let start = utc_date(target_timestamp)?.checked_sub(Duration::days(days_before))?;
    Some(format!(
        "{:04}-{:02}-{:02}",
        start.year(),
        u8::from(start.month()),
        start.day()
    ))
}

fn utc_date(timestamp: i64) -> Option<Date> {
    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .map(OffsetDateTime::date)
}
