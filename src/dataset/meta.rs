//! Derived per-row metadata used by linkability and indexing.

use time::macros::format_description;
use time::{Date, Duration, Month};

use super::row::Row;

/// Coarse room category used for candidate ranking.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum RoomCategory {
    /// Unrecognised label; ranks lowest.
    Unknown,
    /// Inside cabin.
    Interior,
    /// Outside cabin with a window.
    Oceanview,
    /// Cabin with a private balcony.
    Balcony,
    /// Suite.
    Suite,
}

impl RoomCategory {
    /// Classifies a free-form room label.
    pub fn classify(label: &str) -> Self {
        let lower = label.to_ascii_lowercase();
        if lower.contains("suite") {
            RoomCategory::Suite
        } else if lower.contains("balcony") {
            RoomCategory::Balcony
        } else if lower.contains("ocean") || lower.contains("outside") {
            RoomCategory::Oceanview
        } else if lower.contains("interior") || lower.contains("inside") {
            RoomCategory::Interior
        } else {
            RoomCategory::Unknown
        }
    }
}

/// Projection of a [`Row`] into normalised fields.
#[derive(Clone, Debug, PartialEq)]
pub struct RowMeta {
    /// Offer code, trimmed.
    pub offer_code: String,
    /// Lower-cased ship code, or normalised ship name when no code is known.
    pub ship_key: String,
    /// Sail start date.
    pub start: Option<Date>,
    /// Explicit return date, or start plus duration.
    pub end: Option<Date>,
    /// Duration in nights, derived from the dates when not supplied.
    pub nights: Option<u32>,
    /// Lower-cased embarkation port.
    pub embark_port: Option<String>,
    /// Lower-cased disembarkation port.
    pub disembark_port: Option<String>,
    /// Room category.
    pub room: RoomCategory,
    /// Lower-cased room label.
    pub room_key: String,
    /// Lower-cased guest count label.
    pub guests_key: String,
}

impl RowMeta {
    /// Computes the metadata for `row`.
    pub fn from_row(row: &Row) -> Self {
        let sailing = &row.sailing;
        let start = parse_date(&sailing.sail_date);
        let explicit_end = sailing.return_date.as_deref().and_then(parse_date);
        let end = explicit_end.or_else(|| {
            let nights = sailing.nights?;
            start?.checked_add(Duration::days(i64::from(nights)))
        });
        let nights = sailing.nights.or_else(|| match (start, end) {
            (Some(start), Some(end)) if end >= start => u32::try_from((end - start).whole_days()).ok(),
            _ => None,
        });
        let ship_key = sailing
            .ship_code
            .as_deref()
            .map(key)
            .filter(|code| !code.is_empty())
            .unwrap_or_else(|| key(&sailing.ship_name));
        let embark_port = sailing.departure_port.as_deref().map(key).filter(|p| !p.is_empty());
        let disembark_port = sailing
            .arrival_port
            .as_deref()
            .map(key)
            .filter(|p| !p.is_empty())
            .or_else(|| {
                sailing
                    .itinerary
                    .iter()
                    .rev()
                    .find(|day| !day.sea_day && !day.port.trim().is_empty())
                    .map(|day| key(&day.port))
            })
            .or_else(|| embark_port.clone());
        let room_label = row.offer.room_type.as_deref().unwrap_or_default();
        Self {
            offer_code: row.offer.code.trim().to_owned(),
            ship_key,
            start,
            end,
            nights,
            embark_port,
            disembark_port,
            room: RoomCategory::classify(room_label),
            room_key: key(room_label),
            guests_key: key(row.offer.guests.as_deref().unwrap_or_default()),
        }
    }
}

/// Trims and collapses internal whitespace.
pub fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalised, lower-cased comparison key.
pub fn key(value: &str) -> String {
    normalize_text(value).to_lowercase()
}

/// Parses `YYYY-MM-DD`, an ISO timestamp, or `MM/DD/YYYY`.
pub fn parse_date(raw: &str) -> Option<Date> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if raw.contains('/') {
        return parse_slash_date(raw);
    }
    let day_part = match raw.char_indices().nth(10) {
        Some((idx, 'T')) | Some((idx, ' ')) => &raw[..idx],
        _ => raw,
    };
    Date::parse(day_part, format_description!("[year]-[month]-[day]")).ok()
}

fn parse_slash_date(raw: &str) -> Option<Date> {
    let mut parts = raw.split('/');
    let month: u8 = parts.next()?.trim().parse().ok()?;
    let day: u8 = parts.next()?.trim().parse().ok()?;
    let year: i32 = parts.next()?.trim().parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    let month = Month::try_from(month).ok()?;
    Date::from_calendar_date(year, month, day).ok()
}
