//! Field catalogue: keys, kinds, value extraction and value ordering.

use std::cmp::Ordering;
use std::fmt;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use time::{Date, Month, Weekday};

use crate::dataset::meta::{key, normalize_text, parse_date};
use crate::dataset::{ItineraryLookup, Snapshot};

/// Filterable field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKey {
    /// Offer code.
    OfferCode,
    /// Offer display name.
    OfferName,
    /// Ship display name.
    Ship,
    /// Sail start date.
    SailDate,
    /// Computed end date.
    EndDate,
    /// Duration in nights.
    Nights,
    /// Embarkation port.
    DeparturePort,
    /// Disembarkation port.
    ArrivalPort,
    /// Destination label.
    Destination,
    /// Room category label.
    RoomType,
    /// Guest count label.
    Guests,
    /// Weekday of the sail date.
    DayOfWeek,
    /// Month of the sail date.
    Month,
    /// Ports and regions touched by the sailing.
    Visits,
    /// Fare, optionally including taxes and fees.
    Price,
}

/// Value shape of a field, which decides the operators it supports.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// Single free-form string.
    Text,
    /// Calendar date.
    Date,
    /// Number.
    Number,
    /// List of strings.
    MultiText,
}

impl FieldKey {
    /// Every field, in display order.
    pub const ALL: [FieldKey; 15] = [
        FieldKey::OfferCode,
        FieldKey::OfferName,
        FieldKey::Ship,
        FieldKey::SailDate,
        FieldKey::EndDate,
        FieldKey::Nights,
        FieldKey::DeparturePort,
        FieldKey::ArrivalPort,
        FieldKey::Destination,
        FieldKey::RoomType,
        FieldKey::Guests,
        FieldKey::DayOfWeek,
        FieldKey::Month,
        FieldKey::Visits,
        FieldKey::Price,
    ];

    /// Persisted key of the field.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::OfferCode => "offerCode",
            FieldKey::OfferName => "offerName",
            FieldKey::Ship => "ship",
            FieldKey::SailDate => "sailDate",
            FieldKey::EndDate => "endDate",
            FieldKey::Nights => "nights",
            FieldKey::DeparturePort => "departurePort",
            FieldKey::ArrivalPort => "arrivalPort",
            FieldKey::Destination => "destination",
            FieldKey::RoomType => "roomType",
            FieldKey::Guests => "guests",
            FieldKey::DayOfWeek => "dayOfWeek",
            FieldKey::Month => "month",
            FieldKey::Visits => "visits",
            FieldKey::Price => "price",
        }
    }

    /// Parses a field key, ignoring case, separators and a few legacy names.
    pub fn parse(raw: &str) -> Option<Self> {
        let folded: String = raw
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        let field = match folded.as_str() {
            "offercode" | "code" => FieldKey::OfferCode,
            "offername" | "offer" => FieldKey::OfferName,
            "ship" | "shipname" => FieldKey::Ship,
            "saildate" | "startdate" | "date" => FieldKey::SailDate,
            "enddate" | "returndate" => FieldKey::EndDate,
            "nights" | "duration" => FieldKey::Nights,
            "departureport" | "embarkport" => FieldKey::DeparturePort,
            "arrivalport" | "disembarkport" => FieldKey::ArrivalPort,
            "destination" | "itinerary" => FieldKey::Destination,
            "roomtype" | "room" | "category" => FieldKey::RoomType,
            "guests" => FieldKey::Guests,
            "dayofweek" | "departureday" => FieldKey::DayOfWeek,
            "month" | "sailmonth" => FieldKey::Month,
            "visits" | "ports" => FieldKey::Visits,
            "price" => FieldKey::Price,
            _ => return None,
        };
        Some(field)
    }

    /// Value shape of the field.
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldKey::SailDate | FieldKey::EndDate => FieldKind::Date,
            FieldKey::Nights | FieldKey::Price => FieldKind::Number,
            FieldKey::Visits => FieldKind::MultiText,
            _ => FieldKind::Text,
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of one field for one row.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    /// The row has no value for the field.
    Missing,
    /// The value depends on itinerary data that is not hydrated yet.
    Unavailable,
    /// Display string.
    Text(String),
    /// Calendar date.
    Date(Date),
    /// Number.
    Number(f64),
    /// List of display strings.
    Many(Vec<String>),
}

impl FieldValue {
    /// Display strings contributed to a value list.
    pub fn display(&self) -> Vec<String> {
        match self {
            FieldValue::Missing | FieldValue::Unavailable => Vec::new(),
            FieldValue::Text(text) => vec![text.clone()],
            FieldValue::Date(date) => vec![date.to_string()],
            FieldValue::Number(n) => vec![format_number(*n)],
            FieldValue::Many(items) => items.clone(),
        }
    }
}

/// Inputs that change what a field evaluates to.
#[derive(Clone, Copy)]
pub struct FieldContext<'a> {
    /// Whether `price` includes taxes and fees.
    pub include_taxes: bool,
    /// Itinerary source for `visits`; `None` means only inline itineraries are used.
    pub itineraries: Option<&'a dyn ItineraryLookup>,
}

impl<'a> FieldContext<'a> {
    /// Context without an itinerary source.
    pub fn new(include_taxes: bool) -> Self {
        Self {
            include_taxes,
            itineraries: None,
        }
    }

    /// Attaches an itinerary source.
    pub fn with_itineraries(mut self, lookup: &'a dyn ItineraryLookup) -> Self {
        self.itineraries = Some(lookup);
        self
    }
}

fn text(value: Option<&str>) -> FieldValue {
    match value.map(normalize_text) {
        Some(v) if !v.is_empty() => FieldValue::Text(v),
        _ => FieldValue::Missing,
    }
}

/// Extracts `field` for the row at `idx`.
pub fn extract(snap: &Snapshot, idx: usize, field: FieldKey, ctx: &FieldContext<'_>) -> FieldValue {
    let row = snap.row(idx);
    match field {
        FieldKey::OfferCode => text(Some(&row.offer.code)),
        FieldKey::OfferName => text(row.offer.name.as_deref()),
        FieldKey::Ship => text(Some(&row.sailing.ship_name)),
        FieldKey::SailDate => snap.meta(idx).start.map_or(FieldValue::Missing, FieldValue::Date),
        FieldKey::EndDate => snap.meta(idx).end.map_or(FieldValue::Missing, FieldValue::Date),
        FieldKey::Nights => snap
            .meta(idx)
            .nights
            .map_or(FieldValue::Missing, |n| FieldValue::Number(f64::from(n))),
        FieldKey::DeparturePort => text(row.sailing.departure_port.as_deref()),
        FieldKey::ArrivalPort => text(row.sailing.arrival_port.as_deref()),
        FieldKey::Destination => text(row.sailing.destination.as_deref()),
        FieldKey::RoomType => text(row.offer.room_type.as_deref()),
        FieldKey::Guests => text(row.offer.guests.as_deref()),
        FieldKey::DayOfWeek => snap
            .meta(idx)
            .start
            .map_or(FieldValue::Missing, |d| FieldValue::Text(weekday_name(d.weekday()).to_owned())),
        FieldKey::Month => snap
            .meta(idx)
            .start
            .map_or(FieldValue::Missing, |d| FieldValue::Text(month_name(d.month()).to_owned())),
        FieldKey::Visits => visits(snap, idx, ctx),
        FieldKey::Price => row
            .price(ctx.include_taxes)
            .map_or(FieldValue::Missing, FieldValue::Number),
    }
}

fn visits(snap: &Snapshot, idx: usize, ctx: &FieldContext<'_>) -> FieldValue {
    let row = snap.row(idx);
    let days = if !row.sailing.itinerary.is_empty() {
        row.sailing.itinerary.clone()
    } else {
        let meta = snap.meta(idx);
        let hydrated = match (ctx.itineraries, meta.start) {
            (Some(lookup), Some(start)) => lookup.timeline(&meta.ship_key, start),
            _ => None,
        };
        match hydrated {
            Some(days) => days,
            None => return FieldValue::Unavailable,
        }
    };
    let mut seen = Vec::<String>::new();
    for day in days.iter().filter(|day| !day.sea_day) {
        let port = normalize_text(&day.port);
        if !port.is_empty() && !seen.iter().any(|p| key(p) == key(&port)) {
            seen.push(port);
        }
    }
    FieldValue::Many(seen)
}

/// Parses a finite number, tolerating a leading currency sign and thousands separators.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',')
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Formats a number without a trailing `.0`.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

const WEEKDAYS: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

const MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

fn weekday_name(day: Weekday) -> &'static str {
    WEEKDAYS[usize::from(day.number_days_from_sunday())]
}

fn month_name(month: Month) -> &'static str {
    MONTHS[usize::from(u8::from(month) - 1)]
}

/// De-duplicating collector of display values, case-insensitive.
#[derive(Clone, Debug, Default)]
pub struct ValueSet {
    entries: FxHashMap<String, String>,
}

impl ValueSet {
    /// Adds every display value of `value`.
    pub fn add(&mut self, value: &FieldValue) {
        for display in value.display() {
            self.entries.entry(key(&display)).or_insert(display);
        }
    }

    /// Number of distinct values.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sorted values for `field`.
    pub fn finish(self, field: FieldKey) -> Vec<String> {
        let mut values: Vec<String> = self.entries.into_values().collect();
        sort_values(field, &mut values);
        values
    }
}

/// Sorts values the way the field presents them: calendar order for weekday
/// and month (unknown values appended alphabetically), numeric order for
/// numbers, case-insensitive alphabetical otherwise.
pub fn sort_values(field: FieldKey, values: &mut [String]) {
    match field {
        FieldKey::DayOfWeek => sort_by_vocabulary(values, &WEEKDAYS),
        FieldKey::Month => sort_by_vocabulary(values, &MONTHS),
        _ if field.kind() == FieldKind::Number => values.sort_by(|a, b| natural_cmp(a, b)),
        _ => values.sort_by(|a, b| alpha_cmp(a, b)),
    }
}

fn sort_by_vocabulary(values: &mut [String], vocabulary: &[&str]) {
    let rank = |value: &str| {
        vocabulary
            .iter()
            .position(|v| v.eq_ignore_ascii_case(value.trim()))
            .unwrap_or(vocabulary.len())
    };
    values.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| alpha_cmp(a, b)));
}

fn alpha_cmp(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| a.cmp(b))
}

fn natural_cmp(a: &str, b: &str) -> Ordering {
    match (a.trim().parse::<f64>(), b.trim().parse::<f64>()) {
        (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => alpha_cmp(a, b),
    }
}

/// Normalises a user-supplied value for comparison against `field`.
pub fn normalize_input(field: FieldKey, raw: &str) -> String {
    match field.kind() {
        FieldKind::Date => parse_date(raw)
            .map(|d| d.to_string())
            .unwrap_or_else(|| key(raw)),
        FieldKind::Number => parse_number(raw)
            .map(format_number)
            .unwrap_or_else(|| key(raw)),
        _ => key(raw),
    }
}
