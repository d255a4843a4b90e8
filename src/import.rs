//! Row loading from JSON and CSV files.
//!
//! JSON input is an array of rows (or an object with a `rows` array) in the
//! serialised [`Row`] shape. CSV input has one flat column per attribute;
//! header names are matched ignoring case and separators, and the
//! `itinerary` column holds `|`-separated ports where "At Sea" marks a sea day.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use serde_json::Value;
use tracing::debug;

use crate::dataset::{ItineraryDay, Offer, Row, Sailing};
use crate::index::fields::parse_number;
use crate::types::{BerthError, Result};

/// Loads rows from `path`, choosing the format by extension.
pub fn load_rows(path: &Path) -> Result<Vec<Row>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    let file = BufReader::new(File::open(path)?);
    let rows = match ext.as_str() {
        "csv" => rows_from_csv(file)?,
        "json" => rows_from_json(file)?,
        other => {
            return Err(BerthError::Import(format!(
                "unsupported row file extension '{other}' (expected .json or .csv)"
            )))
        }
    };
    debug!(path = %path.display(), rows = rows.len(), "import.rows_loaded");
    Ok(rows)
}

/// Parses a JSON row list.
pub fn rows_from_json<R: Read>(reader: R) -> Result<Vec<Row>> {
    let value: Value = serde_json::from_reader(reader)?;
    let list = match value {
        Value::Array(_) => value,
        Value::Object(mut obj) => obj
            .remove("rows")
            .ok_or_else(|| BerthError::Import("expected an array or an object with 'rows'".into()))?,
        _ => return Err(BerthError::Import("expected an array of rows".into())),
    };
    Ok(serde_json::from_value(list)?)
}

#[derive(Default)]
struct Columns {
    id: Option<usize>,
    offer_code: Option<usize>,
    offer_name: Option<usize>,
    room_type: Option<usize>,
    guests: Option<usize>,
    expires: Option<usize>,
    ship_name: Option<usize>,
    ship_code: Option<usize>,
    sail_date: Option<usize>,
    return_date: Option<usize>,
    nights: Option<usize>,
    departure_port: Option<usize>,
    arrival_port: Option<usize>,
    destination: Option<usize>,
    itinerary: Option<usize>,
    price: Option<usize>,
    taxes_and_fees: Option<usize>,
}

impl Columns {
    fn resolve(headers: &StringRecord) -> Result<Self> {
        let mut cols = Columns::default();
        for (idx, header) in headers.iter().enumerate() {
            let folded: String = header
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            let slot = match folded.as_str() {
                "id" | "rowid" => &mut cols.id,
                "offercode" | "code" => &mut cols.offer_code,
                "offername" => &mut cols.offer_name,
                "roomtype" | "room" => &mut cols.room_type,
                "guests" => &mut cols.guests,
                "expires" | "expiration" => &mut cols.expires,
                "ship" | "shipname" => &mut cols.ship_name,
                "shipcode" => &mut cols.ship_code,
                "saildate" | "startdate" => &mut cols.sail_date,
                "returndate" | "enddate" => &mut cols.return_date,
                "nights" => &mut cols.nights,
                "departureport" | "embarkport" => &mut cols.departure_port,
                "arrivalport" | "disembarkport" => &mut cols.arrival_port,
                "destination" => &mut cols.destination,
                "itinerary" | "ports" => &mut cols.itinerary,
                "price" => &mut cols.price,
                "taxesandfees" | "taxes" => &mut cols.taxes_and_fees,
                _ => continue,
            };
            slot.get_or_insert(idx);
        }
        if cols.id.is_none() {
            return Err(BerthError::Import("column 'id' not found".into()));
        }
        Ok(cols)
    }
}

fn cell(record: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| record.get(i))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

fn parse_itinerary(raw: &str) -> Vec<ItineraryDay> {
    raw.split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
        .map(|(i, port)| ItineraryDay {
            day: i as u32 + 1,
            port: port.to_owned(),
            sea_day: port.eq_ignore_ascii_case("at sea") || port.eq_ignore_ascii_case("sea"),
        })
        .collect()
}

/// Parses a flat CSV row list.
pub fn rows_from_csv<R: Read>(reader: R) -> Result<Vec<Row>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = reader.headers()?.clone();
    let cols = Columns::resolve(&headers)?;
    let mut rows = Vec::new();
    for (line, result) in reader.records().enumerate() {
        let record = result?;
        let id = cell(&record, cols.id)
            .ok_or_else(|| BerthError::Import(format!("missing id on data line {}", line + 1)))?;
        let offer = Offer {
            code: cell(&record, cols.offer_code).unwrap_or_default(),
            name: cell(&record, cols.offer_name),
            room_type: cell(&record, cols.room_type),
            guests: cell(&record, cols.guests),
            expires: cell(&record, cols.expires),
        };
        let sailing = Sailing {
            ship_name: cell(&record, cols.ship_name).unwrap_or_default(),
            ship_code: cell(&record, cols.ship_code),
            sail_date: cell(&record, cols.sail_date).unwrap_or_default(),
            return_date: cell(&record, cols.return_date),
            nights: cell(&record, cols.nights).and_then(|n| n.parse().ok()),
            departure_port: cell(&record, cols.departure_port),
            arrival_port: cell(&record, cols.arrival_port),
            destination: cell(&record, cols.destination),
            itinerary: cell(&record, cols.itinerary)
                .map(|raw| parse_itinerary(&raw))
                .unwrap_or_default(),
            price: cell(&record, cols.price).and_then(|p| parse_number(&p)),
            taxes_and_fees: cell(&record, cols.taxes_and_fees).and_then(|p| parse_number(&p)),
        };
        rows.push(Row::new(id, offer, sailing));
    }
    Ok(rows)
}
