//! Offer-sailing rows as supplied by the data-sync layer.

use serde::{Deserialize, Serialize};

use crate::types::RowId;

/// One offer paired with one sailing. Rows are never mutated by the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Stable identifier.
    pub id: RowId,
    /// Offer half of the pairing.
    pub offer: Offer,
    /// Sailing half of the pairing.
    pub sailing: Sailing,
}

/// Casino or loyalty offer attached to a sailing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Offer {
    /// Offer code; the same code may appear on many rows.
    pub code: String,
    /// Display name of the offer.
    pub name: Option<String>,
    /// Room category label, e.g. "Balcony" or "GTY Interior".
    pub room_type: Option<String>,
    /// Guest count label, e.g. "2 Guests".
    pub guests: Option<String>,
    /// Offer expiration date as supplied.
    pub expires: Option<String>,
}

/// Scheduled voyage of a ship.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Sailing {
    /// Ship display name.
    pub ship_name: String,
    /// Ship code, preferred over the name for identity when present.
    pub ship_code: Option<String>,
    /// Sail start date as supplied.
    pub sail_date: String,
    /// Explicit return date, when known.
    pub return_date: Option<String>,
    /// Duration in nights.
    pub nights: Option<u32>,
    /// Embarkation port name.
    pub departure_port: Option<String>,
    /// Disembarkation port name.
    pub arrival_port: Option<String>,
    /// Destination label, e.g. "Caribbean".
    pub destination: Option<String>,
    /// Day-by-day itinerary, when already hydrated.
    pub itinerary: Vec<ItineraryDay>,
    /// Cruise fare.
    pub price: Option<f64>,
    /// Taxes and port fees.
    pub taxes_and_fees: Option<f64>,
}

/// One entry of an itinerary timeline.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ItineraryDay {
    /// 1-based day index within the sailing.
    pub day: u32,
    /// Port or region label.
    pub port: String,
    /// Whether the ship spends the day at sea.
    pub sea_day: bool,
}

impl Row {
    /// Creates a row from its parts.
    pub fn new(id: impl Into<RowId>, offer: Offer, sailing: Sailing) -> Self {
        Self {
            id: id.into(),
            offer,
            sailing,
        }
    }

    /// Fare, optionally including taxes and fees.
    pub fn price(&self, include_taxes: bool) -> Option<f64> {
        let base = self.sailing.price?;
        if include_taxes {
            Some(base + self.sailing.taxes_and_fees.unwrap_or(0.0))
        } else {
            Some(base)
        }
    }
}
