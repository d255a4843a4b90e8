//! The back-to-back connection rule between two legs.

use serde::{Deserialize, Serialize};

use crate::dataset::RowMeta;

/// Connection settings of a chain session.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkPolicy {
    /// Whether consecutive legs may be on different ships.
    pub allow_side_by_side: bool,
}

impl LinkPolicy {
    /// Same-ship connections only.
    pub const SAME_SHIP: LinkPolicy = LinkPolicy {
        allow_side_by_side: false,
    };

    /// Same-ship and side-by-side connections.
    pub const SIDE_BY_SIDE: LinkPolicy = LinkPolicy {
        allow_side_by_side: true,
    };

    /// Policy with the given side-by-side setting.
    pub fn new(allow_side_by_side: bool) -> Self {
        Self { allow_side_by_side }
    }
}

/// How two linkable legs connect.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Connection {
    /// Both legs sail on the same ship.
    SameShip,
    /// The legs are on different ships docked in the same port.
    SideBySide,
}

impl Connection {
    /// Display name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Connection::SameShip => "same-ship",
            Connection::SideBySide => "side-by-side",
        }
    }
}

/// Classifies the connection from `from` to `to`, or `None` when `to`
/// cannot follow `from`.
///
/// `to` must sail the day `from` returns, from the port `from` returns to.
/// Unknown dates never connect. An unknown port connects only when both
/// ports are unknown.
pub fn connection(from: &RowMeta, to: &RowMeta, policy: LinkPolicy) -> Option<Connection> {
    match (from.end, to.start) {
        (Some(end), Some(start)) if end == start => {}
        _ => return None,
    }
    let ports_match = match (from.disembark_port.as_deref(), to.embark_port.as_deref()) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        _ => false,
    };
    if !ports_match {
        return None;
    }
    if from.ship_key == to.ship_key {
        Some(Connection::SameShip)
    } else if policy.allow_side_by_side {
        Some(Connection::SideBySide)
    } else {
        None
    }
}

/// Returns true when `to` may directly follow `from` under `policy`.
pub fn linkable(from: &RowMeta, to: &RowMeta, policy: LinkPolicy) -> bool {
    connection(from, to, policy).is_some()
}
