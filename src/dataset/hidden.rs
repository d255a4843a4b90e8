//! User-defined hidden groups that remove rows from every computation.

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh64::Xxh64;

use super::meta::key;

/// Identity of a row for hidden-group matching.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct HiddenGroupKey {
    /// Offer code, lower-cased.
    pub offer_code: String,
    /// Ship key.
    pub ship_key: String,
    /// Sail date in ISO form, or the raw value when unparsable.
    pub sail_date: String,
}

/// One hiding rule. Blank fields match any value.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HiddenGroup {
    /// Offer code to hide.
    pub offer_code: Option<String>,
    /// Ship key to hide.
    pub ship: Option<String>,
    /// Sail date (ISO) to hide.
    pub sail_date: Option<String>,
}

impl HiddenGroup {
    /// Rule hiding one exact offer/ship/date combination.
    pub fn exact(offer_code: &str, ship: &str, sail_date: &str) -> Self {
        Self {
            offer_code: Some(offer_code.to_owned()),
            ship: Some(ship.to_owned()),
            sail_date: Some(sail_date.to_owned()),
        }
    }

    /// Rule hiding every row of an offer.
    pub fn offer(offer_code: &str) -> Self {
        Self {
            offer_code: Some(offer_code.to_owned()),
            ..Self::default()
        }
    }

    /// Returns true when every populated field equals the key.
    pub fn matches(&self, k: &HiddenGroupKey) -> bool {
        field_matches(self.offer_code.as_deref(), &k.offer_code)
            && field_matches(self.ship.as_deref(), &k.ship_key)
            && field_matches(self.sail_date.as_deref(), &k.sail_date)
    }

    fn is_empty(&self) -> bool {
        blank(self.offer_code.as_deref()) && blank(self.ship.as_deref()) && blank(self.sail_date.as_deref())
    }
}

fn blank(value: Option<&str>) -> bool {
    value.map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn field_matches(rule: Option<&str>, actual: &str) -> bool {
    match rule {
        Some(rule) if !rule.trim().is_empty() => key(rule) == actual,
        _ => true,
    }
}

/// Active set of hidden groups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HiddenGroups {
    groups: Vec<HiddenGroup>,
}

impl HiddenGroups {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule. Rules with no populated field are ignored since they would hide everything.
    pub fn insert(&mut self, group: HiddenGroup) -> bool {
        if group.is_empty() || self.groups.contains(&group) {
            return false;
        }
        self.groups.push(group);
        true
    }

    /// Removes a rule.
    pub fn remove(&mut self, group: &HiddenGroup) -> bool {
        let before = self.groups.len();
        self.groups.retain(|g| g != group);
        before != self.groups.len()
    }

    /// Returns true when any rule hides the key.
    pub fn is_hidden(&self, k: &HiddenGroupKey) -> bool {
        self.groups.iter().any(|group| group.matches(k))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true when there are no rules.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Order-independent signature of the rule set.
    pub fn signature(&self) -> u64 {
        let mut sorted: Vec<&HiddenGroup> = self.groups.iter().collect();
        sorted.sort();
        let mut hasher = Xxh64::new(0);
        for group in sorted {
            for part in [&group.offer_code, &group.ship, &group.sail_date] {
                hasher.update(part.as_deref().map(key).unwrap_or_default().as_bytes());
                hasher.update(&[0x1f]);
            }
            hasher.update(&[0x1e]);
        }
        hasher.digest()
    }
}
