use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize, Serializer};

/// Safety classification reported by the analytics backend for a zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(from = "String")]
pub enum ZoneStatus {
    #[default]
    Safe,
    Warning,
    Critical,
}

impl ZoneStatus {
    /// Parse a backend label. Anything that is not `WARNING` or `CRITICAL`
    /// falls back to `SAFE`, matching how the dashboard colours unknown labels.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => ZoneStatus::Critical,
            "WARNING" => ZoneStatus::Warning,
            _ => ZoneStatus::Safe,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ZoneStatus::Safe => "SAFE",
            ZoneStatus::Warning => "WARNING",
            ZoneStatus::Critical => "CRITICAL",
        }
    }
}

impl From<String> for ZoneStatus {
    fn from(value: String) -> Self {
        Self::from_label(&value)
    }
}

impl Serialize for ZoneStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl fmt::Display for ZoneStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-zone payload inside `GET /data`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSnapshot {
    pub count: u64,
    pub price: f64,
    pub energy: String,
    pub status: ZoneStatus,
    pub manual: bool,
}

/// Zone entries keyed by name, kept in the order the backend emitted them.
///
/// View-model identifiers are positional, so the document order of the JSON
/// object is significant and must survive deserialization.
pub type ZoneMap = IndexMap<String, ZoneSnapshot>;

/// One complete `GET /data` result.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendSnapshot {
    pub zones: ZoneMap,
    pub total_count: u64,
    pub global_status: String,
}

impl BackendSnapshot {
    /// Shape checks serde cannot express: prices must be finite and non-negative.
    pub(crate) fn validate(&self) -> Result<(), String> {
        for (name, zone) in self.zones.iter() {
            if !zone.price.is_finite() || zone.price < 0.0 {
                return Err(format!("zone {name:?} has invalid price {}", zone.price));
            }
        }
        Ok(())
    }
}

#[derive(Serialize)]
pub(crate) struct PriceUpdate<'a> {
    pub(crate) zone_name: &'a str,
    pub(crate) price: f64,
}

#[derive(Serialize)]
pub(crate) struct ZoneReset<'a> {
    pub(crate) zone_name: &'a str,
}
