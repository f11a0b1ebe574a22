use backend_client::{ZoneSnapshot, ZoneStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Merged, display-ready view of one zone.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ZoneViewModel {
    /// Positional identifier (`z1`, `z2`, ...) assigned at merge time.
    pub id: String,
    pub name: String,
    pub count: u64,
    pub price: f64,
    pub energy: String,
    pub status: ZoneStatus,
    pub manual: bool,
}

impl ZoneViewModel {
    pub(crate) fn from_snapshot(index: usize, name: &str, zone: &ZoneSnapshot) -> Self {
        Self {
            id: format!("z{}", index + 1),
            name: name.to_string(),
            count: zone.count,
            price: zone.price,
            energy: zone.energy.clone(),
            status: zone.status,
            manual: zone.manual,
        }
    }

    /// Energy descriptors produced by the backend start with `ECO MODE` when
    /// the lights are dimmed.
    pub fn is_eco(&self) -> bool {
        self.energy.to_ascii_uppercase().contains("ECO")
    }
}

/// The store's belief about the backend link.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConnectivityState {
    pub connected: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ConnectivityState {
    /// Milliseconds since the last successful merge, `None` before the first.
    pub fn staleness_ms(&self, now: DateTime<Utc>) -> Option<i64> {
        self.last_updated
            .map(|at| now.signed_duration_since(at).num_milliseconds().max(0))
    }
}

/// Aggregates shown next to the heatmap: eco zones, alert counts, and a
/// coarse health score.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct OperationalSummary {
    pub zones: usize,
    pub eco_zones: usize,
    pub warning_zones: usize,
    pub critical_zones: usize,
    pub health_percent: u8,
}

impl OperationalSummary {
    pub fn from_zones(zones: &[ZoneViewModel]) -> Self {
        let eco_zones = zones.iter().filter(|zone| zone.is_eco()).count();
        let warning_zones = zones
            .iter()
            .filter(|zone| zone.status == ZoneStatus::Warning)
            .count();
        let critical_zones = zones
            .iter()
            .filter(|zone| zone.status == ZoneStatus::Critical)
            .count();
        let penalty = critical_zones.saturating_mul(35) + warning_zones.saturating_mul(15);
        let health_percent = 100usize.saturating_sub(penalty) as u8;
        Self {
            zones: zones.len(),
            eco_zones,
            warning_zones,
            critical_zones,
            health_percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone(status: ZoneStatus, energy: &str) -> ZoneViewModel {
        ZoneViewModel {
            id: "z1".into(),
            name: "Zone 1".into(),
            count: 0,
            price: 0.0,
            energy: energy.into(),
            status,
            manual: false,
        }
    }

    #[test]
    fn summary_counts_alerts_and_eco_zones() {
        let zones = [
            zone(ZoneStatus::Critical, "NORMAL (Lights 100%)"),
            zone(ZoneStatus::Warning, "NORMAL (Lights 100%)"),
            zone(ZoneStatus::Safe, "ECO MODE (Lights 20%)"),
            zone(ZoneStatus::Safe, "eco mode (lights 60%)"),
        ];
        let summary = OperationalSummary::from_zones(&zones);
        assert_eq!(summary.zones, 4);
        assert_eq!(summary.eco_zones, 2);
        assert_eq!(summary.critical_zones, 1);
        assert_eq!(summary.warning_zones, 1);
        assert_eq!(summary.health_percent, 50);
    }

    #[test]
    fn health_bottoms_out_at_zero() {
        let zones = vec![zone(ZoneStatus::Critical, ""); 4];
        assert_eq!(OperationalSummary::from_zones(&zones).health_percent, 0);
        assert_eq!(OperationalSummary::from_zones(&[]).health_percent, 100);
    }
}
