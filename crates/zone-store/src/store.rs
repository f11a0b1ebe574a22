//! Snapshot store: merges poll results into view models and tracks the
//! connectivity state of the backend link.
//!
//! The store itself is plain data with `&mut self` operations. Callers that
//! share it across threads wrap it in a mutex and funnel merges through a single
//! writer so the operations below never interleave.

use std::time::{Duration, Instant};

use backend_client::{BackendSnapshot, PollEvent, SequenceClock, ZoneSnapshot};
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, warn};

use crate::model::{ConnectivityState, OperationalSummary, ZoneViewModel};

/// How long an unconfirmed override is re-applied on top of merges before the
/// upstream value wins. Five poll periods.
pub const OVERRIDE_TTL: Duration = Duration::from_secs(10);

const INITIAL_GLOBAL_STATUS: &str = "UNKNOWN";
const PRICE_EPSILON: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub enum OverrideKind {
    Manual { price: f64 },
    Auto,
}

impl OverrideKind {
    fn apply_to(&self, zone: &mut ZoneViewModel) {
        match self {
            OverrideKind::Manual { price } => {
                zone.price = *price;
                zone.manual = true;
            }
            OverrideKind::Auto => zone.manual = false,
        }
    }

    fn is_reflected_by(&self, zone: &ZoneSnapshot) -> bool {
        match self {
            OverrideKind::Manual { price } => {
                zone.manual && (zone.price - price).abs() < PRICE_EPSILON
            }
            OverrideKind::Auto => !zone.manual,
        }
    }
}

/// A locally applied override waiting for the backend to echo it back.
#[derive(Clone, Debug)]
pub struct PendingOverride {
    pub zone: String,
    pub kind: OverrideKind,
    /// Sequence number taken when the command was issued.
    pub seq: u64,
    applied_at: Instant,
}

/// Result of feeding a poll completion into the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The completion was dispatched before one that was already applied.
    Stale,
}

/// Serializable copy of the store for HTTP consumers.
#[derive(Clone, Debug, Serialize)]
pub struct StoreView {
    pub zones: Vec<ZoneViewModel>,
    pub total_count: u64,
    pub global_status: String,
    pub connectivity: ConnectivityState,
    pub stale_for_ms: Option<i64>,
    pub summary: OperationalSummary,
    pub pending_overrides: usize,
    pub revision: u64,
}

pub struct SnapshotStore {
    zones: Vec<ZoneViewModel>,
    total_count: u64,
    global_status: String,
    connectivity: ConnectivityState,
    clock: SequenceClock,
    last_poll_seq: u64,
    pending: Vec<PendingOverride>,
    override_ttl: Duration,
    revision: u64,
}

impl SnapshotStore {
    /// Create an empty store. `clock` must be the same clock the poller uses so
    /// override and poll sequence numbers are comparable.
    pub fn new(clock: SequenceClock) -> Self {
        Self {
            zones: Vec::new(),
            total_count: 0,
            global_status: INITIAL_GLOBAL_STATUS.to_string(),
            connectivity: ConnectivityState::default(),
            clock,
            last_poll_seq: 0,
            pending: Vec::new(),
            override_ttl: OVERRIDE_TTL,
            revision: 0,
        }
    }

    pub fn with_override_ttl(mut self, ttl: Duration) -> Self {
        self.override_ttl = ttl;
        self
    }

    pub fn zones(&self) -> &[ZoneViewModel] {
        &self.zones
    }

    pub fn zone(&self, name: &str) -> Option<&ZoneViewModel> {
        self.zones.iter().find(|zone| zone.name == name)
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn global_status(&self) -> &str {
        &self.global_status
    }

    pub fn connectivity(&self) -> &ConnectivityState {
        &self.connectivity
    }

    pub fn pending_overrides(&self) -> &[PendingOverride] {
        &self.pending
    }

    /// Bumped on every observable change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn last_poll_seq(&self) -> u64 {
        self.last_poll_seq
    }

    /// Replace every view model from `snapshot`, treating it as the newest
    /// state the backend has produced.
    pub fn merge(&mut self, snapshot: &BackendSnapshot) {
        self.merge_at(snapshot, u64::MAX, Instant::now());
    }

    /// Record a failed poll. Zones and aggregates are left untouched.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.connectivity.connected = false;
        self.connectivity.error = Some(message.into());
        self.revision += 1;
    }

    /// Apply a poll completion unless a later dispatch was already applied.
    pub fn apply_poll(&mut self, event: &PollEvent) -> ApplyOutcome {
        self.apply_poll_at(event, Instant::now())
    }

    pub fn apply_poll_at(&mut self, event: &PollEvent, now: Instant) -> ApplyOutcome {
        let seq = event.seq();
        if seq <= self.last_poll_seq {
            debug!(
                seq,
                applied = self.last_poll_seq,
                "discarding out-of-order poll completion"
            );
            return ApplyOutcome::Stale;
        }
        self.last_poll_seq = seq;
        match event {
            PollEvent::Snapshot { snapshot, .. } => self.merge_at(snapshot, seq, now),
            PollEvent::Failed { message, .. } => self.report_error(message.clone()),
        }
        ApplyOutcome::Applied
    }

    /// Optimistically pin `zone_name` to `price`. Returns `false` (and changes
    /// nothing) when the zone is unknown.
    pub fn apply_manual_override(&mut self, zone_name: &str, price: f64) -> bool {
        let seq = self.clock.next();
        self.apply_override_at(zone_name, OverrideKind::Manual { price }, seq, Instant::now())
    }

    /// Optimistically return `zone_name` to automatic pricing. The price is
    /// left as-is until the next merge.
    pub fn apply_auto_override(&mut self, zone_name: &str) -> bool {
        let seq = self.clock.next();
        self.apply_override_at(zone_name, OverrideKind::Auto, seq, Instant::now())
    }

    /// Apply an override whose command was issued at `issued_seq`.
    pub fn apply_override(&mut self, zone_name: &str, kind: OverrideKind, issued_seq: u64) -> bool {
        self.apply_override_at(zone_name, kind, issued_seq, Instant::now())
    }

    pub fn apply_override_at(
        &mut self,
        zone_name: &str,
        kind: OverrideKind,
        issued_seq: u64,
        now: Instant,
    ) -> bool {
        let Some(zone) = self.zones.iter_mut().find(|zone| zone.name == zone_name) else {
            return false;
        };
        kind.apply_to(zone);
        self.pending.retain(|pending| pending.zone != zone_name);
        self.pending.push(PendingOverride {
            zone: zone_name.to_string(),
            kind,
            seq: issued_seq,
            applied_at: now,
        });
        self.revision += 1;
        true
    }

    pub fn view(&self) -> StoreView {
        StoreView {
            zones: self.zones.clone(),
            total_count: self.total_count,
            global_status: self.global_status.clone(),
            connectivity: self.connectivity.clone(),
            stale_for_ms: self.connectivity.staleness_ms(Utc::now()),
            summary: OperationalSummary::from_zones(&self.zones),
            pending_overrides: self.pending.len(),
            revision: self.revision,
        }
    }

    fn merge_at(&mut self, snapshot: &BackendSnapshot, seq: u64, now: Instant) {
        self.zones = snapshot
            .zones
            .iter()
            .enumerate()
            .map(|(index, (name, zone))| ZoneViewModel::from_snapshot(index, name, zone))
            .collect();
        self.total_count = snapshot.total_count;
        self.global_status = snapshot.global_status.clone();
        self.connectivity = ConnectivityState {
            connected: true,
            last_updated: Some(Utc::now()),
            error: None,
        };
        self.reconcile_overrides(snapshot, seq, now);
        self.revision += 1;
    }

    /// Re-apply overrides the merged snapshot cannot know about yet, confirm
    /// the ones it reflects, and drop those that outlived the TTL.
    fn reconcile_overrides(&mut self, snapshot: &BackendSnapshot, seq: u64, now: Instant) {
        let pending = std::mem::take(&mut self.pending);
        for entry in pending {
            let reflected = snapshot
                .zones
                .get(&entry.zone)
                .is_some_and(|zone| entry.kind.is_reflected_by(zone));
            if reflected && seq > entry.seq {
                debug!(zone = %entry.zone, "override confirmed by backend");
                continue;
            }
            if now.saturating_duration_since(entry.applied_at) > self.override_ttl {
                warn!(
                    zone = %entry.zone,
                    "override not confirmed within {} ms; using backend value",
                    self.override_ttl.as_millis()
                );
                continue;
            }
            if let Some(zone) = self.zones.iter_mut().find(|zone| zone.name == entry.zone) {
                entry.kind.apply_to(zone);
            }
            self.pending.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use backend_client::{ZoneMap, ZoneStatus};

    use super::*;

    fn zone(count: u64, price: f64, manual: bool) -> ZoneSnapshot {
        ZoneSnapshot {
            count,
            price,
            energy: "NORMAL (Lights 100%)".into(),
            status: ZoneStatus::Safe,
            manual,
        }
    }

    fn snapshot(entries: &[(&str, ZoneSnapshot)]) -> BackendSnapshot {
        let zones: ZoneMap = entries
            .iter()
            .map(|(name, zone)| (name.to_string(), zone.clone()))
            .collect();
        BackendSnapshot {
            total_count: zones.iter().map(|(_, zone)| zone.count).sum(),
            zones,
            global_status: "SAFE".into(),
        }
    }

    fn success(seq: u64, snapshot: BackendSnapshot) -> PollEvent {
        PollEvent::Snapshot {
            seq,
            elapsed: Duration::ZERO,
            snapshot,
        }
    }

    #[test]
    fn fresh_store_is_disconnected_and_empty() {
        let store = SnapshotStore::new(SequenceClock::new());
        assert!(store.zones().is_empty());
        assert_eq!(store.global_status(), "UNKNOWN");
        assert!(!store.connectivity().connected);
        assert!(store.connectivity().last_updated.is_none());
    }

    #[test]
    fn older_poll_completions_are_dropped() {
        let mut store = SnapshotStore::new(SequenceClock::new());
        let newer = snapshot(&[("Zone 1", zone(9, 100.0, false))]);
        let older = snapshot(&[("Zone 1", zone(2, 80.0, false))]);
        assert_eq!(store.apply_poll(&success(2, newer)), ApplyOutcome::Applied);
        assert_eq!(store.apply_poll(&success(1, older)), ApplyOutcome::Stale);
        assert_eq!(store.zones()[0].count, 9);
        assert_eq!(store.last_poll_seq(), 2);
    }

    #[test]
    fn stale_failures_do_not_flip_connectivity() {
        let mut store = SnapshotStore::new(SequenceClock::new());
        store.apply_poll(&success(3, snapshot(&[("Zone 1", zone(1, 1.0, false))])));
        let late_failure = PollEvent::Failed {
            seq: 2,
            elapsed: Duration::ZERO,
            kind: "unreachable",
            message: "connection refused".into(),
        };
        assert_eq!(store.apply_poll(&late_failure), ApplyOutcome::Stale);
        assert!(store.connectivity().connected);
    }

    #[test]
    fn override_survives_a_merge_dispatched_before_it() {
        let clock = SequenceClock::new();
        let mut store = SnapshotStore::new(clock.clone());
        let now = Instant::now();
        let poll_seq = clock.next();
        store.apply_poll_at(&success(poll_seq, snapshot(&[("Zone 1", zone(5, 90.0, false))])), now);

        // A poll goes out, then the operator pins the price before it returns.
        let in_flight = clock.next();
        let issued = clock.next();
        assert!(store.apply_override_at(
            "Zone 1",
            OverrideKind::Manual { price: 12.5 },
            issued,
            now
        ));
        store.apply_poll_at(&success(in_flight, snapshot(&[("Zone 1", zone(6, 91.0, false))])), now);

        let merged = store.zone("Zone 1").unwrap();
        assert_eq!(merged.count, 6);
        assert_eq!(merged.price, 12.5);
        assert!(merged.manual);
        assert_eq!(store.pending_overrides().len(), 1);
    }

    #[test]
    fn newer_merge_reflecting_the_override_confirms_it() {
        let clock = SequenceClock::new();
        let mut store = SnapshotStore::new(clock.clone());
        let now = Instant::now();
        store.apply_poll_at(&success(clock.next(), snapshot(&[("Zone 1", zone(5, 90.0, false))])), now);
        let issued = clock.next();
        store.apply_override_at("Zone 1", OverrideKind::Manual { price: 40.0 }, issued, now);

        store.apply_poll_at(&success(clock.next(), snapshot(&[("Zone 1", zone(5, 40.0, true))])), now);
        assert!(store.pending_overrides().is_empty());
        assert_eq!(store.zone("Zone 1").unwrap().price, 40.0);
    }

    #[test]
    fn unconfirmed_override_expires_after_ttl() {
        let clock = SequenceClock::new();
        let mut store = SnapshotStore::new(clock.clone()).with_override_ttl(Duration::from_secs(4));
        let start = Instant::now();
        store.apply_poll_at(&success(clock.next(), snapshot(&[("Zone 1", zone(5, 90.0, false))])), start);
        let issued = clock.next();
        store.apply_override_at("Zone 1", OverrideKind::Manual { price: 40.0 }, issued, start);

        let upstream = snapshot(&[("Zone 1", zone(5, 93.0, false))]);
        store.apply_poll_at(&success(clock.next(), upstream.clone()), start + Duration::from_secs(2));
        assert_eq!(store.zone("Zone 1").unwrap().price, 40.0);

        store.apply_poll_at(&success(clock.next(), upstream), start + Duration::from_secs(5));
        let zone = store.zone("Zone 1").unwrap();
        assert_eq!(zone.price, 93.0);
        assert!(!zone.manual);
        assert!(store.pending_overrides().is_empty());
    }

    #[test]
    fn later_override_replaces_pending_one_for_the_same_zone() {
        let mut store = SnapshotStore::new(SequenceClock::new());
        store.merge(&snapshot(&[("Zone 1", zone(5, 90.0, false))]));
        store.apply_manual_override("Zone 1", 30.0);
        store.apply_auto_override("Zone 1");
        assert_eq!(store.pending_overrides().len(), 1);
        assert_eq!(store.pending_overrides()[0].kind, OverrideKind::Auto);
        let zone = store.zone("Zone 1").unwrap();
        assert!(!zone.manual);
        assert_eq!(zone.price, 30.0);
    }

    #[test]
    fn view_carries_summary_and_revision() {
        let mut store = SnapshotStore::new(SequenceClock::new());
        store.merge(&snapshot(&[("Zone 1", zone(5, 90.0, false))]));
        let before = store.revision();
        store.report_error("down");
        let view = store.view();
        assert_eq!(view.revision, before + 1);
        assert_eq!(view.summary.zones, 1);
        assert_eq!(view.connectivity.error.as_deref(), Some("down"));
        assert!(view.stale_for_ms.is_some());
    }
}
