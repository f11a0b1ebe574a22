use std::time::Duration;

use backend_client::{BackendSnapshot, PollEvent, SequenceClock, parse_snapshot};
use zone_store::{ApplyOutcome, SnapshotStore, ZoneStatus};

const DATA: &str = r#"{
    "zones": {
        "North Stand": {"count": 12, "price": 116.0, "energy": "NORMAL (Lights 100%)", "status": "WARNING", "manual": false},
        "Gate A": {"count": 3, "price": 84.2, "energy": "ECO MODE (Lights 60%)", "status": "SAFE", "manual": false},
        "East Stand": {"count": 19, "price": 150.0, "energy": "NORMAL (Lights 100%)", "status": "CRITICAL", "manual": true}
    },
    "total_count": 34,
    "global_status": "CRITICAL"
}"#;

fn snapshot() -> BackendSnapshot {
    parse_snapshot(DATA.as_bytes()).unwrap()
}

fn failure(seq: u64, message: &str) -> PollEvent {
    PollEvent::Failed {
        seq,
        elapsed: Duration::ZERO,
        kind: "unreachable",
        message: message.to_string(),
    }
}

#[test]
fn merge_follows_snapshot_order_with_positional_ids() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());

    let zones = store.zones();
    let names: Vec<&str> = zones.iter().map(|zone| zone.name.as_str()).collect();
    let ids: Vec<&str> = zones.iter().map(|zone| zone.id.as_str()).collect();
    assert_eq!(names, ["North Stand", "Gate A", "East Stand"]);
    assert_eq!(ids, ["z1", "z2", "z3"]);
    assert_eq!(zones[2].status, ZoneStatus::Critical);
    assert_eq!(store.total_count(), 34);
    assert_eq!(store.global_status(), "CRITICAL");
    assert!(store.connectivity().connected);
    assert!(store.connectivity().error.is_none());
    assert!(store.connectivity().last_updated.is_some());
}

#[test]
fn merge_is_idempotent() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());
    let first = store.zones().to_vec();
    store.merge(&snapshot());
    assert_eq!(store.zones(), first.as_slice());
}

#[test]
fn aggregates_come_verbatim_from_upstream() {
    let mut data = snapshot();
    data.total_count = 1;
    data.global_status = "SAFE".into();
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&data);
    assert_eq!(store.total_count(), 1);
    assert_eq!(store.global_status(), "SAFE");
}

#[test]
fn manual_override_touches_only_the_named_zone() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());
    let before = store.zones().to_vec();

    assert!(store.apply_manual_override("Gate A", 12.5));
    let gate = store.zone("Gate A").unwrap();
    assert_eq!(gate.price, 12.5);
    assert!(gate.manual);
    assert_eq!(store.zones()[0], before[0]);
    assert_eq!(store.zones()[2], before[2]);
}

#[test]
fn overrides_on_unknown_zones_are_no_ops() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());
    let before = store.zones().to_vec();
    assert!(!store.apply_manual_override("Zone 99", 12.5));
    assert!(!store.apply_auto_override("Zone 99"));
    assert_eq!(store.zones(), before.as_slice());
    assert!(store.pending_overrides().is_empty());
}

#[test]
fn auto_override_clears_manual_and_keeps_price() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());
    assert!(store.apply_auto_override("East Stand"));
    let east = store.zone("East Stand").unwrap();
    assert!(!east.manual);
    assert_eq!(east.price, 150.0);
}

#[test]
fn three_failed_polls_keep_the_last_good_zones() {
    let clock = SequenceClock::new();
    let mut store = SnapshotStore::new(clock.clone());
    let ok = PollEvent::Snapshot {
        seq: clock.next(),
        elapsed: Duration::ZERO,
        snapshot: snapshot(),
    };
    assert_eq!(store.apply_poll(&ok), ApplyOutcome::Applied);
    let before = store.zones().to_vec();
    let total = store.total_count();

    for attempt in 0..3 {
        let outcome = store.apply_poll(&failure(clock.next(), &format!("refused #{attempt}")));
        assert_eq!(outcome, ApplyOutcome::Applied);
    }

    assert!(!store.connectivity().connected);
    assert_eq!(store.connectivity().error.as_deref(), Some("refused #2"));
    assert_eq!(store.zones(), before.as_slice());
    assert_eq!(store.total_count(), total);
    assert_eq!(store.global_status(), "CRITICAL");
}

#[test]
fn recovery_clears_the_error() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.report_error("backend unavailable");
    assert!(!store.connectivity().connected);
    store.merge(&snapshot());
    assert!(store.connectivity().connected);
    assert!(store.connectivity().error.is_none());
}

#[test]
fn view_serializes_for_http_consumers() {
    let mut store = SnapshotStore::new(SequenceClock::new());
    store.merge(&snapshot());
    let json = serde_json::to_value(store.view()).unwrap();
    assert_eq!(json["zones"][0]["id"], "z1");
    assert_eq!(json["zones"][2]["status"], "CRITICAL");
    assert_eq!(json["summary"]["critical_zones"], 1);
    assert_eq!(json["summary"]["eco_zones"], 1);
    assert_eq!(json["connectivity"]["connected"], true);
}
