//! Process-level state for the stadium dashboard.
//!
//! `SnapshotStore` turns backend snapshots into ordered [`ZoneViewModel`]s,
//! keeps the last good data across failed polls, and layers operator
//! overrides on top until the backend confirms them.

mod model;
mod store;

pub use backend_client::ZoneStatus;
pub use model::{ConnectivityState, OperationalSummary, ZoneViewModel};
pub use store::{
    ApplyOutcome, OVERRIDE_TTL, OverrideKind, PendingOverride, SnapshotStore, StoreView,
};
