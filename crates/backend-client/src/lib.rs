//! Client side of the stadium analytics backend.
//!
//! - `types`: wire shapes for `GET /data` and the override commands.
//! - `client`: blocking HTTP client with the single-failure error model.
//! - `poller`: fixed-period poll timer with sequence tagging and cancellation.

pub mod client;
pub mod error;
pub mod poller;
pub mod types;

pub use client::{BackendClient, DEFAULT_BACKEND_URL, SnapshotSource, parse_snapshot};
pub use error::PollError;
pub use poller::{CancellationToken, POLL_INTERVAL, PollEvent, Poller, SequenceClock, poll_once};
pub use types::{BackendSnapshot, ZoneMap, ZoneSnapshot, ZoneStatus};
