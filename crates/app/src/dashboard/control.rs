//! Operator price overrides.
//!
//! A command is stamped on the shared sequence clock before it is sent, so a
//! poll dispatched earlier can never undo it once it lands in the store. The
//! store is only touched after the backend accepted the command.

use std::sync::Arc;

use backend_client::{BackendClient, PollError, SequenceClock};
use thiserror::Error;
use tracing::{info, warn};
use zone_store::{OverrideKind, ZoneViewModel};

use crate::dashboard::data::{RenderTrigger, SharedStore};

#[derive(Debug, Error)]
pub(crate) enum ControlError {
    #[error("price must be a finite number >= 0 (got {0})")]
    InvalidPrice(f64),
    #[error(transparent)]
    Backend(#[from] PollError),
    #[error("snapshot store unavailable")]
    StorePoisoned,
}

/// Reject prices the control form would not submit.
pub(crate) fn validate_price(price: f64) -> Result<f64, ControlError> {
    if price.is_finite() && price >= 0.0 {
        Ok(price)
    } else {
        Err(ControlError::InvalidPrice(price))
    }
}

/// Result of an accepted override command.
#[derive(Debug)]
pub(crate) struct OverrideApplied {
    /// `false` if the zone was not part of the current snapshot.
    pub(crate) applied: bool,
    pub(crate) zone: Option<ZoneViewModel>,
}

#[derive(Clone)]
pub(crate) struct ControlPlane {
    client: Arc<BackendClient>,
    clock: SequenceClock,
    store: SharedStore,
    render: Option<RenderTrigger>,
}

impl ControlPlane {
    pub(crate) fn new(
        client: Arc<BackendClient>,
        clock: SequenceClock,
        store: SharedStore,
        render: Option<RenderTrigger>,
    ) -> Self {
        Self {
            client,
            clock,
            store,
            render,
        }
    }

    /// Pin `zone` to `price` upstream, then mirror it locally.
    pub(crate) fn set_manual_price(
        &self,
        zone: &str,
        price: f64,
    ) -> Result<OverrideApplied, ControlError> {
        let price = match validate_price(price) {
            Ok(price) => price,
            Err(err) => {
                record_override("manual", "invalid");
                return Err(err);
            }
        };
        let seq = self.clock.next();
        let _span = tracing::info_span!("control.set_price", zone, price, seq).entered();
        if let Err(err) = self.client.set_manual_price(zone, price) {
            warn!("Manual price for {zone} rejected: {err}");
            record_override("manual", err.kind());
            return Err(err.into());
        }
        info!("Manual price {price:.2} set for {zone}");
        self.apply(zone, OverrideKind::Manual { price }, seq, "manual")
    }

    /// Return `zone` to automatic pricing upstream, then mirror it locally.
    pub(crate) fn set_auto_price(&self, zone: &str) -> Result<OverrideApplied, ControlError> {
        let seq = self.clock.next();
        let _span = tracing::info_span!("control.set_auto", zone, seq).entered();
        if let Err(err) = self.client.set_auto_price(zone) {
            warn!("Automatic pricing for {zone} rejected: {err}");
            record_override("auto", err.kind());
            return Err(err.into());
        }
        info!("Automatic pricing resumed for {zone}");
        self.apply(zone, OverrideKind::Auto, seq, "auto")
    }

    fn apply(
        &self,
        zone: &str,
        kind: OverrideKind,
        seq: u64,
        label: &'static str,
    ) -> Result<OverrideApplied, ControlError> {
        let mut store = self.store.lock().map_err(|_| ControlError::StorePoisoned)?;
        let applied = store.apply_override(zone, kind, seq);
        let view = store.zone(zone).cloned();
        drop(store);

        record_override(label, if applied { "applied" } else { "unknown_zone" });
        if applied {
            if let Some(render) = &self.render {
                render.fire();
            }
        } else {
            warn!("Override for {zone} accepted upstream but zone is not in the current snapshot");
        }
        Ok(OverrideApplied {
            applied,
            zone: view,
        })
    }
}

fn record_override(kind: &'static str, outcome: &'static str) {
    metrics::counter!("stadium_override_total", "kind" => kind, "outcome" => outcome).increment(1);
}
