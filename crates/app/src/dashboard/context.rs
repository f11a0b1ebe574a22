//! Process-wide state owned by the dashboard: the backend client, the shared
//! sequence clock, the snapshot store, and the normalized layout.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use backend_client::{BackendClient, SequenceClock};
use heatmap::{ZoneLayout, load_layout};
use tracing::{info, warn};
use zone_store::{SnapshotStore, StoreView};

use crate::dashboard::{config::DashboardConfig, data::SharedStore};

pub(crate) struct AppContext {
    pub(crate) config: DashboardConfig,
    pub(crate) client: Arc<BackendClient>,
    pub(crate) clock: SequenceClock,
    pub(crate) store: SharedStore,
    pub(crate) layout: Arc<ZoneLayout>,
}

impl AppContext {
    /// Build the client and store and read the layout once. A missing or
    /// broken layout file degrades to an empty layout.
    pub(crate) fn create(config: DashboardConfig) -> Result<Self> {
        let client = BackendClient::new(&config.backend_url)
            .with_context(|| format!("Failed to build client for {}", config.backend_url))?;
        let clock = SequenceClock::new();
        let store = SnapshotStore::new(clock.clone());

        let layout = match load_layout(&config.layout_path) {
            Ok(layout) => {
                info!(
                    "Loaded {} zone polygons from {}",
                    layout.len(),
                    config.layout_path.display()
                );
                layout
            }
            Err(err) => {
                warn!("{err}; continuing with an empty layout");
                ZoneLayout::default()
            }
        };

        Ok(Self {
            config,
            client: Arc::new(client),
            clock,
            store: Arc::new(Mutex::new(store)),
            layout: Arc::new(layout),
        })
    }

    /// Copy of the store for HTTP consumers. `None` if the lock is poisoned.
    pub(crate) fn view(&self) -> Option<StoreView> {
        self.store.lock().ok().map(|store| store.view())
    }

    /// Tear down the context once every worker has been joined, returning the
    /// final store state.
    pub(crate) fn dispose(self) -> Option<StoreView> {
        let view = self.view();
        if let Some(view) = &view {
            info!(
                revision = view.revision,
                zones = view.zones.len(),
                "Dashboard context disposed"
            );
        }
        view
    }
}
