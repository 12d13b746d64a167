//! Shared application state.

use std::fmt;
use std::sync::Arc;

use snacks_core::store::AssetStore;
use snacks_workflow::application::worker::OrchestratorHandle;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Enqueues workflow requests and answers status queries.
    pub orchestrator: OrchestratorHandle,
    /// Read access to asset records.
    pub asset_store: Arc<dyn AssetStore>,
    /// Gateway used to build image URLs.
    pub ipfs_gateway: Arc<str>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("ipfs_gateway", &self.ipfs_gateway)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        orchestrator: OrchestratorHandle,
        asset_store: Arc<dyn AssetStore>,
        ipfs_gateway: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            orchestrator,
            asset_store,
            ipfs_gateway: ipfs_gateway.into(),
        }
    }
}
