//! Shared application state handed to every axum handler.

use std::sync::Arc;

use asya_store::EnvelopeStore;
use asya_transport::Transport;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::tool_catalog::ToolCatalog;

pub struct AppState {
    pub store: Arc<EnvelopeStore>,
    pub transport: Arc<dyn Transport>,
    pub config: GatewayConfig,
    pub catalog: ToolCatalog,
    /// Cancelled on SIGINT/SIGTERM; threaded into every store/transport call
    /// so in-flight requests abort with `context_cancelled` on shutdown
    /// instead of racing the process exit (`spec.md` §5).
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        store: Arc<EnvelopeStore>,
        transport: Arc<dyn Transport>,
        config: GatewayConfig,
        catalog: ToolCatalog,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self { store, transport, config, catalog, shutdown })
    }
}
