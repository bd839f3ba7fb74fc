pub mod api; // REST gateway + mock
pub mod chat; // Support chat state machine
pub mod config;
pub mod form; // Negotiation case editing
pub mod models;
pub mod poa; // Power of Attorney PDF
pub mod reconcile; // Server/overlay list merge
pub mod socket; // Socket.IO-style event transport
pub mod storage;
pub mod store; // Bills + negotiations state
pub mod upload; // Upload progress simulator
pub mod validation;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .is_ok();

    if installed {
        tracing::info!("{} client core v{}", config::APP_NAME, config::APP_VERSION);
    }
}
