use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "BillPilot";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default REST gateway.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Default socket endpoint.
pub const DEFAULT_SOCKET_URL: &str = "ws://localhost:5000/socket";

/// Default per-request timeout for the REST gateway.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "billpilot_lib=info,warn"
}

/// Get the application data directory.
/// Falls back to the working directory when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// File backing the persisted local key-value store.
pub fn local_storage_path() -> PathBuf {
    app_data_dir().join("local_storage.json")
}

// ═══════════════════════════════════════════════════════════
// Component configuration
// ═══════════════════════════════════════════════════════════

/// Tuning for the upload progress simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Progress never reaches this value before the upload call resolves.
    pub ceiling: f64,
    /// Fraction of the remaining gap covered per tick.
    pub decay_factor: f64,
    /// Lower bound on the per-tick increment.
    pub min_step: f64,
    /// Upper bound (exclusive) on the random jitter added per tick.
    pub jitter_max: f64,
    /// Interval between two decaying-growth steps.
    pub tick_interval: Duration,
    /// Time taken by the linear closeout from the captured value to 100.
    pub finalize_duration: Duration,
    /// Pause at 100 before the task leaves the active set.
    pub grace_delay: Duration,
    /// Ordered parsing stage labels shown while simulating.
    pub stages: Vec<String>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ceiling: 99.0,
            decay_factor: 0.04,
            min_step: 0.15,
            jitter_max: 0.35,
            tick_interval: Duration::from_millis(400),
            finalize_duration: Duration::from_millis(800),
            grace_delay: Duration::from_millis(600),
            stages: [
                "Uploading file…",
                "Extracting text…",
                "Detecting line items…",
                "Matching billing codes…",
                "Validating totals…",
                "Checking for errors…",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        }
    }
}

/// Timings for the chat panel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Watchdog window for one turn.
    pub response_timeout: Duration,
    /// How long the three-dot animation is shown before the textual label.
    pub dots_window: Duration,
    /// Interval between two thinking labels.
    pub label_interval: Duration,
    /// Scheduler tick used by the async session runner.
    pub tick_interval: Duration,
    /// Panel identifier sent with every outbound message.
    pub panel_type: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(90),
            dots_window: Duration::from_secs(2),
            label_interval: Duration::from_secs(4),
            tick_interval: Duration::from_millis(250),
            panel_type: "support".to_string(),
        }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub socket_url: String,
    pub request_timeout_secs: u64,
    pub chat: ChatConfig,
    pub upload: SimulatorConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            chat: ChatConfig::default(),
            upload: SimulatorConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `BILLPILOT_API_URL`, `BILLPILOT_SOCKET_URL`
    /// and `BILLPILOT_TIMEOUT_SECS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(url) = lookup("BILLPILOT_API_URL") {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = lookup("BILLPILOT_SOCKET_URL") {
            config.socket_url = url;
        }
        if let Some(raw) = lookup("BILLPILOT_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "Ignoring invalid BILLPILOT_TIMEOUT_SECS"),
            }
        }
        config
    }
}
