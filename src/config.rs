use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

/// Application-level constants
pub const APP_NAME: &str = "Reportflow";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn default_log_filter() -> String {
    "info,reportflow=debug".to_string()
}

/// Initialize tracing with the env filter, falling back to the default.
/// Safe to call once per process; embedding applications that bring their
/// own subscriber should skip this.
pub fn init_telemetry() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_log_filter())),
        )
        .init();
    tracing::info!("{APP_NAME} starting v{APP_VERSION}");
}

/// Default on-disk location for the workflow database.
pub fn default_database_path() -> PathBuf {
    PathBuf::from("reportflow.db")
}
