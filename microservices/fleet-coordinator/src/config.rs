//! Coordinator configuration

use std::env;

/// Fleet coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub http_bind: String,
    /// Default influxdb endpoint handed to agents that do not override it
    pub influx_db_url: String,
    /// Interval between garbage-collection sweeps
    pub gc_sweep_interval_secs: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            http_bind: "0.0.0.0:8080".to_string(),
            influx_db_url: "http://127.0.0.1:8086".to_string(),
            gc_sweep_interval_secs: 300,
        }
    }
}

impl CoordinatorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_bind: env::var("HTTP_BIND").unwrap_or(defaults.http_bind),
            influx_db_url: env::var("INFLUXDB_URL").unwrap_or(defaults.influx_db_url),
            gc_sweep_interval_secs: env::var("GC_SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.gc_sweep_interval_secs),
        }
    }
}
