//! Configuration management for fleet services

use crate::error::{FleetError, Result};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_port: u16,
    pub log_level: String,
    pub enable_telemetry: bool,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "unknown".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|e| FleetError::Config(format!("Invalid HTTP_PORT: {}", e)))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            enable_telemetry: env::var("ENABLE_TELEMETRY")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        })
    }
}
