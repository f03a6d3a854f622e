//! Lbfleet Core - Shared domain types and service infrastructure
//!
//! This crate provides:
//! - Standard service trait all fleet services must implement
//! - Common domain types (AgentId, ClusterId, etc.)
//! - Error handling utilities
//! - Configuration management

pub mod config;
pub mod domain;
pub mod error;
pub mod service;

pub use config::ServiceConfig;
pub use domain::*;
pub use error::{FleetError, Result};
pub use service::{DependencyStatus, FleetService, HealthStatus, MicroserviceRuntime, ReadinessStatus};
