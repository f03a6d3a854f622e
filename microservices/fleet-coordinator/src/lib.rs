//! Fleet Coordinator - Load-Balancer Agent Fleet Coordination
//!
//! Keeps a cluster of redundant load-balancer agents (each running a
//! keepalived/haproxy/telegraf triad) consistent, live, and
//! garbage-collected safely:
//! - VRRP/haproxy/telegraf parameter model with defaulting and validation
//! - Config template storage and grammar validation
//! - Agent heartbeat, liveness, and sync-watermark tracking
//! - Cluster/zone-wide VRRP invariant enforcement with peer propagation
//! - Quorum-gated purge of soft-deleted resources

pub mod api;
pub mod cluster;
pub mod config;
pub mod gc;
pub mod params;
pub mod registry;
pub mod templates;

pub use config::CoordinatorConfig;
pub use gc::{GcSweeper, GcTable, InMemorySoftDeleteStore, SoftDeletableStore};
pub use registry::FleetRegistry;
