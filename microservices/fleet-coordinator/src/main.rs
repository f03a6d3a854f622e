//! Fleet Coordinator - Load-Balancer Agent Fleet Coordination
//!
//! Keeps redundant load-balancer agents consistent, live, and
//! garbage-collected safely. Agents push heartbeats and sync reports;
//! a background sweeper purges soft-deleted resources every active agent
//! has already observed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lbfleet_core::{
    DependencyStatus, FleetService, HealthStatus, MicroserviceRuntime, ReadinessStatus, Result,
};
use tracing::info;

use fleet_coordinator::api::{self, AppState};
use fleet_coordinator::config::CoordinatorConfig;
use fleet_coordinator::gc::{GcSweeper, GcTable};
use fleet_coordinator::params::ParamDefaults;
use fleet_coordinator::registry::FleetRegistry;

#[tokio::main]
async fn main() -> Result<()> {
    let _telemetry = lbfleet_telemetry::init("fleet-coordinator")
        .map_err(|e| lbfleet_core::FleetError::Config(e.to_string()))?;

    info!("Starting Fleet Coordinator");

    let service = Arc::new(FleetCoordinatorService::new());
    MicroserviceRuntime::run(service).await
}

pub struct FleetCoordinatorService {
    config: CoordinatorConfig,
    registry: Arc<FleetRegistry>,
    sweeper: Arc<GcSweeper>,
    start_time: std::time::Instant,
}

impl FleetCoordinatorService {
    pub fn new() -> Self {
        let config = CoordinatorConfig::from_env();
        let registry = Arc::new(FleetRegistry::new(ParamDefaults {
            influx_db_output_url: config.influx_db_url.clone(),
        }));
        let (table, _stores) = GcTable::with_memory_stores();
        let sweeper = Arc::new(GcSweeper::new(registry.clone(), table));

        Self {
            config,
            registry,
            sweeper,
            start_time: std::time::Instant::now(),
        }
    }
}

impl Default for FleetCoordinatorService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl FleetService for FleetCoordinatorService {
    fn service_id(&self) -> &'static str {
        "fleet-coordinator"
    }

    async fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: self.service_id().to_string(),
            version: self.version().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    async fn ready(&self) -> ReadinessStatus {
        let active = self.registry.active_agents(Utc::now()).await.len();
        ReadinessStatus {
            ready: true,
            dependencies: vec![DependencyStatus {
                name: format!("active-agents:{}", active),
                available: true,
                latency_ms: None,
            }],
        }
    }

    async fn shutdown(&self) -> Result<()> {
        info!("Shutting down Fleet Coordinator");
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        info!(bind = %self.config.http_bind, "Starting Fleet Coordinator");

        // GC sweeps run on a fixed interval in the background
        let sweeper = self.sweeper.clone();
        let sweep_interval = self.config.gc_sweep_interval_secs;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval.max(1)));
            loop {
                ticker.tick().await;
                sweeper.sweep(Utc::now()).await;
            }
        });

        let state = AppState {
            registry: self.registry.clone(),
            sweeper: self.sweeper.clone(),
        };
        let app = api::router(state);

        let listener = tokio::net::TcpListener::bind(&self.config.http_bind).await?;
        axum::serve(listener, app)
            .await
            .map_err(|e| lbfleet_core::FleetError::Internal(e.to_string()))?;

        Ok(())
    }
}
