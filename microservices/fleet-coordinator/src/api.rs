//! HTTP surface
//!
//! Thin axum handlers over the registry; callers are assumed to be
//! authenticated by the surrounding platform. Errors map to status codes
//! through the shared error taxonomy.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use lbfleet_core::{AgentId, ClusterId, FleetError};
use uuid::Uuid;

use crate::gc::GcSweeper;
use crate::params::AgentParamsInput;
use crate::registry::{
    Agent, AgentUpdateInput, Cluster, CreateAgentInput, CreateClusterInput, FleetRegistry,
    HeartbeatInput,
};
use crate::templates::AgentConfigBundle;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<FleetRegistry>,
    pub sweeper: Arc<GcSweeper>,
}

pub struct ApiError(FleetError);

impl From<FleetError> for ApiError {
    fn from(err: FleetError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({
            "error_code": self.0.error_code(),
            "message": self.0.to_string(),
        }));
        (status, body).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(|| async { "OK" }))
        .route("/status", get(status))
        .route("/clusters", post(create_cluster))
        .route("/clusters/{id}", get(get_cluster))
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/{id}", get(get_agent).put(update_agent))
        .route("/agents/{id}/heartbeat", post(heartbeat))
        .route("/agents/{id}/params-patch", post(params_patch))
        .route("/agents/{id}/config", get(agent_config))
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let now = Utc::now();
    let agents = state.registry.list_agents().await;
    let active = agents.iter().filter(|a| a.is_active(now)).count();
    Json(serde_json::json!({
        "agents": agents.len(),
        "active_agents": active,
        "gc_purged_total": state.sweeper.purged_total(),
        "healthy": true,
    }))
}

async fn create_cluster(
    State(state): State<AppState>,
    Json(input): Json<CreateClusterInput>,
) -> Result<Json<Cluster>, ApiError> {
    let cluster = state.registry.create_cluster(input).await?;
    Ok(Json(cluster))
}

async fn get_cluster(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Cluster>, ApiError> {
    let cluster = state.registry.get_cluster(ClusterId(id)).await?;
    Ok(Json(cluster))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(input): Json<CreateAgentInput>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.registry.create_agent(input).await?;
    Ok(Json(agent))
}

async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.registry.list_agents().await)
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, ApiError> {
    let agent = state.registry.get_agent(AgentId(id)).await?;
    Ok(Json(agent))
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<AgentUpdateInput>,
) -> Result<(), ApiError> {
    state.registry.update_agent(AgentId(id), input).await?;
    Ok(())
}

async fn heartbeat(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<HeartbeatInput>,
) -> Result<(), ApiError> {
    state.registry.record_heartbeat(AgentId(id), input).await?;
    Ok(())
}

async fn params_patch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<AgentParamsInput>,
) -> Result<(), ApiError> {
    state.registry.patch_params(AgentId(id), input).await?;
    Ok(())
}

async fn agent_config(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AgentConfigBundle>, ApiError> {
    let agent = state.registry.get_agent(AgentId(id)).await?;
    let Some(ref params) = agent.params else {
        return Err(FleetError::NotFound(format!("agent {} has no params", agent.id)).into());
    };
    let bundle = AgentConfigBundle::build(agent.id, params)?;
    Ok(Json(bundle))
}
