//! Agent registry
//!
//! One record per load-balancer agent: identity, cluster membership,
//! last-heartbeat time, heartbeat timeout, and per-resource-kind sync
//! watermarks. All mutation goes through a single write lock so that
//! cross-agent invariant checks and their commits are serialized.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use lbfleet_core::{AgentId, ClusterId, FleetError, HaState, ResourceKind, Result, ZoneId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::cluster;
use crate::params::{AgentParams, AgentParamsInput, ParamDefaults};

pub const HB_TIMEOUT_DEFAULT_SECS: i64 = 3600;
const OPS_LOG_CAPACITY: usize = 1024;

/// A load-balancer agent record
#[derive(Debug, Clone, Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub cluster_id: ClusterId,
    pub name: String,
    pub ip: Option<Ipv4Addr>,
    pub version: Option<String>,
    pub ha_state: HaState,
    pub hb_last_seen: Option<DateTime<Utc>>,
    pub hb_timeout_seconds: i64,
    pub params: Option<AgentParams>,
    pub sync_watermarks: BTreeMap<ResourceKind, DateTime<Utc>>,
}

impl Agent {
    /// Liveness: false until the first heartbeat, then true while the
    /// truncated whole-second age stays below the timeout. An age equal
    /// to the timeout is already inactive.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        let Some(last_seen) = self.hb_last_seen else {
            return false;
        };
        (now - last_seen).num_seconds() < self.hb_timeout_seconds
    }
}

/// A load-balancer cluster record
#[derive(Debug, Clone, Serialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub zone_id: ZoneId,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateClusterInput {
    pub name: String,
    pub zone_id: ZoneId,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAgentInput {
    pub name: String,
    pub cluster_id: Option<ClusterId>,
    pub hb_timeout: Option<i64>,
    pub params: Option<AgentParamsInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeartbeatInput {
    pub ip: Option<String>,
    pub ha_state: Option<String>,
    pub version: Option<String>,
}

/// Generic agent update: heartbeat timeout and/or any subset of the seven
/// per-kind sync-timestamp report fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentUpdateInput {
    pub hb_timeout: Option<i64>,
    pub loadbalancers: Option<DateTime<Utc>>,
    pub loadbalancer_listeners: Option<DateTime<Utc>>,
    pub loadbalancer_listener_rules: Option<DateTime<Utc>>,
    pub loadbalancer_backend_groups: Option<DateTime<Utc>>,
    pub loadbalancer_backends: Option<DateTime<Utc>>,
    pub loadbalancer_acls: Option<DateTime<Utc>>,
    pub loadbalancer_certificates: Option<DateTime<Utc>>,
}

impl AgentUpdateInput {
    fn watermarks(&self) -> Vec<(ResourceKind, DateTime<Utc>)> {
        let fields = [
            (ResourceKind::Loadbalancers, self.loadbalancers),
            (ResourceKind::LoadbalancerListeners, self.loadbalancer_listeners),
            (ResourceKind::LoadbalancerListenerRules, self.loadbalancer_listener_rules),
            (ResourceKind::LoadbalancerBackendGroups, self.loadbalancer_backend_groups),
            (ResourceKind::LoadbalancerBackends, self.loadbalancer_backends),
            (ResourceKind::LoadbalancerAcls, self.loadbalancer_acls),
            (ResourceKind::LoadbalancerCertificates, self.loadbalancer_certificates),
        ];
        fields
            .into_iter()
            .filter_map(|(kind, ts)| ts.map(|t| (kind, t)))
            .collect()
    }
}

/// Audit trail entry for state changes worth keeping
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at: DateTime<Utc>,
    pub agent: AgentId,
    pub action: &'static str,
    pub detail: String,
}

#[derive(Default)]
pub(crate) struct FleetState {
    pub(crate) clusters: HashMap<ClusterId, Cluster>,
    pub(crate) agents: HashMap<AgentId, Agent>,
    pub(crate) ops_log: Vec<AuditEvent>,
}

impl FleetState {
    pub(crate) fn agents_in_cluster(&self, cluster_id: ClusterId) -> Vec<&Agent> {
        self.agents
            .values()
            .filter(|a| a.cluster_id == cluster_id)
            .collect()
    }

    pub(crate) fn record_audit(&mut self, agent: AgentId, action: &'static str, detail: String) {
        if self.ops_log.len() >= OPS_LOG_CAPACITY {
            self.ops_log.remove(0);
        }
        self.ops_log.push(AuditEvent {
            at: Utc::now(),
            agent,
            action,
            detail,
        });
    }
}

/// Registry of clusters and agents, constructed once at process start and
/// passed by reference to whichever component needs it.
pub struct FleetRegistry {
    pub(crate) state: RwLock<FleetState>,
    pub(crate) defaults: ParamDefaults,
}

impl FleetRegistry {
    pub fn new(defaults: ParamDefaults) -> Self {
        Self {
            state: RwLock::new(FleetState::default()),
            defaults,
        }
    }

    pub async fn create_cluster(&self, input: CreateClusterInput) -> Result<Cluster> {
        if input.name.is_empty() {
            return Err(FleetError::invalid_parameter("name", "must not be empty"));
        }
        let cluster = Cluster {
            id: ClusterId::generate(),
            zone_id: input.zone_id,
            name: input.name,
        };
        let mut state = self.state.write().await;
        state.clusters.insert(cluster.id, cluster.clone());
        info!(cluster = %cluster.id, zone = %cluster.zone_id, "Cluster created");
        Ok(cluster)
    }

    pub async fn get_cluster(&self, id: ClusterId) -> Result<Cluster> {
        self.state
            .read()
            .await
            .clusters
            .get(&id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("cluster {}", id)))
    }

    /// Create an agent. Parameter conflict checks and the insert run under
    /// one write lock, so two concurrent creates claiming the same
    /// virtual_router_id or priority cannot both pass.
    pub async fn create_agent(&self, input: CreateAgentInput) -> Result<Agent> {
        if input.name.is_empty() {
            return Err(FleetError::invalid_parameter("name", "must not be empty"));
        }
        let cluster_id = input
            .cluster_id
            .ok_or_else(|| FleetError::invalid_parameter("cluster_id", "required"))?;
        let hb_timeout = input.hb_timeout.unwrap_or(HB_TIMEOUT_DEFAULT_SECS);
        if hb_timeout < 0 {
            return Err(FleetError::invalid_parameter("hb_timeout", "must be non-negative"));
        }

        let mut state = self.state.write().await;
        let cluster = state
            .clusters
            .get(&cluster_id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("cluster {}", cluster_id)))?;

        let params = match input.params {
            Some(ref params_input) => {
                let candidate = AgentParams::from_input(params_input, &self.defaults)?;
                cluster::validate_create(&state, &cluster, &candidate)?;
                Some(candidate)
            }
            None => None,
        };

        let agent = Agent {
            id: AgentId::generate(),
            cluster_id,
            name: input.name,
            ip: None,
            version: None,
            ha_state: HaState::Unknown,
            hb_last_seen: None,
            hb_timeout_seconds: hb_timeout,
            params,
            sync_watermarks: BTreeMap::new(),
        };
        state.agents.insert(agent.id, agent.clone());
        info!(agent = %agent.id, cluster = %cluster_id, name = %agent.name, "Agent created");
        Ok(agent)
    }

    pub async fn get_agent(&self, id: AgentId) -> Result<Agent> {
        self.state
            .read()
            .await
            .agents
            .get(&id)
            .cloned()
            .ok_or_else(|| FleetError::NotFound(format!("agent {}", id)))
    }

    pub async fn list_agents(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.state.read().await.agents.values().cloned().collect();
        agents.sort_by_key(|a| a.id);
        agents
    }

    /// Snapshot of the agents currently considered alive
    pub async fn active_agents(&self, now: DateTime<Utc>) -> Vec<Agent> {
        self.state
            .read()
            .await
            .agents
            .values()
            .filter(|a| a.is_active(now))
            .cloned()
            .collect()
    }

    /// Record a heartbeat: refresh hb_last_seen unconditionally, apply any
    /// supplied fields, and return the set of fields that actually changed.
    /// A heartbeat that only refreshed hb_last_seen is not audit-logged.
    pub async fn record_heartbeat(
        &self,
        agent_id: AgentId,
        input: HeartbeatInput,
    ) -> Result<Vec<&'static str>> {
        let ip = match input.ip {
            Some(ref raw) => Some(raw.parse::<Ipv4Addr>().map_err(|_| {
                FleetError::invalid_parameter("ip", format!("invalid IPv4 address {:?}", raw))
            })?),
            None => None,
        };
        let ha_state = match input.ha_state {
            Some(ref raw) => Some(HaState::parse(raw).ok_or_else(|| {
                FleetError::invalid_parameter(
                    "ha_state",
                    format!("invalid state {:?}, want one of MASTER/BACKUP/FAULT/STOP/UNKNOWN", raw),
                )
            })?),
            None => None,
        };

        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| FleetError::NotFound(format!("agent {}", agent_id)))?;

        let mut changed = vec!["hb_last_seen"];
        agent.hb_last_seen = Some(Utc::now());
        if let Some(ip) = ip {
            if agent.ip != Some(ip) {
                agent.ip = Some(ip);
                changed.push("ip");
            }
        }
        if let Some(ha_state) = ha_state {
            if agent.ha_state != ha_state {
                agent.ha_state = ha_state;
                changed.push("ha_state");
            }
        }
        if let Some(version) = input.version {
            if agent.version.as_deref() != Some(version.as_str()) {
                agent.version = Some(version);
                changed.push("version");
            }
        }

        if changed.len() > 1 {
            // something changed besides hb_last_seen
            let name = agent.name.clone();
            let detail = changed.join(",");
            info!(agent = %agent_id, name = %name, changed = %detail, "Agent state changed");
            state.record_audit(agent_id, "heartbeat", detail);
        }
        Ok(changed)
    }

    /// Generic agent update: heartbeat timeout and per-kind sync reports.
    /// Watermark reports are monotonic per agent - a regressing value is a
    /// stale report and is silently dropped; a value ahead of the server
    /// clock rejects the whole update. The update refreshes hb_last_seen.
    pub async fn update_agent(&self, agent_id: AgentId, input: AgentUpdateInput) -> Result<()> {
        if let Some(t) = input.hb_timeout {
            if t < 0 {
                return Err(FleetError::invalid_parameter("hb_timeout", "must be non-negative"));
            }
        }

        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| FleetError::NotFound(format!("agent {}", agent_id)))?;

        let now = Utc::now();
        let mut accepted = Vec::new();
        for (kind, reported) in input.watermarks() {
            if let Some(current) = agent.sync_watermarks.get(&kind) {
                if reported < *current {
                    // stale report, possible with objects deleted meanwhile
                    continue;
                }
            }
            if reported > now {
                return Err(FleetError::invalid_parameter(
                    kind.as_str(),
                    format!("new time is in the future: {} > {}", reported, now),
                ));
            }
            accepted.push((kind, reported));
        }

        if let Some(t) = input.hb_timeout {
            agent.hb_timeout_seconds = t;
        }
        for (kind, reported) in accepted {
            agent.sync_watermarks.insert(kind, reported);
        }
        agent.hb_last_seen = Some(now);
        Ok(())
    }

    pub async fn ops_log(&self) -> Vec<AuditEvent> {
        self.state.read().await.ops_log.clone()
    }
}
