//! Cluster-wide VRRP invariant enforcement
//!
//! Keeps the agents of a cluster, and the clusters of a zone, internally
//! consistent: peer priorities must differ, the four peer-shared VRRP
//! fields must match within a cluster, and a virtual_router_id may be
//! claimed by at most one cluster per zone. Checks and their commit run
//! under the registry's write lock, so concurrent creates/patches cannot
//! both observe "no conflict" before either lands.

use lbfleet_core::{AgentId, ClusterId, FleetError, Result, ZoneId};
use tracing::info;

use crate::params::{AgentParams, AgentParamsInput, VrrpParams};
use crate::registry::{Agent, Cluster, FleetRegistry, FleetState};

/// Find the cluster in `zone_id` (other than `exclude`) whose agents
/// already carry `virtual_router_id`, if any.
pub(crate) fn find_vrid_owner(
    state: &FleetState,
    zone_id: ZoneId,
    virtual_router_id: u32,
    exclude: ClusterId,
) -> Option<Cluster> {
    for cluster in state.clusters.values() {
        if cluster.zone_id != zone_id || cluster.id == exclude {
            continue;
        }
        let claimed = state.agents_in_cluster(cluster.id).iter().any(|agent| {
            agent
                .params
                .as_ref()
                .map(|p| p.vrrp.virtual_router_id == virtual_router_id)
                .unwrap_or(false)
        });
        if claimed {
            return Some(cluster.clone());
        }
    }
    None
}

/// Validate a new agent's VRRP parameters against its future cluster:
/// the full peer rule against every existing member, then zone-wide
/// virtual_router_id uniqueness.
pub(crate) fn validate_create(
    state: &FleetState,
    cluster: &Cluster,
    new_params: &AgentParams,
) -> Result<()> {
    for peer in state.agents_in_cluster(cluster.id) {
        let Some(ref peer_params) = peer.params else {
            continue;
        };
        if let Some(msg) = new_params.vrrp.peer_mismatch(&peer_params.vrrp) {
            return Err(FleetError::Conflict(format!(
                "conflict with agent {}({}): {}",
                peer.name, peer.id, msg
            )));
        }
    }
    if let Some(owner) = find_vrid_owner(
        state,
        cluster.zone_id,
        new_params.vrrp.virtual_router_id,
        cluster.id,
    ) {
        return Err(FleetError::Conflict(format!(
            "cluster {}({}) already has virtual_router_id {}",
            owner.name, owner.id, new_params.vrrp.virtual_router_id
        )));
    }
    Ok(())
}

/// Peer-consistency rule between any two agents of the same cluster:
/// virtual_router_id, advert_int, preempt, and pass must be identical;
/// priority is deliberately excluded (peers must differ there).
pub fn validate_peer_consistency(a: &Agent, b: &Agent) -> Result<()> {
    let (Some(pa), Some(pb)) = (a.params.as_ref(), b.params.as_ref()) else {
        return Ok(());
    };
    if let Some(msg) = pa.vrrp.peer_mismatch(&pb.vrrp) {
        return Err(FleetError::Conflict(format!(
            "agents {}({}) and {}({}): {}",
            a.name, a.id, b.name, b.id, msg
        )));
    }
    Ok(())
}

fn check_priority_unique(
    state: &FleetState,
    cluster_id: ClusterId,
    self_id: AgentId,
    vrrp: &VrrpParams,
) -> Result<()> {
    for peer in state.agents_in_cluster(cluster_id) {
        if peer.id == self_id {
            continue;
        }
        let Some(ref peer_params) = peer.params else {
            continue;
        };
        if peer_params.vrrp.priority == vrrp.priority {
            return Err(FleetError::Conflict(format!(
                "peer agent {}({}) already has vrrp priority {}",
                peer.name, peer.id, vrrp.priority
            )));
        }
    }
    Ok(())
}

impl FleetRegistry {
    /// Patch an agent's parameter set: read the current value, overlay the
    /// supplied fields, validate the candidate, re-check the conflict rules
    /// the change touches, commit, then fan the peer-shared VRRP fields out
    /// to the rest of the cluster. Propagation is fail-fast: the first peer
    /// failure aborts the remaining updates, which can leave the cluster
    /// inconsistent until the next successful patch.
    pub async fn patch_params(&self, agent_id: AgentId, input: AgentParamsInput) -> Result<()> {
        let mut state = self.state.write().await;
        let agent = state
            .agents
            .get(&agent_id)
            .ok_or_else(|| FleetError::NotFound(format!("agent {}", agent_id)))?;
        let cluster_id = agent.cluster_id;
        let agent_name = agent.name.clone();
        let old_params = agent.params.clone().unwrap_or_default();

        let candidate = AgentParams::overlay_on(old_params.clone(), &input, &self.defaults)?;

        // new virtual_router_id must stay unique across the zone
        if candidate.vrrp.virtual_router_id != old_params.vrrp.virtual_router_id {
            let cluster = state
                .clusters
                .get(&cluster_id)
                .cloned()
                .ok_or_else(|| FleetError::NotFound(format!("cluster {}", cluster_id)))?;
            if let Some(owner) = find_vrid_owner(
                &state,
                cluster.zone_id,
                candidate.vrrp.virtual_router_id,
                cluster.id,
            ) {
                return Err(FleetError::Conflict(format!(
                    "cluster {}({}) already has virtual_router_id {}",
                    owner.name, owner.id, candidate.vrrp.virtual_router_id
                )));
            }
        }
        // new priority must stay unique in the cluster
        if candidate.vrrp.priority != old_params.vrrp.priority {
            check_priority_unique(&state, cluster_id, agent_id, &candidate.vrrp)?;
        }

        let new_vrrp = candidate.vrrp.clone();
        let agent = state
            .agents
            .get_mut(&agent_id)
            .ok_or_else(|| FleetError::NotFound(format!("agent {}", agent_id)))?;
        agent.params = Some(candidate);
        state.record_audit(agent_id, "params-patch", "params updated".to_string());

        if old_params.vrrp.needs_update_peer(&new_vrrp) {
            info!(
                agent = %agent_id,
                name = %agent_name,
                "Updating peer agents' vrrp params"
            );
            let peer_ids: Vec<AgentId> = state
                .agents_in_cluster(cluster_id)
                .iter()
                .filter(|a| a.id != agent_id)
                .map(|a| a.id)
                .collect();
            for peer_id in peer_ids {
                let peer = state
                    .agents
                    .get_mut(&peer_id)
                    .ok_or_else(|| FleetError::NotFound(format!("agent {}", peer_id)))?;
                // a peer that was never configured has no VRRP state to align
                let Some(ref mut peer_params) = peer.params else {
                    continue;
                };
                peer_params.vrrp.update_by(&new_vrrp);
                state.record_audit(peer_id, "params-peer-update", "vrrp peer fields updated".to_string());
            }
        }
        Ok(())
    }
}
