//! Fleet coordination end-to-end tests
//!
//! Drives the registry, invariant checks, and GC sweep together the way
//! the request handlers and the background sweeper do in production.

use std::sync::Arc;

use chrono::{Duration, Utc};
use lbfleet_core::{FleetError, RecordId, ResourceKind, ZoneId};

use fleet_coordinator::gc::{GcSweeper, GcTable};
use fleet_coordinator::params::{AgentParamsInput, ParamDefaults, VrrpParamsInput};
use fleet_coordinator::registry::{
    AgentUpdateInput, CreateAgentInput, CreateClusterInput, FleetRegistry, HeartbeatInput,
};
use fleet_coordinator::templates::AgentConfigBundle;

fn registry() -> Arc<FleetRegistry> {
    Arc::new(FleetRegistry::new(ParamDefaults {
        influx_db_output_url: "http://influxdb:8086".to_string(),
    }))
}

fn params_input(priority: u32, vrid: u32) -> AgentParamsInput {
    AgentParamsInput {
        vrrp: Some(VrrpParamsInput {
            priority: Some(priority),
            virtual_router_id: Some(vrid),
            interface: Some("eth0".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_cluster_zone_conflict_scenario() {
    let reg = registry();
    let zone = ZoneId::generate();

    let c1 = reg
        .create_cluster(CreateClusterInput {
            name: "c1".to_string(),
            zone_id: zone,
        })
        .await
        .unwrap();
    let c2 = reg
        .create_cluster(CreateClusterInput {
            name: "c2".to_string(),
            zone_id: zone,
        })
        .await
        .unwrap();

    // agent A: cluster C1, zone Z, priority 100, virtual_router_id 5
    reg.create_agent(CreateAgentInput {
        name: "a".to_string(),
        cluster_id: Some(c1.id),
        params: Some(params_input(100, 5)),
        ..Default::default()
    })
    .await
    .unwrap();

    // agent B in C1 with priority 100: conflict
    let err = reg
        .create_agent(CreateAgentInput {
            name: "b".to_string(),
            cluster_id: Some(c1.id),
            params: Some(params_input(100, 5)),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));

    // agent B in C1 with priority 200, virtual_router_id 5: succeeds
    reg.create_agent(CreateAgentInput {
        name: "b".to_string(),
        cluster_id: Some(c1.id),
        params: Some(params_input(200, 5)),
        ..Default::default()
    })
    .await
    .unwrap();

    // agent D in C2 (same zone) with virtual_router_id 5: conflict
    let err = reg
        .create_agent(CreateAgentInput {
            name: "d".to_string(),
            cluster_id: Some(c2.id),
            params: Some(params_input(100, 5)),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FleetError::Conflict(_)));
}

#[tokio::test]
async fn test_heartbeat_sync_and_gc_flow() {
    let reg = registry();
    let zone = ZoneId::generate();
    let cluster = reg
        .create_cluster(CreateClusterInput {
            name: "c1".to_string(),
            zone_id: zone,
        })
        .await
        .unwrap();

    let a = reg
        .create_agent(CreateAgentInput {
            name: "a".to_string(),
            cluster_id: Some(cluster.id),
            params: Some(params_input(100, 5)),
            ..Default::default()
        })
        .await
        .unwrap();
    let b = reg
        .create_agent(CreateAgentInput {
            name: "b".to_string(),
            cluster_id: Some(cluster.id),
            params: Some(params_input(200, 5)),
            ..Default::default()
        })
        .await
        .unwrap();

    // both agents come alive and report sync progress
    for agent in [&a, &b] {
        reg.record_heartbeat(
            agent.id,
            HeartbeatInput {
                ip: Some("10.0.0.1".to_string()),
                ha_state: Some("BACKUP".to_string()),
                version: Some("1.0.0".to_string()),
            },
        )
        .await
        .unwrap();
    }
    let now = Utc::now();
    reg.update_agent(
        a.id,
        AgentUpdateInput {
            loadbalancers: Some(now - Duration::seconds(300)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    reg.update_agent(
        b.id,
        AgentUpdateInput {
            loadbalancers: Some(now - Duration::seconds(900)),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    // seed soft-deleted loadbalancers on both sides of the slower watermark
    let (table, stores) = GcTable::with_memory_stores();
    let lb_store = stores[&ResourceKind::Loadbalancers].clone();
    let old_record = RecordId::generate();
    let fresh_record = RecordId::generate();
    lb_store.insert(old_record);
    lb_store.insert(fresh_record);
    lb_store.mark_pending_deleted(old_record, now - Duration::seconds(1200));
    lb_store.mark_pending_deleted(fresh_record, now - Duration::seconds(600));

    let sweeper = GcSweeper::new(reg.clone(), table);
    let report = sweeper.sweep(now).await;

    // only the record older than the slowest active agent's watermark goes;
    // every other kind is skipped because nobody reported it
    assert_eq!(report.total_purged(), 1);
    assert!(!lb_store.contains(old_record));
    assert!(lb_store.contains(fresh_record));
}

#[tokio::test]
async fn test_config_bundle_round_trip() {
    let reg = registry();
    let zone = ZoneId::generate();
    let cluster = reg
        .create_cluster(CreateClusterInput {
            name: "c1".to_string(),
            zone_id: zone,
        })
        .await
        .unwrap();
    let agent = reg
        .create_agent(CreateAgentInput {
            name: "a".to_string(),
            cluster_id: Some(cluster.id),
            params: Some(params_input(100, 5)),
            ..Default::default()
        })
        .await
        .unwrap();

    let params = agent.params.as_ref().unwrap();
    let bundle = AgentConfigBundle::build(agent.id, params).unwrap();

    assert!(bundle.keepalived_conf_tmpl.contains("vrrp_instance"));
    assert_eq!(bundle.vars.agent.id, agent.id.to_string());
    assert_eq!(bundle.vars.vrrp.priority, 100);
    assert_eq!(bundle.vars.vrrp.virtual_router_id, 5);
    assert_eq!(bundle.vars.telegraf.influx_db_output_url, "http://influxdb:8086");
}

#[tokio::test]
async fn test_patch_then_peer_consistency_end_to_end() {
    let reg = registry();
    let zone = ZoneId::generate();
    let cluster = reg
        .create_cluster(CreateClusterInput {
            name: "c1".to_string(),
            zone_id: zone,
        })
        .await
        .unwrap();
    let a = reg
        .create_agent(CreateAgentInput {
            name: "a".to_string(),
            cluster_id: Some(cluster.id),
            params: Some(params_input(100, 5)),
            ..Default::default()
        })
        .await
        .unwrap();
    let b = reg
        .create_agent(CreateAgentInput {
            name: "b".to_string(),
            cluster_id: Some(cluster.id),
            params: Some(params_input(200, 5)),
            ..Default::default()
        })
        .await
        .unwrap();

    // move the shared fields through one agent; the cluster converges
    reg.patch_params(
        a.id,
        AgentParamsInput {
            vrrp: Some(VrrpParamsInput {
                virtual_router_id: Some(9),
                preempt: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let got_a = reg.get_agent(a.id).await.unwrap();
    let got_b = reg.get_agent(b.id).await.unwrap();
    fleet_coordinator::cluster::validate_peer_consistency(&got_a, &got_b).unwrap();
    let pb = got_b.params.unwrap();
    assert_eq!(pb.vrrp.virtual_router_id, 9);
    assert!(pb.vrrp.preempt);
    assert_eq!(pb.vrrp.priority, 200);
}
