//! Config template storage and validation
//!
//! Each agent materializes its local keepalived/haproxy/telegraf config from
//! a stored template blob. The control plane never renders; it only
//! guarantees that a stored blob base64-decodes and parses in the handlebars
//! grammar. Rendering happens agent-side against the variable namespace
//! published here - the key names in [`TemplateVars`] are a contract.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use handlebars::template::Template;
use lbfleet_core::{AgentId, FleetError, Result};
use serde::{Deserialize, Serialize};

use crate::params::AgentParams;

/// Stats socket line rendered into the haproxy global section
pub const HAPROXY_GLOBAL_STATS_SOCKET: &str =
    "stats socket /var/run/haproxy.sock mode 600 level admin";
/// Socket the telegraf haproxy input scrapes
pub const TELEGRAF_HAPROXY_STATS_SOCKET: &str = "/var/run/haproxy.sock";

const KEEPALIVED_CONF_TMPL_DEFAULT: &str = r#"
global_defs {
	router_id {{agent.id}}
	#vrrp_strict
	vrrp_skip_check_adv_addr
	enable_script_security
}

vrrp_instance FleetLB {
	interface {{vrrp.interface}}
	virtual_router_id {{vrrp.virtual_router_id}}
	authentication {
		auth_type PASS
		auth_pass {{vrrp.pass}}
	}
	{{#if vrrp.notify_script}}notify {{vrrp.notify_script}} root{{/if}}
	{{#if vrrp.unicast_peer}}unicast_peer {
{{#each vrrp.unicast_peer}}		{{this}}
{{/each}}	}
	{{/if}}
	priority {{vrrp.priority}}
	advert_int {{vrrp.advert_int}}
	garp_master_refresh {{vrrp.garp_master_refresh}}
	{{#if vrrp.preempt}}preempt{{else}}nopreempt{{/if}}
	virtual_ipaddress {
{{#each vrrp.addresses}}		{{this}}
{{/each}}	}
}
"#;

const HAPROXY_CONF_TMPL_DEFAULT: &str = r#"
global
	maxconn 20480
	tune.ssl.default-dh-param 2048
	{{#if haproxy.tune_http_maxhdr}}tune.http.maxhdr {{haproxy.tune_http_maxhdr}}{{/if}}
	{{#if haproxy.global_stats_socket}}{{haproxy.global_stats_socket}}{{/if}}
	{{#if haproxy.global_nbthread}}nbthread {{haproxy.global_nbthread}}{{/if}}
	{{#if haproxy.global_log}}{{haproxy.global_log}}{{/if}}

defaults
	timeout connect 10s
	timeout client 60s
	timeout server 60s
	timeout tunnel 1h
	{{#if haproxy.global_log}}log global{{/if}}
	{{#unless haproxy.log_normal}}option dontlog-normal{{/unless}}

listen stats
	mode http
	bind :778
	stats enable
	stats hide-version
	stats realm "Haproxy Statistics"
	stats auth Fleet:LBStats
	stats uri /
"#;

const TELEGRAF_CONF_TMPL_DEFAULT: &str = r#"
[[outputs.influxdb]]
	urls = ["{{telegraf.influx_db_output_url}}"]
	database = "{{telegraf.influx_db_output_name}}"
	insecure_skip_verify = {{telegraf.influx_db_output_unsafe_ssl}}

[[inputs.haproxy]]
	interval = "{{telegraf.haproxy_input_interval}}s"
	servers = ["{{telegraf.haproxy_input_stats_socket}}"]
	keep_field_names = true
"#;

pub fn default_keepalived_tmpl_encoded() -> String {
    STANDARD.encode(KEEPALIVED_CONF_TMPL_DEFAULT)
}

pub fn default_haproxy_tmpl_encoded() -> String {
    STANDARD.encode(HAPROXY_CONF_TMPL_DEFAULT)
}

pub fn default_telegraf_tmpl_encoded() -> String {
    STANDARD.encode(TELEGRAF_CONF_TMPL_DEFAULT)
}

/// Decode a stored template blob to its text form
pub fn decode_template(key: &str, blob: &str) -> Result<String> {
    let raw = STANDARD
        .decode(blob)
        .map_err(|e| FleetError::invalid_parameter(key, format!("bad base64 encoded string: {}", e)))?;
    String::from_utf8(raw)
        .map_err(|e| FleetError::invalid_parameter(key, format!("template is not valid utf-8: {}", e)))
}

/// Check that a stored blob decodes and parses in the template grammar.
/// A blob that fails either step is rejected and never stored.
pub fn validate_template(key: &str, blob: &str) -> Result<()> {
    let text = decode_template(key, blob)?;
    Template::compile(&text)
        .map_err(|e| FleetError::invalid_parameter(key, format!("bad template: {}", e)))?;
    Ok(())
}

/// `agent.*` namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentVars {
    pub id: String,
}

/// `vrrp.*` namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VrrpVars {
    pub interface: String,
    pub virtual_router_id: u32,
    pub pass: String,
    pub priority: u32,
    pub advert_int: u32,
    pub garp_master_refresh: u32,
    pub preempt: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notify_script: Option<String>,
    pub unicast_peer: Vec<String>,
    pub addresses: Vec<String>,
}

/// `haproxy.*` namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HaproxyVars {
    pub tune_http_maxhdr: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_stats_socket: Option<String>,
    pub global_nbthread: u32,
    pub global_log: String,
    pub log_normal: bool,
}

/// `telegraf.*` namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegrafVars {
    pub influx_db_output_url: String,
    pub influx_db_output_name: String,
    pub influx_db_output_unsafe_ssl: bool,
    pub haproxy_input_interval: u32,
    pub haproxy_input_stats_socket: String,
}

/// The variable namespace an agent renders its templates against.
/// Key names are a published contract; renaming any of them breaks
/// every template already stored in the field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateVars {
    pub agent: AgentVars,
    pub vrrp: VrrpVars,
    pub haproxy: HaproxyVars,
    pub telegraf: TelegrafVars,
}

impl TemplateVars {
    /// Build the namespace for one agent. Peer addresses and VIP lists are
    /// topology-dependent and filled agent-side; they are emitted empty here.
    pub fn for_agent(agent_id: AgentId, params: &AgentParams) -> Self {
        Self {
            agent: AgentVars {
                id: agent_id.to_string(),
            },
            vrrp: VrrpVars {
                interface: params.vrrp.interface.clone(),
                virtual_router_id: params.vrrp.virtual_router_id,
                pass: params.vrrp.pass.clone(),
                priority: params.vrrp.priority,
                advert_int: params.vrrp.advert_int,
                garp_master_refresh: params.vrrp.garp_master_refresh,
                preempt: params.vrrp.preempt,
                notify_script: None,
                unicast_peer: Vec::new(),
                addresses: Vec::new(),
            },
            haproxy: HaproxyVars {
                tune_http_maxhdr: params.haproxy.tune_http_maxhdr,
                global_stats_socket: Some(HAPROXY_GLOBAL_STATS_SOCKET.to_string()),
                global_nbthread: params.haproxy.global_nbthread,
                global_log: params.haproxy.global_log.clone(),
                log_normal: params.haproxy.log_normal,
            },
            telegraf: TelegrafVars {
                influx_db_output_url: params.telegraf.influx_db_output_url.clone(),
                influx_db_output_name: params.telegraf.influx_db_output_name.clone(),
                influx_db_output_unsafe_ssl: params.telegraf.influx_db_output_unsafe_ssl,
                haproxy_input_interval: params.telegraf.haproxy_input_interval,
                haproxy_input_stats_socket: TELEGRAF_HAPROXY_STATS_SOCKET.to_string(),
            },
        }
    }
}

/// The artifact an agent consumes: decoded templates plus the namespace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfigBundle {
    pub keepalived_conf_tmpl: String,
    pub haproxy_conf_tmpl: String,
    pub telegraf_conf_tmpl: String,
    pub vars: TemplateVars,
}

impl AgentConfigBundle {
    pub fn build(agent_id: AgentId, params: &AgentParams) -> Result<Self> {
        Ok(Self {
            keepalived_conf_tmpl: decode_template("keepalived_conf_tmpl", &params.keepalived_conf_tmpl)?,
            haproxy_conf_tmpl: decode_template("haproxy_conf_tmpl", &params.haproxy_conf_tmpl)?,
            telegraf_conf_tmpl: decode_template("telegraf_conf_tmpl", &params.telegraf_conf_tmpl)?,
            vars: TemplateVars::for_agent(agent_id, params),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{AgentParamsInput, ParamDefaults, VrrpParamsInput};

    fn sample_params() -> AgentParams {
        let input = AgentParamsInput {
            vrrp: Some(VrrpParamsInput {
                priority: Some(100),
                virtual_router_id: Some(5),
                interface: Some("eth0".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let defaults = ParamDefaults {
            influx_db_output_url: "http://influxdb:8086".to_string(),
        };
        AgentParams::from_input(&input, &defaults).unwrap()
    }

    #[test]
    fn test_default_templates_are_valid() {
        validate_template("keepalived_conf_tmpl", &default_keepalived_tmpl_encoded()).unwrap();
        validate_template("haproxy_conf_tmpl", &default_haproxy_tmpl_encoded()).unwrap();
        validate_template("telegraf_conf_tmpl", &default_telegraf_tmpl_encoded()).unwrap();
    }

    #[test]
    fn test_bad_base64_rejected() {
        let err = validate_template("keepalived_conf_tmpl", "!!not-base64!!").unwrap_err();
        assert!(err.to_string().contains("keepalived_conf_tmpl"));
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn test_bad_template_syntax_rejected() {
        let blob = STANDARD.encode("{{#if unclosed}}oops");
        let err = validate_template("haproxy_conf_tmpl", &blob).unwrap_err();
        assert!(err.to_string().contains("haproxy_conf_tmpl"));
        assert!(err.to_string().contains("bad template"));
    }

    #[test]
    fn test_namespace_key_names_are_stable() {
        let vars = TemplateVars::for_agent(lbfleet_core::AgentId::generate(), &sample_params());
        let json = serde_json::to_value(&vars).unwrap();

        assert!(json["agent"]["id"].is_string());
        for key in [
            "interface",
            "virtual_router_id",
            "pass",
            "priority",
            "advert_int",
            "garp_master_refresh",
            "preempt",
            "unicast_peer",
            "addresses",
        ] {
            assert!(!json["vrrp"][key].is_null(), "missing vrrp.{}", key);
        }
        for key in ["tune_http_maxhdr", "global_nbthread", "global_log", "log_normal"] {
            assert!(!json["haproxy"][key].is_null(), "missing haproxy.{}", key);
        }
        for key in [
            "influx_db_output_url",
            "influx_db_output_name",
            "influx_db_output_unsafe_ssl",
            "haproxy_input_interval",
            "haproxy_input_stats_socket",
        ] {
            assert!(!json["telegraf"][key].is_null(), "missing telegraf.{}", key);
        }
    }

    #[test]
    fn test_config_bundle_decodes_templates() {
        let params = sample_params();
        let bundle = AgentConfigBundle::build(lbfleet_core::AgentId::generate(), &params).unwrap();
        assert!(bundle.keepalived_conf_tmpl.contains("vrrp_instance"));
        assert!(bundle.haproxy_conf_tmpl.contains("maxconn"));
        assert!(bundle.telegraf_conf_tmpl.contains("outputs.influxdb"));
    }
}
