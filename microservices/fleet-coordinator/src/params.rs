//! Agent parameter model
//!
//! The typed configuration carried by each load-balancer agent: VRRP,
//! haproxy, and telegraf sub-blocks plus the three config template blobs.
//! Defaulting is presence-tracked through the `*Input` mirror types, so an
//! explicit zero survives a round-trip while an absent field picks up the
//! built-in default.

use lbfleet_core::{FleetError, Result};
use serde::{Deserialize, Serialize};

use crate::templates;

/// Built-in defaults that depend on coordinator configuration
#[derive(Debug, Clone)]
pub struct ParamDefaults {
    pub influx_db_output_url: String,
}

pub const VRRP_PASS_DEFAULT: &str = "FleetLB";
pub const VRRP_ADVERT_INT_DEFAULT: u32 = 1;
pub const VRRP_GARP_MASTER_REFRESH_DEFAULT: u32 = 27;
pub const HAPROXY_GLOBAL_LOG_DEFAULT: &str = "log /dev/log local0 info";
pub const TELEGRAF_OUTPUT_NAME_DEFAULT: &str = "telegraf";
pub const TELEGRAF_HAPROXY_INTERVAL_DEFAULT: u32 = 5;

/// VRRP sub-block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VrrpParams {
    pub priority: u32,
    pub virtual_router_id: u32,
    pub garp_master_refresh: u32,
    pub preempt: bool,
    pub interface: String,
    pub advert_int: u32,
    pub pass: String,
}

/// haproxy sub-block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaproxyParams {
    pub global_log: String,
    pub global_nbthread: u32,
    pub log_http: bool,
    pub log_tcp: bool,
    pub log_normal: bool,
    pub tune_http_maxhdr: u32,
}

/// telegraf sub-block
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegrafParams {
    pub influx_db_output_url: String,
    pub influx_db_output_name: String,
    pub influx_db_output_unsafe_ssl: bool,
    pub haproxy_input_interval: u32,
}

/// Full parameter set carried by an agent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentParams {
    pub keepalived_conf_tmpl: String,
    pub haproxy_conf_tmpl: String,
    pub telegraf_conf_tmpl: String,
    pub vrrp: VrrpParams,
    pub haproxy: HaproxyParams,
    pub telegraf: TelegrafParams,
}

/// Request mirror of [`VrrpParams`]; absence means "use default or keep current"
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VrrpParamsInput {
    pub priority: Option<u32>,
    pub virtual_router_id: Option<u32>,
    pub garp_master_refresh: Option<u32>,
    pub preempt: Option<bool>,
    pub interface: Option<String>,
    pub advert_int: Option<u32>,
    pub pass: Option<String>,
}

/// Request mirror of [`HaproxyParams`]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HaproxyParamsInput {
    pub global_log: Option<String>,
    pub global_nbthread: Option<u32>,
    pub log_http: Option<bool>,
    pub log_tcp: Option<bool>,
    pub log_normal: Option<bool>,
    pub tune_http_maxhdr: Option<u32>,
}

/// Request mirror of [`TelegrafParams`]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TelegrafParamsInput {
    pub influx_db_output_url: Option<String>,
    pub influx_db_output_name: Option<String>,
    pub influx_db_output_unsafe_ssl: Option<bool>,
    pub haproxy_input_interval: Option<u32>,
}

/// Request mirror of [`AgentParams`]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AgentParamsInput {
    pub keepalived_conf_tmpl: Option<String>,
    pub haproxy_conf_tmpl: Option<String>,
    pub telegraf_conf_tmpl: Option<String>,
    pub vrrp: Option<VrrpParamsInput>,
    pub haproxy: Option<HaproxyParamsInput>,
    pub telegraf: Option<TelegrafParamsInput>,
}

impl VrrpParams {
    fn overlay(&mut self, input: &VrrpParamsInput) {
        if let Some(v) = input.priority {
            self.priority = v;
        }
        if let Some(v) = input.virtual_router_id {
            self.virtual_router_id = v;
        }
        if let Some(v) = input.garp_master_refresh {
            self.garp_master_refresh = v;
        }
        if let Some(v) = input.preempt {
            self.preempt = v;
        }
        if let Some(ref v) = input.interface {
            self.interface = v.clone();
        }
        if let Some(v) = input.advert_int {
            self.advert_int = v;
        }
        if let Some(ref v) = input.pass {
            self.pass = v.clone();
        }
    }

    fn init_default(&mut self, input: &VrrpParamsInput) {
        if input.advert_int.is_none() {
            self.advert_int = VRRP_ADVERT_INT_DEFAULT;
        }
        if input.garp_master_refresh.is_none() {
            self.garp_master_refresh = VRRP_GARP_MASTER_REFRESH_DEFAULT;
        }
        if input.pass.is_none() {
            self.pass = VRRP_PASS_DEFAULT.to_string();
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interface.is_empty() || self.interface.len() > 16 {
            return Err(FleetError::invalid_parameter(
                "vrrp.interface",
                format!("invalid interface {:?}, want 1-16 chars", self.interface),
            ));
        }
        if self.pass.is_empty() || self.pass.len() > 8 {
            return Err(FleetError::invalid_parameter(
                "vrrp.pass",
                format!("invalid authentication pass size {}, want [1,8]", self.pass.len()),
            ));
        }
        if self.priority < 1 || self.priority > 255 {
            return Err(FleetError::invalid_parameter(
                "vrrp.priority",
                format!("invalid priority {}, want [1,255]", self.priority),
            ));
        }
        if self.virtual_router_id < 1 || self.virtual_router_id > 255 {
            return Err(FleetError::invalid_parameter(
                "vrrp.virtual_router_id",
                format!("invalid virtual_router_id {}, want [1,255]", self.virtual_router_id),
            ));
        }
        Ok(())
    }

    /// Describe the first peer-consistency violation between two same-cluster
    /// agents, if any. Priority must differ; the four shared fields must match.
    pub fn peer_mismatch(&self, peer: &VrrpParams) -> Option<String> {
        if self.priority == peer.priority {
            return Some(format!(
                "vrrp priority of peer agents must be different, got {}",
                self.priority
            ));
        }
        if self.virtual_router_id != peer.virtual_router_id {
            return Some(format!(
                "vrrp virtual_router_id of peer agents must be the same: {} != {}",
                self.virtual_router_id, peer.virtual_router_id
            ));
        }
        if self.advert_int != peer.advert_int {
            return Some(format!(
                "vrrp advert_int of peer agents must be the same: {} != {}",
                self.advert_int, peer.advert_int
            ));
        }
        if self.preempt != peer.preempt {
            return Some(format!(
                "vrrp preempt property of peer agents must be the same: {} != {}",
                self.preempt, peer.preempt
            ));
        }
        if self.pass != peer.pass {
            return Some(format!(
                "vrrp password of peer agents must be the same: {:?} != {:?}",
                self.pass, peer.pass
            ));
        }
        None
    }

    /// Whether a change from `self` to `new` must be fanned out to peers.
    /// Priority is deliberately excluded.
    pub fn needs_update_peer(&self, new: &VrrpParams) -> bool {
        self.virtual_router_id != new.virtual_router_id
            || self.advert_int != new.advert_int
            || self.preempt != new.preempt
            || self.pass != new.pass
    }

    /// Overwrite the peer-shared fields from `new`, leaving priority untouched
    pub fn update_by(&mut self, new: &VrrpParams) {
        self.virtual_router_id = new.virtual_router_id;
        self.advert_int = new.advert_int;
        self.preempt = new.preempt;
        self.pass = new.pass.clone();
    }
}

impl HaproxyParams {
    fn overlay(&mut self, input: &HaproxyParamsInput) {
        if let Some(ref v) = input.global_log {
            self.global_log = v.clone();
        }
        if let Some(v) = input.global_nbthread {
            self.global_nbthread = v;
        }
        if let Some(v) = input.log_http {
            self.log_http = v;
        }
        if let Some(v) = input.log_tcp {
            self.log_tcp = v;
        }
        if let Some(v) = input.log_normal {
            self.log_normal = v;
        }
        if let Some(v) = input.tune_http_maxhdr {
            self.tune_http_maxhdr = v;
        }
    }

    fn init_default(&mut self, input: &HaproxyParamsInput) {
        if input.global_nbthread.is_none() {
            self.global_nbthread = 1;
        }
        if input.global_log.is_none() {
            self.global_log = HAPROXY_GLOBAL_LOG_DEFAULT.to_string();
        }
        if input.log_http.is_none() {
            self.log_http = true;
        }
        if input.log_normal.is_none() {
            self.log_normal = true;
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.global_nbthread < 1 {
            self.global_nbthread = 1;
        }
        if self.global_nbthread > 64 {
            // Limit imposed by haproxy and arch word size
            self.global_nbthread = 64;
        }
        if self.tune_http_maxhdr > 32767 {
            self.tune_http_maxhdr = 32767;
        }
        Ok(())
    }
}

impl TelegrafParams {
    fn overlay(&mut self, input: &TelegrafParamsInput) {
        if let Some(ref v) = input.influx_db_output_url {
            self.influx_db_output_url = v.clone();
        }
        if let Some(ref v) = input.influx_db_output_name {
            self.influx_db_output_name = v.clone();
        }
        if let Some(v) = input.influx_db_output_unsafe_ssl {
            self.influx_db_output_unsafe_ssl = v;
        }
        if let Some(v) = input.haproxy_input_interval {
            self.haproxy_input_interval = v;
        }
    }

    fn init_default(&mut self, defaults: &ParamDefaults) {
        if self.influx_db_output_url.is_empty() {
            self.influx_db_output_url = defaults.influx_db_output_url.clone();
        }
        if self.haproxy_input_interval == 0 {
            self.haproxy_input_interval = TELEGRAF_HAPROXY_INTERVAL_DEFAULT;
        }
        if self.influx_db_output_name.is_empty() {
            self.influx_db_output_name = TELEGRAF_OUTPUT_NAME_DEFAULT.to_string();
        }
    }

    fn validate(&mut self) -> Result<()> {
        if !self.influx_db_output_url.is_empty() {
            url::Url::parse(&self.influx_db_output_url).map_err(|e| {
                FleetError::invalid_parameter(
                    "telegraf.influx_db_output_url",
                    format!("invalid influxdb url: {}", e),
                )
            })?;
        }
        if self.haproxy_input_interval == 0 {
            self.haproxy_input_interval = TELEGRAF_HAPROXY_INTERVAL_DEFAULT;
        }
        if self.influx_db_output_name.is_empty() {
            self.influx_db_output_name = TELEGRAF_OUTPUT_NAME_DEFAULT.to_string();
        }
        Ok(())
    }
}

impl AgentParams {
    /// Build a parameter set from a create request: overlay the supplied
    /// fields on the zero set, fill built-in defaults for the rest, validate.
    pub fn from_input(input: &AgentParamsInput, defaults: &ParamDefaults) -> Result<Self> {
        Self::overlay_on(Self::default(), input, defaults)
    }

    /// Build a patch candidate: read current value, overlay the supplied
    /// fields, validate. Defaulting only runs when the current set was
    /// empty (a patch on a never-configured agent behaves like a create);
    /// a populated set already went through defaulting once and a patch
    /// must not reset fields the caller left out. Nothing is persisted
    /// here; the caller commits the candidate.
    pub fn overlay_on(
        current: AgentParams,
        input: &AgentParamsInput,
        defaults: &ParamDefaults,
    ) -> Result<Self> {
        let was_zero = current.is_zero();
        let mut p = current;
        if let Some(ref v) = input.keepalived_conf_tmpl {
            p.keepalived_conf_tmpl = v.clone();
        }
        if let Some(ref v) = input.haproxy_conf_tmpl {
            p.haproxy_conf_tmpl = v.clone();
        }
        if let Some(ref v) = input.telegraf_conf_tmpl {
            p.telegraf_conf_tmpl = v.clone();
        }
        let vrrp_input = input.vrrp.clone().unwrap_or_default();
        let haproxy_input = input.haproxy.clone().unwrap_or_default();
        let telegraf_input = input.telegraf.clone().unwrap_or_default();
        p.vrrp.overlay(&vrrp_input);
        p.haproxy.overlay(&haproxy_input);
        p.telegraf.overlay(&telegraf_input);
        if was_zero {
            p.init_default(&vrrp_input, &haproxy_input, defaults);
        }
        p.validate()?;
        Ok(p)
    }

    fn init_default(
        &mut self,
        vrrp_input: &VrrpParamsInput,
        haproxy_input: &HaproxyParamsInput,
        defaults: &ParamDefaults,
    ) {
        if self.keepalived_conf_tmpl.is_empty() {
            self.keepalived_conf_tmpl = templates::default_keepalived_tmpl_encoded();
        }
        if self.haproxy_conf_tmpl.is_empty() {
            self.haproxy_conf_tmpl = templates::default_haproxy_tmpl_encoded();
        }
        if self.telegraf_conf_tmpl.is_empty() {
            self.telegraf_conf_tmpl = templates::default_telegraf_tmpl_encoded();
        }
        self.vrrp.init_default(vrrp_input);
        self.haproxy.init_default(haproxy_input);
        self.telegraf.init_default(defaults);
    }

    /// Validate the full set, failing fast on the first violated rule.
    /// Clamping rules mutate in place rather than erroring.
    pub fn validate(&mut self) -> Result<()> {
        templates::validate_template("keepalived_conf_tmpl", &self.keepalived_conf_tmpl)?;
        templates::validate_template("haproxy_conf_tmpl", &self.haproxy_conf_tmpl)?;
        templates::validate_template("telegraf_conf_tmpl", &self.telegraf_conf_tmpl)?;
        self.vrrp.validate()?;
        self.haproxy.validate()?;
        self.telegraf.validate()?;
        Ok(())
    }

    /// A set is "empty/unset" only when every field holds its zero value
    pub fn is_zero(&self) -> bool {
        *self == AgentParams::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> ParamDefaults {
        ParamDefaults {
            influx_db_output_url: "https://influxdb.internal:8086".to_string(),
        }
    }

    fn vrrp_input(priority: u32, vrid: u32) -> AgentParamsInput {
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

    #[test]
    fn test_defaults_fill_absent_fields() {
        let p = AgentParams::from_input(&vrrp_input(100, 5), &defaults()).unwrap();
        assert_eq!(p.vrrp.advert_int, 1);
        assert_eq!(p.vrrp.garp_master_refresh, 27);
        assert_eq!(p.vrrp.pass, "FleetLB");
        assert_eq!(p.haproxy.global_nbthread, 1);
        assert!(p.haproxy.log_http);
        assert!(p.haproxy.log_normal);
        assert_eq!(p.telegraf.haproxy_input_interval, 5);
        assert_eq!(p.telegraf.influx_db_output_name, "telegraf");
        assert_eq!(p.telegraf.influx_db_output_url, "https://influxdb.internal:8086");
        assert!(!p.keepalived_conf_tmpl.is_empty());
    }

    #[test]
    fn test_defaulting_is_idempotent() {
        let input = vrrp_input(100, 5);
        let first = AgentParams::from_input(&input, &defaults()).unwrap();
        let again =
            AgentParams::overlay_on(first.clone(), &AgentParamsInput::default(), &defaults())
                .unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn test_explicit_zero_is_not_replaced_by_default() {
        // log_normal explicitly false must survive defaulting
        let mut input = vrrp_input(100, 5);
        input.haproxy = Some(HaproxyParamsInput {
            log_normal: Some(false),
            ..Default::default()
        });
        let p = AgentParams::from_input(&input, &defaults()).unwrap();
        assert!(!p.haproxy.log_normal);
    }

    #[test]
    fn test_priority_out_of_range_rejected() {
        for bad in [0, 256, 1000] {
            let err = AgentParams::from_input(&vrrp_input(bad, 5), &defaults()).unwrap_err();
            assert!(err.to_string().contains("vrrp.priority"), "{}", err);
        }
    }

    #[test]
    fn test_virtual_router_id_out_of_range_rejected() {
        let err = AgentParams::from_input(&vrrp_input(100, 0), &defaults()).unwrap_err();
        assert!(err.to_string().contains("virtual_router_id"));
    }

    #[test]
    fn test_interface_length_rules() {
        let mut input = vrrp_input(100, 5);
        input.vrrp.as_mut().unwrap().interface = Some("a".repeat(17));
        assert!(AgentParams::from_input(&input, &defaults()).is_err());

        input.vrrp.as_mut().unwrap().interface = Some(String::new());
        assert!(AgentParams::from_input(&input, &defaults()).is_err());
    }

    #[test]
    fn test_pass_length_rules() {
        let mut input = vrrp_input(100, 5);
        input.vrrp.as_mut().unwrap().pass = Some("toolongpass".to_string());
        let err = AgentParams::from_input(&input, &defaults()).unwrap_err();
        assert!(err.to_string().contains("vrrp.pass"));
    }

    #[test]
    fn test_haproxy_clamping() {
        let mut input = vrrp_input(100, 5);
        input.haproxy = Some(HaproxyParamsInput {
            global_nbthread: Some(500),
            tune_http_maxhdr: Some(100_000),
            ..Default::default()
        });
        let p = AgentParams::from_input(&input, &defaults()).unwrap();
        assert_eq!(p.haproxy.global_nbthread, 64);
        assert_eq!(p.haproxy.tune_http_maxhdr, 32767);
    }

    #[test]
    fn test_bad_influx_url_rejected() {
        let mut input = vrrp_input(100, 5);
        input.telegraf = Some(TelegrafParamsInput {
            influx_db_output_url: Some("not a url".to_string()),
            ..Default::default()
        });
        let err = AgentParams::from_input(&input, &defaults()).unwrap_err();
        assert!(err.to_string().contains("influx_db_output_url"));
    }

    #[test]
    fn test_patch_overlay_keeps_unmentioned_fields() {
        let base = AgentParams::from_input(&vrrp_input(100, 5), &defaults()).unwrap();
        let patch = AgentParamsInput {
            vrrp: Some(VrrpParamsInput {
                advert_int: Some(3),
                ..Default::default()
            }),
            ..Default::default()
        };
        let p = AgentParams::overlay_on(base.clone(), &patch, &defaults()).unwrap();
        assert_eq!(p.vrrp.advert_int, 3);
        assert_eq!(p.vrrp.priority, base.vrrp.priority);
        assert_eq!(p.vrrp.pass, base.vrrp.pass);
        assert_eq!(p.keepalived_conf_tmpl, base.keepalived_conf_tmpl);
    }

    #[test]
    fn test_peer_mismatch_rules() {
        let base = AgentParams::from_input(&vrrp_input(100, 5), &defaults())
            .unwrap()
            .vrrp;
        let mut peer = base.clone();

        // identical priority conflicts
        assert!(base.peer_mismatch(&peer).is_some());

        peer.priority = 200;
        assert!(base.peer_mismatch(&peer).is_none());

        peer.virtual_router_id = 6;
        let msg = base.peer_mismatch(&peer).unwrap();
        assert!(msg.contains("virtual_router_id"));
    }

    #[test]
    fn test_needs_update_peer_excludes_priority() {
        let base = AgentParams::from_input(&vrrp_input(100, 5), &defaults())
            .unwrap()
            .vrrp;
        let mut new = base.clone();
        new.priority = 200;
        assert!(!base.needs_update_peer(&new));

        new.advert_int = 9;
        assert!(base.needs_update_peer(&new));

        let mut peer = base.clone();
        peer.priority = 42;
        peer.update_by(&new);
        assert_eq!(peer.priority, 42);
        assert_eq!(peer.advert_int, 9);
    }

    #[test]
    fn test_is_zero() {
        assert!(AgentParams::default().is_zero());
        let p = AgentParams::from_input(&vrrp_input(100, 5), &defaults()).unwrap();
        assert!(!p.is_zero());
    }
}
