//! Core domain types used across fleet services

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Load-balancer agent identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Load-balancer cluster identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterId(pub Uuid);

impl ClusterId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Availability zone identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a soft-deletable resource record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub Uuid);

impl RecordId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dependent resource kinds an agent synchronizes from the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Loadbalancers,
    LoadbalancerListeners,
    LoadbalancerListenerRules,
    LoadbalancerBackendGroups,
    LoadbalancerBackends,
    LoadbalancerAcls,
    LoadbalancerCertificates,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 7] = [
        ResourceKind::Loadbalancers,
        ResourceKind::LoadbalancerListeners,
        ResourceKind::LoadbalancerListenerRules,
        ResourceKind::LoadbalancerBackendGroups,
        ResourceKind::LoadbalancerBackends,
        ResourceKind::LoadbalancerAcls,
        ResourceKind::LoadbalancerCertificates,
    ];

    /// Wire/report field name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loadbalancers => "loadbalancers",
            Self::LoadbalancerListeners => "loadbalancer_listeners",
            Self::LoadbalancerListenerRules => "loadbalancer_listener_rules",
            Self::LoadbalancerBackendGroups => "loadbalancer_backend_groups",
            Self::LoadbalancerBackends => "loadbalancer_backends",
            Self::LoadbalancerAcls => "loadbalancer_acls",
            Self::LoadbalancerCertificates => "loadbalancer_certificates",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HA role an agent reports for itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HaState {
    Master,
    Backup,
    Fault,
    Stop,
    Unknown,
}

impl Default for HaState {
    fn default() -> Self {
        Self::Unknown
    }
}

impl HaState {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MASTER" => Some(Self::Master),
            "BACKUP" => Some(Self::Backup),
            "FAULT" => Some(Self::Fault),
            "STOP" => Some(Self::Stop),
            "UNKNOWN" => Some(Self::Unknown),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "MASTER",
            Self::Backup => "BACKUP",
            Self::Fault => "FAULT",
            Self::Stop => "STOP",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for HaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_names() {
        assert_eq!(ResourceKind::Loadbalancers.as_str(), "loadbalancers");
        assert_eq!(
            ResourceKind::LoadbalancerListenerRules.as_str(),
            "loadbalancer_listener_rules"
        );
        assert_eq!(ResourceKind::ALL.len(), 7);
    }

    #[test]
    fn test_ha_state_parse() {
        assert_eq!(HaState::parse("MASTER"), Some(HaState::Master));
        assert_eq!(HaState::parse("master"), None);
        assert_eq!(HaState::parse("PRIMARY"), None);
        assert_eq!(HaState::default(), HaState::Unknown);
    }
}
