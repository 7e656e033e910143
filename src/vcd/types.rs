//! Typed remote entities
//!
//! Payloads exchanged with the backend. Field names follow the platform's
//! JSON representation (camelCase); every entity carries a stable `id`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reference to another entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

// =========================================================================
// Organizations and VDCs
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppLease {
    pub max_runtime_lease_in_sec: i64,
    pub power_off_on_runtime_lease_expiration: bool,
    pub maximum_storage_lease_in_sec: i64,
    pub delete_on_storage_lease_expiration: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VAppTemplateLease {
    pub maximum_storage_lease_in_sec: i64,
    pub delete_on_storage_lease_expiration: bool,
}

/// Organization as seen by a system administrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AdminOrg {
    pub id: String,
    pub name: String,
    pub full_name: String,
    pub description: String,
    pub href: String,
    pub is_enabled: bool,
    pub deployed_vm_quota: i64,
    pub stored_vm_quota: i64,
    pub can_publish_catalogs: bool,
    pub delay_after_power_on_seconds: i64,
    pub vapp_lease: Option<VAppLease>,
    pub vapp_template_lease: Option<VAppTemplateLease>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CapacityValue {
    pub allocated: i64,
    pub limit: i64,
    pub reserved: i64,
    pub used: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputeCapacity {
    pub cpu: CapacityValue,
    pub memory: CapacityValue,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VdcStorageProfile {
    pub name: String,
    pub limit: i64,
    pub default: bool,
    pub enabled: bool,
}

/// Virtual data center
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Vdc {
    pub id: String,
    pub name: String,
    pub href: String,
    pub org_id: String,
    pub description: String,
    pub allocation_model: String,
    pub provider_vdc_name: String,
    pub network_pool_name: String,
    pub network_quota: i64,
    pub vm_quota: i64,
    pub is_enabled: bool,
    pub cpu_guaranteed: Option<f64>,
    pub memory_guaranteed: Option<f64>,
    pub compute_capacity: ComputeCapacity,
    pub storage_profiles: Vec<VdcStorageProfile>,
}

// =========================================================================
// Edge gateways
// =========================================================================

/// Kind of a vNIC attachment on an edge gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VnicKind {
    #[default]
    Uplink,
    Internal,
    Trunk,
    Subinterface,
}

impl VnicKind {
    pub fn as_str(self) -> &'static str {
        match self {
            VnicKind::Uplink => "uplink",
            VnicKind::Internal => "internal",
            VnicKind::Trunk => "trunk",
            VnicKind::Subinterface => "subinterface",
        }
    }
}

impl fmt::Display for VnicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeVnic {
    pub index: u32,
    pub network_name: String,
    pub kind: VnicKind,
}

/// Load balancer and firewall global settings of an edge gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeSettings {
    pub lb_enabled: bool,
    pub lb_acceleration_enabled: bool,
    pub lb_logging_enabled: bool,
    pub lb_loglevel: String,
    pub fw_enabled: bool,
    pub fw_default_rule_logging_enabled: bool,
    pub fw_default_rule_action: String,
}

impl Default for EdgeSettings {
    fn default() -> Self {
        Self {
            lb_enabled: false,
            lb_acceleration_enabled: false,
            lb_logging_enabled: false,
            lb_loglevel: "info".to_string(),
            fw_enabled: true,
            fw_default_rule_logging_enabled: false,
            fw_default_rule_action: "deny".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EdgeGateway {
    pub id: String,
    pub name: String,
    pub href: String,
    pub vdc_id: String,
    pub distributed_routing: bool,
    pub vnics: Vec<EdgeVnic>,
    pub settings: EdgeSettings,
}

// =========================================================================
// Networks
// =========================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    #[default]
    Routed,
    Isolated,
    Direct,
}

impl NetworkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NetworkKind::Routed => "routed",
            NetworkKind::Isolated => "isolated",
            NetworkKind::Direct => "direct",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a routed network attaches to its edge gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutedInterface {
    #[default]
    Internal,
    Subinterface,
    Distributed,
}

impl RoutedInterface {
    pub fn as_str(self) -> &'static str {
        match self {
            RoutedInterface::Internal => "internal",
            RoutedInterface::Subinterface => "subinterface",
            RoutedInterface::Distributed => "distributed",
        }
    }

    /// Case-insensitive parse; empty means the implicit internal interface.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "internal" => Some(RoutedInterface::Internal),
            "subinterface" => Some(RoutedInterface::Subinterface),
            "distributed" => Some(RoutedInterface::Distributed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpRange {
    pub start_address: String,
    pub end_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DhcpPool {
    pub start_address: String,
    pub end_address: String,
    pub default_lease_time: i64,
    pub max_lease_time: i64,
}

/// Org VDC network (routed, isolated or direct)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrgNetwork {
    pub id: String,
    pub name: String,
    pub href: String,
    pub description: String,
    pub kind: NetworkKind,
    pub vdc_id: String,
    pub gateway: String,
    pub netmask: String,
    pub dns1: String,
    pub dns2: String,
    pub dns_suffix: String,
    pub shared: bool,
    pub edge_gateway_id: Option<String>,
    pub interface: Option<RoutedInterface>,
    pub external_network: Option<String>,
    pub static_ip_pools: Vec<IpRange>,
    pub dhcp_pools: Vec<DhcpPool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExternalNetwork {
    pub id: String,
    pub name: String,
    pub href: String,
    pub description: String,
    pub gateway: String,
    pub netmask: String,
    pub dns1: String,
    pub dns2: String,
    pub dns_suffix: String,
}

// =========================================================================
// Edge services
// =========================================================================

/// NAT rule. The same endpoint stores both kinds; `action` tells them apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatRule {
    pub id: String,
    pub action: String,
    pub rule_tag: Option<i64>,
    pub enabled: bool,
    pub logging_enabled: bool,
    pub description: String,
    pub vnic: Option<u32>,
    pub original_address: String,
    pub original_port: String,
    pub translated_address: String,
    pub translated_port: String,
    pub protocol: String,
    pub icmp_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LbPersistence {
    pub method: String,
    pub cookie_name: String,
    pub cookie_mode: String,
    pub expire: i64,
}

/// Load balancer application profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LbAppProfile {
    pub id: String,
    pub name: String,
    pub template: String,
    pub ssl_passthrough: bool,
    pub http_redirect_url: String,
    pub persistence: Option<LbPersistence>,
    pub insert_x_forwarded_for: bool,
    pub server_ssl_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IpSet {
    pub id: String,
    pub name: String,
    pub description: String,
    pub inheritance_allowed: bool,
    pub ip_addresses: Vec<String>,
}

// =========================================================================
// vApps and metadata
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VApp {
    pub id: String,
    pub name: String,
    pub href: String,
    pub description: String,
    pub status: i64,
    pub guest_properties: BTreeMap<String, String>,
}

/// Human readable vApp status
pub fn vapp_status_text(status: i64) -> &'static str {
    match status {
        -1 => "FAILED_CREATION",
        0 => "UNRESOLVED",
        1 => "RESOLVED",
        3 => "SUSPENDED",
        4 => "POWERED_ON",
        5 => "WAITING_FOR_INPUT",
        6 => "UNKNOWN",
        7 => "UNRECOGNIZED",
        8 => "POWERED_OFF",
        9 => "INCONSISTENT_STATE",
        10 => "MIXED",
        _ => "UNKNOWN",
    }
}

pub const VAPP_STATUS_POWERED_ON: i64 = 4;
pub const VAPP_STATUS_POWERED_OFF: i64 = 8;

/// Kinds of entity that can carry metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Org,
    Vdc,
    Network,
    VApp,
}

/// Entity whose metadata is read or written
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTarget {
    pub kind: EntityKind,
    pub id: String,
}

impl MetadataTarget {
    pub fn new(kind: EntityKind, id: impl Into<String>) -> Self {
        Self { kind, id: id.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetadataEntry {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub value_type: String,
    pub user_access: String,
    pub is_system: bool,
}

// =========================================================================
// NSX-T Advanced Load Balancer
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbController {
    pub id: String,
    pub name: String,
    pub description: String,
    pub url: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub license_type: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbCloud {
    pub id: String,
    pub name: String,
    pub description: String,
    pub controller_id: String,
    pub importable_cloud_id: String,
    pub network_pool_id: String,
    pub network_pool_name: String,
    pub health_status: String,
    pub health_message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbServiceEngineGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub alb_cloud_id: String,
    pub reservation_model: String,
    pub importable_service_engine_group_name: String,
    pub max_virtual_services: Option<i64>,
    pub reserved_virtual_services: Option<i64>,
    pub deployed_virtual_services: i64,
    pub ha_mode: String,
    pub overallocated: bool,
}

/// ALB configuration of one NSX-T edge gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbSettings {
    pub is_active: bool,
    pub service_network_specification: String,
    pub supported_feature_set: String,
}

/// Binding of a service engine group to an edge gateway
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlbSegAssignment {
    pub id: String,
    pub edge_gateway_id: String,
    pub service_engine_group_id: String,
    pub service_engine_group_name: String,
    pub max_virtual_services: Option<i64>,
    pub reserved_virtual_services: Option<i64>,
    pub deployed_virtual_services: i64,
}

// =========================================================================
// Tasks
// =========================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskError {
    pub message: String,
}

/// Asynchronous backend task
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: String,
    pub href: String,
    pub status: String,
    pub operation: String,
    pub error: Option<TaskError>,
    pub owner: Option<EntityRef>,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        matches!(self.status.as_str(), "success" | "error" | "aborted")
    }
}
