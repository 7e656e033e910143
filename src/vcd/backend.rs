//! Backend trait
//!
//! The typed domain surface the dispatchers consume. Every lookup returns
//! [`VcdError::NotFound`](crate::error::VcdError::NotFound) when the entity is
//! absent so callers can detect drift with [`crate::error::is_not_found`].
//! Mutations return the entity as the backend stored it; implementations
//! wait for any asynchronous task before returning.

use super::types::*;
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait VcdBackend: Send + Sync {
    /// Product version string reported by the backend.
    async fn version(&self) -> Result<String>;

    // =========================================================================
    // Organizations
    // =========================================================================

    async fn list_orgs(&self) -> Result<Vec<AdminOrg>>;
    async fn get_org(&self, id: &str) -> Result<AdminOrg>;
    async fn create_org(&self, org: &AdminOrg) -> Result<AdminOrg>;
    async fn update_org(&self, org: &AdminOrg) -> Result<AdminOrg>;
    async fn delete_org(&self, id: &str, force: bool, recursive: bool) -> Result<()>;

    // =========================================================================
    // VDCs
    // =========================================================================

    async fn list_vdcs(&self, org_id: &str) -> Result<Vec<Vdc>>;
    async fn get_vdc(&self, id: &str) -> Result<Vdc>;
    async fn create_vdc(&self, org_id: &str, vdc: &Vdc) -> Result<Vdc>;
    async fn update_vdc(&self, vdc: &Vdc) -> Result<Vdc>;
    async fn delete_vdc(&self, id: &str, force: bool, recursive: bool) -> Result<()>;

    // =========================================================================
    // Edge gateways
    // =========================================================================

    async fn list_edge_gateways(&self, vdc_id: &str) -> Result<Vec<EdgeGateway>>;
    async fn get_edge_gateway(&self, id: &str) -> Result<EdgeGateway>;
    async fn update_edge_settings(
        &self,
        edge_id: &str,
        settings: &EdgeSettings,
    ) -> Result<EdgeSettings>;

    // =========================================================================
    // Networks
    // =========================================================================

    async fn list_networks(&self, vdc_id: &str) -> Result<Vec<OrgNetwork>>;
    async fn get_network(&self, id: &str) -> Result<OrgNetwork>;
    async fn create_network(&self, vdc_id: &str, network: &OrgNetwork) -> Result<OrgNetwork>;
    async fn update_network(&self, network: &OrgNetwork) -> Result<OrgNetwork>;
    async fn delete_network(&self, id: &str) -> Result<()>;
    async fn get_external_network(&self, name: &str) -> Result<ExternalNetwork>;

    // =========================================================================
    // NAT rules
    // =========================================================================

    async fn list_nat_rules(&self, edge_id: &str) -> Result<Vec<NatRule>>;
    async fn get_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<NatRule>;
    async fn create_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule>;
    async fn update_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule>;
    async fn delete_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<()>;

    // =========================================================================
    // Load balancer application profiles
    // =========================================================================

    async fn list_lb_app_profiles(&self, edge_id: &str) -> Result<Vec<LbAppProfile>>;
    async fn get_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<LbAppProfile>;
    async fn create_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile>;
    async fn update_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile>;
    async fn delete_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<()>;

    // =========================================================================
    // IP sets
    // =========================================================================

    async fn list_ipsets(&self, vdc_id: &str) -> Result<Vec<IpSet>>;
    async fn get_ipset(&self, vdc_id: &str, id: &str) -> Result<IpSet>;
    async fn create_ipset(&self, vdc_id: &str, ipset: &IpSet) -> Result<IpSet>;
    async fn update_ipset(&self, vdc_id: &str, ipset: &IpSet) -> Result<IpSet>;
    async fn delete_ipset(&self, vdc_id: &str, id: &str) -> Result<()>;

    // =========================================================================
    // vApps
    // =========================================================================

    async fn list_vapps(&self, vdc_id: &str) -> Result<Vec<VApp>>;
    async fn get_vapp(&self, id: &str) -> Result<VApp>;
    async fn create_vapp(&self, vdc_id: &str, vapp: &VApp) -> Result<VApp>;
    async fn update_vapp(&self, vapp: &VApp) -> Result<VApp>;
    async fn set_vapp_power(&self, id: &str, power_on: bool) -> Result<()>;
    async fn delete_vapp(&self, id: &str) -> Result<()>;

    // =========================================================================
    // Metadata
    // =========================================================================

    async fn get_metadata(&self, target: &MetadataTarget) -> Result<Vec<MetadataEntry>>;
    async fn set_metadata_entry(
        &self,
        target: &MetadataTarget,
        entry: &MetadataEntry,
    ) -> Result<()>;
    async fn delete_metadata_entry(&self, target: &MetadataTarget, key: &str) -> Result<()>;

    // =========================================================================
    // NSX-T Advanced Load Balancer
    // =========================================================================

    async fn list_alb_controllers(&self) -> Result<Vec<AlbController>>;
    async fn get_alb_controller(&self, id: &str) -> Result<AlbController>;
    async fn create_alb_controller(&self, controller: &AlbController) -> Result<AlbController>;
    async fn update_alb_controller(&self, controller: &AlbController) -> Result<AlbController>;
    async fn delete_alb_controller(&self, id: &str) -> Result<()>;

    async fn list_alb_clouds(&self) -> Result<Vec<AlbCloud>>;
    async fn get_alb_cloud(&self, id: &str) -> Result<AlbCloud>;
    async fn create_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud>;
    async fn update_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud>;
    async fn delete_alb_cloud(&self, id: &str) -> Result<()>;

    async fn list_alb_service_engine_groups(&self) -> Result<Vec<AlbServiceEngineGroup>>;
    async fn get_alb_service_engine_group(&self, id: &str) -> Result<AlbServiceEngineGroup>;
    async fn create_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup>;
    async fn update_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup>;
    async fn delete_alb_service_engine_group(&self, id: &str) -> Result<()>;

    async fn get_alb_settings(&self, edge_id: &str) -> Result<AlbSettings>;
    async fn update_alb_settings(
        &self,
        edge_id: &str,
        settings: &AlbSettings,
    ) -> Result<AlbSettings>;

    async fn list_alb_seg_assignments(&self, edge_id: &str) -> Result<Vec<AlbSegAssignment>>;
    async fn get_alb_seg_assignment(&self, id: &str) -> Result<AlbSegAssignment>;
    async fn create_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment>;
    async fn update_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment>;
    async fn delete_alb_seg_assignment(&self, id: &str) -> Result<()>;
}
