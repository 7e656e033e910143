//! In-memory backend for integration tests
//!
//! [`FakeBackend`] implements the backend trait over plain collections and
//! records every call. Load balancer profile creates sleep briefly and count
//! how often two of them were in flight for the same edge gateway at once.

#![allow(dead_code)]

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;
use vcd_provider::config::ProviderConfig;
use vcd_provider::error::{VcdError, DISABLED_ORG_FAILURE_SIGNATURE};
use vcd_provider::vcd::types::*;
use vcd_provider::vcd::{VcdBackend, VcdClient};
use vcd_provider::Provider;

pub const ORG: &str = "org1";
pub const VDC: &str = "vdc1";
pub const EDGE: &str = "edge1";
pub const EXT_NET: &str = "ext-net";
pub const BACKEND_VERSION: &str = "37.2";

pub fn new_id(kind: &str) -> String {
    format!("urn:vcloud:{}:{}", kind, Uuid::new_v4())
}

fn missing<T>(what: &str, id: &str) -> Result<T> {
    Err(VcdError::not_found(format!("{} {}", what, id)).into())
}

#[derive(Default)]
struct Store {
    orgs: Vec<AdminOrg>,
    vdcs: Vec<Vdc>,
    edges: Vec<EdgeGateway>,
    networks: Vec<OrgNetwork>,
    external_networks: Vec<ExternalNetwork>,
    nat_rules: BTreeMap<String, Vec<NatRule>>,
    lb_profiles: BTreeMap<String, Vec<LbAppProfile>>,
    ipsets: BTreeMap<String, Vec<IpSet>>,
    vapps: Vec<(String, VApp)>,
    metadata: BTreeMap<String, Vec<MetadataEntry>>,
    alb_controllers: Vec<AlbController>,
    alb_clouds: Vec<AlbCloud>,
    alb_segs: Vec<AlbServiceEngineGroup>,
    alb_settings: BTreeMap<String, AlbSettings>,
    alb_assignments: Vec<AlbSegAssignment>,
}

/// Recording in-memory backend
pub struct FakeBackend {
    store: Mutex<Store>,
    calls: Mutex<Vec<String>>,
    lb_in_flight: Mutex<BTreeMap<String, usize>>,
    lb_overlaps: AtomicUsize,
    reject_disabled_org: AtomicBool,
    mutation_delay: Duration,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            store: Mutex::new(Store::default()),
            calls: Mutex::new(Vec::new()),
            lb_in_flight: Mutex::new(BTreeMap::new()),
            lb_overlaps: AtomicUsize::new(0),
            reject_disabled_org: AtomicBool::new(false),
            mutation_delay: Duration::from_millis(50),
        }
    }
}

impl FakeBackend {
    /// Backend holding org1/vdc1/edge1, with edge1 attached to `ext-net`
    /// (uplink, vNIC 0).
    pub fn seeded() -> Arc<Self> {
        let backend = Arc::new(Self::default());
        let org = backend.seed_org(ORG);
        let vdc = backend.seed_vdc(&org, VDC);
        backend.seed_edge(&vdc, EDGE, false);
        backend.seed_external_network(EXT_NET);
        backend
    }

    pub fn client(self: &Arc<Self>) -> VcdClient {
        let config = ProviderConfig {
            org: ORG.to_string(),
            vdc: VDC.to_string(),
            url: "https://vcd.example.com/api".to_string(),
            ..Default::default()
        };
        VcdClient::new(config, Arc::clone(self) as Arc<dyn VcdBackend>)
            .with_visibility_wait(Duration::from_secs(1))
    }

    pub fn provider(self: &Arc<Self>) -> Provider {
        Provider::from_client(self.client())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn lb_overlaps(&self) -> usize {
        self.lb_overlaps.load(Ordering::SeqCst)
    }

    /// Make `create_org` fail the way some backend versions do for
    /// organizations created disabled.
    pub fn reject_disabled_orgs(&self) {
        self.reject_disabled_org.store(true, Ordering::SeqCst);
    }

    // =========================================================================
    // Seeding and out-of-band changes
    // =========================================================================

    pub fn seed_org(&self, name: &str) -> AdminOrg {
        let id = new_id("org");
        let org = AdminOrg {
            href: format!("https://vcd.example.com/api/org/{}", id),
            id,
            name: name.to_string(),
            full_name: name.to_string(),
            is_enabled: true,
            ..Default::default()
        };
        self.store.lock().unwrap().orgs.push(org.clone());
        org
    }

    pub fn seed_vdc(&self, org: &AdminOrg, name: &str) -> Vdc {
        let id = new_id("vdc");
        let vdc = Vdc {
            href: format!("https://vcd.example.com/api/vdc/{}", id),
            id,
            name: name.to_string(),
            org_id: org.id.clone(),
            allocation_model: "Flex".to_string(),
            is_enabled: true,
            ..Default::default()
        };
        self.store.lock().unwrap().vdcs.push(vdc.clone());
        vdc
    }

    pub fn seed_edge(&self, vdc: &Vdc, name: &str, distributed_routing: bool) -> EdgeGateway {
        let id = new_id("gateway");
        let edge = EdgeGateway {
            href: format!("https://vcd.example.com/api/admin/edgeGateway/{}", id),
            id,
            name: name.to_string(),
            vdc_id: vdc.id.clone(),
            distributed_routing,
            vnics: vec![EdgeVnic {
                index: 0,
                network_name: EXT_NET.to_string(),
                kind: VnicKind::Uplink,
            }],
            settings: EdgeSettings::default(),
        };
        self.store.lock().unwrap().edges.push(edge.clone());
        edge
    }

    pub fn seed_external_network(&self, name: &str) -> ExternalNetwork {
        let net = ExternalNetwork {
            id: new_id("network"),
            name: name.to_string(),
            gateway: "10.150.0.1".to_string(),
            netmask: "255.255.0.0".to_string(),
            dns1: "10.150.0.53".to_string(),
            ..Default::default()
        };
        self.store.lock().unwrap().external_networks.push(net.clone());
        net
    }

    pub fn seed_alb_seg(&self, name: &str) -> AlbServiceEngineGroup {
        let seg = AlbServiceEngineGroup {
            id: new_id("serviceEngineGroup"),
            name: name.to_string(),
            alb_cloud_id: new_id("loadBalancerCloud"),
            reservation_model: "SHARED".to_string(),
            importable_service_engine_group_name: "Default-Group".to_string(),
            max_virtual_services: Some(10),
            reserved_virtual_services: Some(0),
            ..Default::default()
        };
        self.store.lock().unwrap().alb_segs.push(seg.clone());
        seg
    }

    /// Remove whatever entity carries `id`, as if deleted out of band.
    pub fn forget(&self, id: &str) {
        let mut store = self.store.lock().unwrap();
        store.orgs.retain(|o| o.id != id);
        store.vdcs.retain(|v| v.id != id);
        store.networks.retain(|n| n.id != id);
        for rules in store.nat_rules.values_mut() {
            rules.retain(|r| r.id != id);
        }
        for profiles in store.lb_profiles.values_mut() {
            profiles.retain(|p| p.id != id);
        }
        for sets in store.ipsets.values_mut() {
            sets.retain(|s| s.id != id);
        }
        store.vapps.retain(|(_, v)| v.id != id);
        store.alb_controllers.retain(|c| c.id != id);
        store.alb_clouds.retain(|c| c.id != id);
        store.alb_segs.retain(|s| s.id != id);
        store.alb_assignments.retain(|a| a.id != id);
    }

    pub fn edge(&self, name: &str) -> EdgeGateway {
        let store = self.store.lock().unwrap();
        store
            .edges
            .iter()
            .find(|e| e.name == name)
            .cloned()
            .unwrap_or_else(|| panic!("no edge gateway {}", name))
    }

    /// Store a NAT rule directly, bypassing the provider.
    pub fn insert_nat_rule(&self, edge_id: &str, mut rule: NatRule) -> String {
        let mut store = self.store.lock().unwrap();
        let existing: usize = store.nat_rules.values().map(Vec::len).sum();
        rule.id = (196609 + existing).to_string();
        let id = rule.id.clone();
        store.nat_rules.entry(edge_id.to_string()).or_default().push(rule);
        id
    }

    pub fn network(&self, id: &str) -> Option<OrgNetwork> {
        self.store.lock().unwrap().networks.iter().find(|n| n.id == id).cloned()
    }

    pub fn remove_network(&self, id: &str) {
        self.store.lock().unwrap().networks.retain(|n| n.id != id);
    }

    pub fn lb_profiles(&self, edge_id: &str) -> Vec<LbAppProfile> {
        self.store
            .lock()
            .unwrap()
            .lb_profiles
            .get(edge_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn vapp(&self, id: &str) -> Option<VApp> {
        self.store
            .lock()
            .unwrap()
            .vapps
            .iter()
            .find(|(_, v)| v.id == id)
            .map(|(_, v)| v.clone())
    }

    pub fn metadata_of(&self, id: &str) -> Vec<MetadataEntry> {
        self.store.lock().unwrap().metadata.get(id).cloned().unwrap_or_default()
    }

    pub fn alb_settings_of(&self, edge_id: &str) -> AlbSettings {
        self.store
            .lock()
            .unwrap()
            .alb_settings
            .get(edge_id)
            .cloned()
            .unwrap_or_default()
    }
}

fn upsert<T: Clone>(
    items: &mut [T],
    matches: impl Fn(&T) -> bool,
    value: &T,
    what: &str,
    id: &str,
) -> Result<T> {
    match items.iter_mut().find(|i| matches(i)) {
        Some(slot) => {
            *slot = value.clone();
            Ok(value.clone())
        }
        None => missing(what, id),
    }
}

#[async_trait]
impl VcdBackend for FakeBackend {
    async fn version(&self) -> Result<String> {
        self.record("version");
        Ok(BACKEND_VERSION.to_string())
    }

    // Organizations

    async fn list_orgs(&self) -> Result<Vec<AdminOrg>> {
        self.record("list_orgs");
        Ok(self.store.lock().unwrap().orgs.clone())
    }

    async fn get_org(&self, id: &str) -> Result<AdminOrg> {
        self.record(format!("get_org {}", id));
        let store = self.store.lock().unwrap();
        match store.orgs.iter().find(|o| o.id == id) {
            Some(o) => Ok(o.clone()),
            None => missing("org", id),
        }
    }

    async fn create_org(&self, org: &AdminOrg) -> Result<AdminOrg> {
        self.record(format!("create_org {}", org.name));
        if !org.is_enabled && self.reject_disabled_org.load(Ordering::SeqCst) {
            return Err(VcdError::Api {
                status: 500,
                message: format!(
                    "[ 7d4e ] org.hibernate.exception.ConstraintViolationException: could not execute statement; {} is null",
                    DISABLED_ORG_FAILURE_SIGNATURE
                ),
            }
            .into());
        }
        let mut created = org.clone();
        created.id = new_id("org");
        created.href = format!("https://vcd.example.com/api/org/{}", created.id);
        self.store.lock().unwrap().orgs.push(created.clone());
        Ok(created)
    }

    async fn update_org(&self, org: &AdminOrg) -> Result<AdminOrg> {
        self.record(format!("update_org {}", org.id));
        let mut store = self.store.lock().unwrap();
        let mut stored = org.clone();
        if let Some(existing) = store.orgs.iter().find(|o| o.id == org.id) {
            stored.href = existing.href.clone();
        }
        upsert(&mut store.orgs, |o| o.id == org.id, &stored, "org", &org.id)
    }

    async fn delete_org(&self, id: &str, _force: bool, _recursive: bool) -> Result<()> {
        self.record(format!("delete_org {}", id));
        self.store.lock().unwrap().orgs.retain(|o| o.id != id);
        Ok(())
    }

    // VDCs

    async fn list_vdcs(&self, org_id: &str) -> Result<Vec<Vdc>> {
        self.record("list_vdcs");
        let store = self.store.lock().unwrap();
        Ok(store.vdcs.iter().filter(|v| v.org_id == org_id).cloned().collect())
    }

    async fn get_vdc(&self, id: &str) -> Result<Vdc> {
        self.record(format!("get_vdc {}", id));
        let store = self.store.lock().unwrap();
        match store.vdcs.iter().find(|v| v.id == id) {
            Some(v) => Ok(v.clone()),
            None => missing("vdc", id),
        }
    }

    async fn create_vdc(&self, org_id: &str, vdc: &Vdc) -> Result<Vdc> {
        self.record(format!("create_vdc {}", vdc.name));
        let mut created = vdc.clone();
        created.id = new_id("vdc");
        created.org_id = org_id.to_string();
        created.href = format!("https://vcd.example.com/api/vdc/{}", created.id);
        self.store.lock().unwrap().vdcs.push(created.clone());
        Ok(created)
    }

    async fn update_vdc(&self, vdc: &Vdc) -> Result<Vdc> {
        self.record(format!("update_vdc {}", vdc.id));
        let mut store = self.store.lock().unwrap();
        upsert(&mut store.vdcs, |v| v.id == vdc.id, vdc, "vdc", &vdc.id)
    }

    async fn delete_vdc(&self, id: &str, _force: bool, _recursive: bool) -> Result<()> {
        self.record(format!("delete_vdc {}", id));
        self.store.lock().unwrap().vdcs.retain(|v| v.id != id);
        Ok(())
    }

    // Edge gateways

    async fn list_edge_gateways(&self, vdc_id: &str) -> Result<Vec<EdgeGateway>> {
        self.record("list_edge_gateways");
        let store = self.store.lock().unwrap();
        Ok(store.edges.iter().filter(|e| e.vdc_id == vdc_id).cloned().collect())
    }

    async fn get_edge_gateway(&self, id: &str) -> Result<EdgeGateway> {
        self.record(format!("get_edge_gateway {}", id));
        let store = self.store.lock().unwrap();
        match store.edges.iter().find(|e| e.id == id) {
            Some(e) => Ok(e.clone()),
            None => missing("edge gateway", id),
        }
    }

    async fn update_edge_settings(
        &self,
        edge_id: &str,
        settings: &EdgeSettings,
    ) -> Result<EdgeSettings> {
        self.record(format!("update_edge_settings {}", edge_id));
        let mut store = self.store.lock().unwrap();
        match store.edges.iter_mut().find(|e| e.id == edge_id) {
            Some(edge) => {
                edge.settings = settings.clone();
                Ok(settings.clone())
            }
            None => missing("edge gateway", edge_id),
        }
    }

    // Networks

    async fn list_networks(&self, vdc_id: &str) -> Result<Vec<OrgNetwork>> {
        self.record("list_networks");
        let store = self.store.lock().unwrap();
        Ok(store.networks.iter().filter(|n| n.vdc_id == vdc_id).cloned().collect())
    }

    async fn get_network(&self, id: &str) -> Result<OrgNetwork> {
        self.record(format!("get_network {}", id));
        match self.network(id) {
            Some(n) => Ok(n),
            None => missing("network", id),
        }
    }

    async fn create_network(&self, vdc_id: &str, network: &OrgNetwork) -> Result<OrgNetwork> {
        self.record(format!("create_network {}", network.name));
        let mut created = network.clone();
        created.id = new_id("network");
        created.vdc_id = vdc_id.to_string();
        created.href = format!("https://vcd.example.com/api/network/{}", created.id);
        if created.kind == NetworkKind::Routed && created.interface.is_none() {
            created.interface = Some(RoutedInterface::Internal);
        }
        self.store.lock().unwrap().networks.push(created.clone());
        Ok(created)
    }

    async fn update_network(&self, network: &OrgNetwork) -> Result<OrgNetwork> {
        self.record(format!("update_network {}", network.id));
        let mut store = self.store.lock().unwrap();
        let Some(existing) = store.networks.iter_mut().find(|n| n.id == network.id) else {
            return missing("network", &network.id);
        };
        let href = existing.href.clone();
        let vdc_id = existing.vdc_id.clone();
        *existing = network.clone();
        existing.href = href;
        existing.vdc_id = vdc_id;
        Ok(existing.clone())
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.record(format!("delete_network {}", id));
        self.remove_network(id);
        Ok(())
    }

    async fn get_external_network(&self, name: &str) -> Result<ExternalNetwork> {
        self.record(format!("get_external_network {}", name));
        let store = self.store.lock().unwrap();
        match store.external_networks.iter().find(|n| n.name == name) {
            Some(n) => Ok(n.clone()),
            None => missing("external network", name),
        }
    }

    // NAT rules

    async fn list_nat_rules(&self, edge_id: &str) -> Result<Vec<NatRule>> {
        self.record("list_nat_rules");
        Ok(self
            .store
            .lock()
            .unwrap()
            .nat_rules
            .get(edge_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<NatRule> {
        self.record(format!("get_nat_rule {}", rule_id));
        let store = self.store.lock().unwrap();
        let found = store
            .nat_rules
            .get(edge_id)
            .and_then(|rules| rules.iter().find(|r| r.id == rule_id).cloned());
        match found {
            Some(r) => Ok(r),
            None => missing("NAT rule", rule_id),
        }
    }

    async fn create_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule> {
        self.record(format!("create_nat_rule {}", rule.action));
        let mut created = rule.clone();
        if created.rule_tag.is_none() {
            created.rule_tag = Some(65537);
        }
        let id = self.insert_nat_rule(edge_id, created.clone());
        created.id = id;
        Ok(created)
    }

    async fn update_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule> {
        self.record(format!("update_nat_rule {}", rule.id));
        let mut store = self.store.lock().unwrap();
        let rules = store.nat_rules.entry(edge_id.to_string()).or_default();
        upsert(rules, |r| r.id == rule.id, rule, "NAT rule", &rule.id)
    }

    async fn delete_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<()> {
        self.record(format!("delete_nat_rule {}", rule_id));
        if let Some(rules) = self.store.lock().unwrap().nat_rules.get_mut(edge_id) {
            rules.retain(|r| r.id != rule_id);
        }
        Ok(())
    }

    // Load balancer application profiles

    async fn list_lb_app_profiles(&self, edge_id: &str) -> Result<Vec<LbAppProfile>> {
        self.record("list_lb_app_profiles");
        Ok(self.lb_profiles(edge_id))
    }

    async fn get_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<LbAppProfile> {
        self.record(format!("get_lb_app_profile {}", id));
        match self.lb_profiles(edge_id).into_iter().find(|p| p.id == id) {
            Some(p) => Ok(p),
            None => missing("application profile", id),
        }
    }

    async fn create_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile> {
        self.record(format!("create_lb_app_profile {} start", profile.name));
        {
            let mut in_flight = self.lb_in_flight.lock().unwrap();
            let count = in_flight.entry(edge_id.to_string()).or_insert(0);
            if *count > 0 {
                self.lb_overlaps.fetch_add(1, Ordering::SeqCst);
            }
            *count += 1;
        }

        tokio::time::sleep(self.mutation_delay).await;

        let mut created = profile.clone();
        {
            let mut store = self.store.lock().unwrap();
            let profiles = store.lb_profiles.entry(edge_id.to_string()).or_default();
            created.id = format!("applicationProfile-{}", profiles.len() + 1);
            profiles.push(created.clone());
        }
        if let Some(count) = self.lb_in_flight.lock().unwrap().get_mut(edge_id) {
            *count -= 1;
        }
        self.record(format!("create_lb_app_profile {} end", profile.name));
        Ok(created)
    }

    async fn update_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile> {
        self.record(format!("update_lb_app_profile {}", profile.id));
        let mut store = self.store.lock().unwrap();
        let profiles = store.lb_profiles.entry(edge_id.to_string()).or_default();
        upsert(profiles, |p| p.id == profile.id, profile, "application profile", &profile.id)
    }

    async fn delete_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<()> {
        self.record(format!("delete_lb_app_profile {}", id));
        if let Some(profiles) = self.store.lock().unwrap().lb_profiles.get_mut(edge_id) {
            profiles.retain(|p| p.id != id);
        }
        Ok(())
    }

    // IP sets

    async fn list_ipsets(&self, vdc_id: &str) -> Result<Vec<IpSet>> {
        self.record("list_ipsets");
        Ok(self.store.lock().unwrap().ipsets.get(vdc_id).cloned().unwrap_or_default())
    }

    async fn get_ipset(&self, vdc_id: &str, id: &str) -> Result<IpSet> {
        self.record(format!("get_ipset {}", id));
        let found = self
            .store
            .lock()
            .unwrap()
            .ipsets
            .get(vdc_id)
            .and_then(|sets| sets.iter().find(|s| s.id == id).cloned());
        match found {
            Some(s) => Ok(s),
            None => missing("IP set", id),
        }
    }

    async fn create_ipset(&self, vdc_id: &str, ipset: &IpSet) -> Result<IpSet> {
        self.record(format!("create_ipset {}", ipset.name));
        let mut created = ipset.clone();
        created.id = format!("{}:ipset-{}", vdc_id, Uuid::new_v4().simple());
        self.store
            .lock()
            .unwrap()
            .ipsets
            .entry(vdc_id.to_string())
            .or_default()
            .push(created.clone());
        Ok(created)
    }

    async fn update_ipset(&self, vdc_id: &str, ipset: &IpSet) -> Result<IpSet> {
        self.record(format!("update_ipset {}", ipset.id));
        let mut store = self.store.lock().unwrap();
        let sets = store.ipsets.entry(vdc_id.to_string()).or_default();
        upsert(sets, |s| s.id == ipset.id, ipset, "IP set", &ipset.id)
    }

    async fn delete_ipset(&self, vdc_id: &str, id: &str) -> Result<()> {
        self.record(format!("delete_ipset {}", id));
        if let Some(sets) = self.store.lock().unwrap().ipsets.get_mut(vdc_id) {
            sets.retain(|s| s.id != id);
        }
        Ok(())
    }

    // vApps

    async fn list_vapps(&self, vdc_id: &str) -> Result<Vec<VApp>> {
        self.record("list_vapps");
        let store = self.store.lock().unwrap();
        Ok(store
            .vapps
            .iter()
            .filter(|(vdc, _)| vdc == vdc_id)
            .map(|(_, v)| v.clone())
            .collect())
    }

    async fn get_vapp(&self, id: &str) -> Result<VApp> {
        self.record(format!("get_vapp {}", id));
        match self.vapp(id) {
            Some(v) => Ok(v),
            None => missing("vApp", id),
        }
    }

    async fn create_vapp(&self, vdc_id: &str, vapp: &VApp) -> Result<VApp> {
        self.record(format!("create_vapp {}", vapp.name));
        let mut created = vapp.clone();
        created.id = new_id("vapp");
        created.href = format!("https://vcd.example.com/api/vApp/{}", created.id);
        created.status = 1;
        self.store
            .lock()
            .unwrap()
            .vapps
            .push((vdc_id.to_string(), created.clone()));
        Ok(created)
    }

    async fn update_vapp(&self, vapp: &VApp) -> Result<VApp> {
        self.record(format!("update_vapp {}", vapp.id));
        let mut store = self.store.lock().unwrap();
        let Some((_, existing)) = store.vapps.iter_mut().find(|(_, v)| v.id == vapp.id) else {
            return missing("vApp", &vapp.id);
        };
        existing.description = vapp.description.clone();
        existing.guest_properties = vapp.guest_properties.clone();
        Ok(existing.clone())
    }

    async fn set_vapp_power(&self, id: &str, power_on: bool) -> Result<()> {
        self.record(format!("set_vapp_power {} {}", id, power_on));
        let mut store = self.store.lock().unwrap();
        let Some((_, existing)) = store.vapps.iter_mut().find(|(_, v)| v.id == id) else {
            return missing("vApp", id);
        };
        existing.status = if power_on {
            VAPP_STATUS_POWERED_ON
        } else {
            VAPP_STATUS_POWERED_OFF
        };
        Ok(())
    }

    async fn delete_vapp(&self, id: &str) -> Result<()> {
        self.record(format!("delete_vapp {}", id));
        let mut store = self.store.lock().unwrap();
        if let Some((_, v)) = store.vapps.iter().find(|(_, v)| v.id == id) {
            if v.status == VAPP_STATUS_POWERED_ON {
                bail!("vApp {} must be powered off before removal", id);
            }
        }
        store.vapps.retain(|(_, v)| v.id != id);
        Ok(())
    }

    // Metadata

    async fn get_metadata(&self, target: &MetadataTarget) -> Result<Vec<MetadataEntry>> {
        self.record(format!("get_metadata {}", target.id));
        Ok(self.metadata_of(&target.id))
    }

    async fn set_metadata_entry(
        &self,
        target: &MetadataTarget,
        entry: &MetadataEntry,
    ) -> Result<()> {
        self.record(format!("set_metadata_entry {} {}", target.id, entry.key));
        let mut store = self.store.lock().unwrap();
        let entries = store.metadata.entry(target.id.clone()).or_default();
        entries.retain(|e| !(e.key == entry.key && e.is_system == entry.is_system));
        entries.push(entry.clone());
        Ok(())
    }

    async fn delete_metadata_entry(&self, target: &MetadataTarget, key: &str) -> Result<()> {
        self.record(format!("delete_metadata_entry {} {}", target.id, key));
        if let Some(entries) = self.store.lock().unwrap().metadata.get_mut(&target.id) {
            entries.retain(|e| e.key != key);
        }
        Ok(())
    }

    // NSX-T ALB

    async fn list_alb_controllers(&self) -> Result<Vec<AlbController>> {
        self.record("list_alb_controllers");
        Ok(self.store.lock().unwrap().alb_controllers.clone())
    }

    async fn get_alb_controller(&self, id: &str) -> Result<AlbController> {
        self.record(format!("get_alb_controller {}", id));
        let store = self.store.lock().unwrap();
        match store.alb_controllers.iter().find(|c| c.id == id) {
            Some(c) => Ok(c.clone()),
            None => missing("ALB controller", id),
        }
    }

    async fn create_alb_controller(&self, controller: &AlbController) -> Result<AlbController> {
        self.record(format!("create_alb_controller {}", controller.name));
        let mut created = controller.clone();
        created.id = new_id("loadBalancerController");
        created.password = None;
        created.version = "21.1.4".to_string();
        self.store.lock().unwrap().alb_controllers.push(created.clone());
        Ok(created)
    }

    async fn update_alb_controller(&self, controller: &AlbController) -> Result<AlbController> {
        self.record(format!("update_alb_controller {}", controller.id));
        let mut stored = controller.clone();
        stored.password = None;
        let mut store = self.store.lock().unwrap();
        upsert(
            &mut store.alb_controllers,
            |c| c.id == controller.id,
            &stored,
            "ALB controller",
            &controller.id,
        )
    }

    async fn delete_alb_controller(&self, id: &str) -> Result<()> {
        self.record(format!("delete_alb_controller {}", id));
        self.store.lock().unwrap().alb_controllers.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_alb_clouds(&self) -> Result<Vec<AlbCloud>> {
        self.record("list_alb_clouds");
        Ok(self.store.lock().unwrap().alb_clouds.clone())
    }

    async fn get_alb_cloud(&self, id: &str) -> Result<AlbCloud> {
        self.record(format!("get_alb_cloud {}", id));
        let store = self.store.lock().unwrap();
        match store.alb_clouds.iter().find(|c| c.id == id) {
            Some(c) => Ok(c.clone()),
            None => missing("ALB cloud", id),
        }
    }

    async fn create_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud> {
        self.record(format!("create_alb_cloud {}", cloud.name));
        let mut created = cloud.clone();
        created.id = new_id("loadBalancerCloud");
        created.health_status = "UP".to_string();
        self.store.lock().unwrap().alb_clouds.push(created.clone());
        Ok(created)
    }

    async fn update_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud> {
        self.record(format!("update_alb_cloud {}", cloud.id));
        let mut store = self.store.lock().unwrap();
        upsert(&mut store.alb_clouds, |c| c.id == cloud.id, cloud, "ALB cloud", &cloud.id)
    }

    async fn delete_alb_cloud(&self, id: &str) -> Result<()> {
        self.record(format!("delete_alb_cloud {}", id));
        self.store.lock().unwrap().alb_clouds.retain(|c| c.id != id);
        Ok(())
    }

    async fn list_alb_service_engine_groups(&self) -> Result<Vec<AlbServiceEngineGroup>> {
        self.record("list_alb_service_engine_groups");
        Ok(self.store.lock().unwrap().alb_segs.clone())
    }

    async fn get_alb_service_engine_group(&self, id: &str) -> Result<AlbServiceEngineGroup> {
        self.record(format!("get_alb_service_engine_group {}", id));
        let store = self.store.lock().unwrap();
        match store.alb_segs.iter().find(|s| s.id == id) {
            Some(s) => Ok(s.clone()),
            None => missing("service engine group", id),
        }
    }

    async fn create_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup> {
        self.record(format!("create_alb_service_engine_group {}", seg.name));
        let mut created = seg.clone();
        created.id = new_id("serviceEngineGroup");
        created.ha_mode = "ELASTIC_N_PLUS_M_BUFFER".to_string();
        if created.max_virtual_services.is_none() {
            created.max_virtual_services = Some(10);
        }
        if created.reserved_virtual_services.is_none() {
            created.reserved_virtual_services = Some(0);
        }
        self.store.lock().unwrap().alb_segs.push(created.clone());
        Ok(created)
    }

    async fn update_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup> {
        self.record(format!("update_alb_service_engine_group {}", seg.id));
        let mut store = self.store.lock().unwrap();
        upsert(&mut store.alb_segs, |s| s.id == seg.id, seg, "service engine group", &seg.id)
    }

    async fn delete_alb_service_engine_group(&self, id: &str) -> Result<()> {
        self.record(format!("delete_alb_service_engine_group {}", id));
        self.store.lock().unwrap().alb_segs.retain(|s| s.id != id);
        Ok(())
    }

    async fn get_alb_settings(&self, edge_id: &str) -> Result<AlbSettings> {
        self.record(format!("get_alb_settings {}", edge_id));
        let store = self.store.lock().unwrap();
        if !store.edges.iter().any(|e| e.id == edge_id) {
            return missing("edge gateway", edge_id);
        }
        Ok(store.alb_settings.get(edge_id).cloned().unwrap_or_default())
    }

    async fn update_alb_settings(
        &self,
        edge_id: &str,
        settings: &AlbSettings,
    ) -> Result<AlbSettings> {
        self.record(format!("update_alb_settings {} {}", edge_id, settings.is_active));
        let mut stored = settings.clone();
        if stored.is_active {
            if stored.service_network_specification.is_empty() {
                stored.service_network_specification = "192.168.255.1/25".to_string();
            }
            stored.supported_feature_set = "STANDARD".to_string();
        } else {
            stored = AlbSettings::default();
        }
        self.store
            .lock()
            .unwrap()
            .alb_settings
            .insert(edge_id.to_string(), stored.clone());
        Ok(stored)
    }

    async fn list_alb_seg_assignments(&self, edge_id: &str) -> Result<Vec<AlbSegAssignment>> {
        self.record("list_alb_seg_assignments");
        let store = self.store.lock().unwrap();
        Ok(store
            .alb_assignments
            .iter()
            .filter(|a| a.edge_gateway_id == edge_id)
            .cloned()
            .collect())
    }

    async fn get_alb_seg_assignment(&self, id: &str) -> Result<AlbSegAssignment> {
        self.record(format!("get_alb_seg_assignment {}", id));
        let store = self.store.lock().unwrap();
        match store.alb_assignments.iter().find(|a| a.id == id) {
            Some(a) => Ok(a.clone()),
            None => missing("service engine group assignment", id),
        }
    }

    async fn create_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment> {
        self.record(format!("create_alb_seg_assignment {}", assignment.service_engine_group_id));
        let mut store = self.store.lock().unwrap();
        let seg_name = store
            .alb_segs
            .iter()
            .find(|s| s.id == assignment.service_engine_group_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| {
                anyhow!(
                    "service engine group {} does not exist",
                    assignment.service_engine_group_id
                )
            })?;
        let mut created = assignment.clone();
        created.id = new_id("serviceEngineGroupAssignment");
        created.service_engine_group_name = seg_name;
        store.alb_assignments.push(created.clone());
        Ok(created)
    }

    async fn update_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment> {
        self.record(format!("update_alb_seg_assignment {}", assignment.id));
        let mut store = self.store.lock().unwrap();
        let Some(existing) = store.alb_assignments.iter_mut().find(|a| a.id == assignment.id) else {
            return missing("service engine group assignment", &assignment.id);
        };
        existing.max_virtual_services = assignment.max_virtual_services;
        existing.reserved_virtual_services = assignment.reserved_virtual_services;
        Ok(existing.clone())
    }

    async fn delete_alb_seg_assignment(&self, id: &str) -> Result<()> {
        self.record(format!("delete_alb_seg_assignment {}", id));
        self.store.lock().unwrap().alb_assignments.retain(|a| a.id != id);
        Ok(())
    }
}

/// Isolated network configuration used across tests
pub fn isolated_network_config(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "gateway": "192.168.2.1",
        "netmask": "255.255.255.0",
        "static_ip_pool": [
            {"start_address": "192.168.2.2", "end_address": "192.168.2.50"}
        ]
    })
}
