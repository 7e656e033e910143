//! Resource Registry - Descriptors of every managed kind
//!
//! Builds the descriptor of each resource kind once, checks every declared
//! schema and provides lookup functions for the provider and the CLI.

use super::{
    alb_cloud, alb_controller, alb_edge_seg, alb_seg, alb_settings, edgegateway_settings, ipset,
    lb_app_profile, nat, network_direct, network_isolated, network_routed, org, vapp, vdc,
    ResourceDescriptor,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// All descriptors keyed by kind name
pub struct Registry {
    resources: BTreeMap<&'static str, ResourceDescriptor>,
}

impl Registry {
    fn build() -> Self {
        let descriptors = [
            org::descriptor(),
            vdc::descriptor(),
            edgegateway_settings::descriptor(),
            network_routed::descriptor(),
            network_isolated::descriptor(),
            network_direct::descriptor(),
            nat::snat_descriptor(),
            nat::dnat_descriptor(),
            lb_app_profile::descriptor(),
            ipset::descriptor(),
            vapp::descriptor(),
            alb_controller::descriptor(),
            alb_cloud::descriptor(),
            alb_seg::descriptor(),
            alb_settings::descriptor(),
            alb_edge_seg::descriptor(),
        ];

        let mut resources = BTreeMap::new();
        for descriptor in descriptors {
            if let Err(e) = descriptor.schema.check() {
                panic!("Malformed schema for {}: {:#}", descriptor.name, e);
            }
            if let Some(ds) = &descriptor.data_source {
                if let Err(e) = ds.check() {
                    panic!("Malformed data source schema for {}: {:#}", descriptor.name, e);
                }
            }
            if resources.insert(descriptor.name, descriptor).is_some() {
                panic!("Duplicate resource kind in registry");
            }
        }
        Self { resources }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values()
    }
}

/// Global registry, built and checked on first access
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the resource registry
pub fn get_registry() -> &'static Registry {
    REGISTRY.get_or_init(|| {
        let registry = Registry::build();
        tracing::debug!("Registered {} resource kinds", registry.resources.len());
        registry
    })
}

/// Get a resource descriptor by kind name
pub fn get_resource(name: &str) -> Option<&'static ResourceDescriptor> {
    get_registry().resources.get(name)
}

/// Get a descriptor that also serves as a data source
pub fn get_data_source(name: &str) -> Option<&'static ResourceDescriptor> {
    get_resource(name).filter(|d| d.data_source.is_some())
}

/// All resource kind names, sorted
pub fn resource_names() -> Vec<&'static str> {
    get_registry().resources.keys().copied().collect()
}

/// All data-source kind names, sorted
pub fn data_source_names() -> Vec<&'static str> {
    get_registry()
        .iter()
        .filter(|d| d.data_source.is_some())
        .map(|d| d.name)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportLayout;

    #[test]
    fn test_registry_loads_successfully() {
        let registry = get_registry();
        assert_eq!(registry.iter().count(), 16);
    }

    #[test]
    fn test_every_kind_is_importable() {
        for d in get_registry().iter() {
            assert!(d.import_layout.is_some(), "{} has no import layout", d.name);
            assert!(!d.import_entity.is_empty(), "{} has no import entity name", d.name);
        }
    }

    #[test]
    fn test_import_layouts() {
        assert_eq!(get_resource("vcd_org").unwrap().import_layout, Some(ImportLayout::Entity));
        assert_eq!(
            get_resource("vcd_network_isolated").unwrap().import_layout,
            Some(ImportLayout::OrgVdcEntity)
        );
        assert_eq!(
            get_resource("vcd_nsxv_dnat").unwrap().import_layout,
            Some(ImportLayout::OrgVdcEdgeEntity)
        );
    }

    #[test]
    fn test_singletons_have_no_data_source() {
        assert!(get_resource("vcd_edgegateway_settings").is_some());
        assert!(get_data_source("vcd_edgegateway_settings").is_none());
        assert!(get_data_source("vcd_nsxt_alb_settings").is_none());
        assert!(get_data_source("vcd_network_routed").is_some());
    }

    #[test]
    fn test_names_are_sorted() {
        let names = resource_names();
        let mut sorted = names.clone();
        sorted.sort_unstable();
        assert_eq!(names, sorted);
        assert!(names.contains(&"vcd_nsxt_alb_edgegateway_service_engine_group"));
        // settings singletons and NAT rules are resource-only
        assert_eq!(data_source_names().len(), names.len() - 4);
    }

    #[test]
    fn test_timeouts() {
        use crate::resource::{Timeouts, LONG_TIMEOUT};

        assert_eq!(get_resource("vcd_vapp").unwrap().timeouts, Timeouts::uniform(LONG_TIMEOUT));
        assert_eq!(get_resource("vcd_org_vdc").unwrap().timeouts, Timeouts::uniform(LONG_TIMEOUT));
        assert_eq!(get_resource("vcd_ipset").unwrap().timeouts, Timeouts::default());
    }

    #[test]
    fn test_unknown_kind() {
        assert!(get_resource("vcd_nope").is_none());
    }
}
