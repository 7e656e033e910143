//! vcd_network_routed
//!
//! Networks attached to an edge gateway. `interface_type` picks how:
//! internal (the default, and the implicit value of older state),
//! sub-interface, or distributed, which needs distributed routing on the
//! edge gateway.

use super::network_common::{
    addressing_schema, base_schema, dhcp_pool_attribute, dhcp_pool_blocks, dhcp_pools,
    validate_dhcp_pools, NetworkFlavor, NetworkResource,
};
use super::ResourceDescriptor;
use crate::error::is_not_found;
use crate::import::ImportLayout;
use crate::schema::diff::suppress_upgraded_interface;
use crate::schema::hash::routed_dhcp_pool_hash;
use crate::schema::{validate, Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{EdgeGateway, NetworkKind, OrgNetwork, RoutedInterface, Vdc};
use crate::vcd::VcdClient;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_network_routed";

pub const INTERFACE_TYPES: &[&str] = &["internal", "subinterface", "distributed"];

pub fn schema() -> Schema {
    base_schema()
        .merge(addressing_schema())
        .attr(
            "edge_gateway",
            Attribute::string()
                .required()
                .force_new()
                .description("name of the edge gateway the network attaches to"),
        )
        .attr(
            "interface_type",
            Attribute::string()
                .optional()
                .force_new()
                .default("internal")
                .validate(validate::string_in_slice(INTERFACE_TYPES, true))
                .diff_suppress(suppress_upgraded_interface()),
        )
        .attr("dhcp_pool", dhcp_pool_attribute(routed_dhcp_pool_hash))
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), NetworkResource(Routed))
        .description("routed org VDC network")
        .importable(ImportLayout::OrgVdcEntity, "network-name")
        .with_data_source(&["name", "org", "vdc"])
}

fn interface_of(d: &ResourceData) -> Result<RoutedInterface> {
    let raw = d.get_str("interface_type");
    RoutedInterface::parse(raw).ok_or_else(|| {
        anyhow!(
            "unrecognized interface_type {:?}: expected one of {:?}",
            raw,
            INTERFACE_TYPES
        )
    })
}

pub struct Routed;

#[async_trait]
impl NetworkFlavor for Routed {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Routed
    }

    async fn parent_edge(
        &self,
        d: &ResourceData,
        client: &VcdClient,
        vdc: &Vdc,
    ) -> Result<Option<EdgeGateway>> {
        let edge = client.get_edge_gateway(vdc, d.get_str("edge_gateway")).await?;
        Ok(Some(edge))
    }

    async fn build(
        &self,
        d: &ResourceData,
        _client: &VcdClient,
        edge: Option<&EdgeGateway>,
        net: &mut OrgNetwork,
    ) -> Result<()> {
        let Some(edge) = edge else {
            bail!("routed network {} has no edge gateway", net.name);
        };
        let interface = interface_of(d)?;
        if interface == RoutedInterface::Distributed && !edge.distributed_routing {
            bail!(
                "interface_type \"distributed\" requires distributed routing on edge gateway {}",
                edge.name
            );
        }
        net.edge_gateway_id = Some(edge.id.clone());
        net.interface = Some(interface);
        net.dhcp_pools = dhcp_pools(d);
        Ok(())
    }

    async fn observe(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        net: &OrgNetwork,
    ) -> Result<()> {
        if let Some(edge_id) = &net.edge_gateway_id {
            match client.call(client.backend().get_edge_gateway(edge_id)).await {
                Ok(edge) => d.set("edge_gateway", &edge.name)?,
                Err(e) if is_not_found(&e) => {
                    tracing::warn!("edge gateway {} of network {} not found", edge_id, net.name)
                }
                Err(e) => return Err(e),
            }
        }
        d.set("interface_type", net.interface.unwrap_or_default().as_str())?;
        d.set("dhcp_pool", dhcp_pool_blocks(&net.dhcp_pools))
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        validate_dhcp_pools(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn test_schema_is_well_formed() {
        assert!(schema().check().is_ok());
        assert!(descriptor().data_source.unwrap().check().is_ok());
    }

    #[test]
    fn test_interface_of() {
        let bag = |v: serde_json::Value| ResourceData::from_json(Arc::new(schema()), &v).unwrap();
        let base = json!({"name": "n", "gateway": "10.0.0.1", "edge_gateway": "e"});
        assert_eq!(interface_of(&bag(base.clone())).unwrap(), RoutedInterface::Internal);

        let mut sub = base.clone();
        sub["interface_type"] = json!("SubInterface");
        assert_eq!(interface_of(&bag(sub)).unwrap(), RoutedInterface::Subinterface);

        let mut bad = base;
        bad["interface_type"] = json!("bridged");
        assert!(interface_of(&bag(bad)).is_err());
    }
}
