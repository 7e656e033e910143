//! vcd_network_direct
//!
//! Networks bridged straight onto an external network. Addressing comes
//! from the external network and is reported back as computed attributes.

use super::network_common::{base_schema, NetworkFlavor, NetworkResource};
use super::ResourceDescriptor;
use crate::error::is_not_found;
use crate::import::ImportLayout;
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{EdgeGateway, NetworkKind, OrgNetwork};
use crate::vcd::VcdClient;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_network_direct";

pub fn schema() -> Schema {
    base_schema()
        .attr("external_network", Attribute::string().required().force_new())
        .attr("external_network_gateway", Attribute::string().computed())
        .attr("external_network_netmask", Attribute::string().computed())
        .attr("external_network_dns1", Attribute::string().computed())
        .attr("external_network_dns2", Attribute::string().computed())
        .attr("external_network_dns_suffix", Attribute::string().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), NetworkResource(Direct))
        .description("direct org VDC network")
        .importable(ImportLayout::OrgVdcEntity, "network-name")
        .with_data_source(&["name", "org", "vdc"])
}

pub struct Direct;

#[async_trait]
impl NetworkFlavor for Direct {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Direct
    }

    async fn build(
        &self,
        d: &ResourceData,
        client: &VcdClient,
        _edge: Option<&EdgeGateway>,
        net: &mut OrgNetwork,
    ) -> Result<()> {
        let name = d.get_string("external_network");
        let ext = client
            .call(client.backend().get_external_network(&name))
            .await
            .with_context(|| format!("error retrieving external network {}", name))?;
        net.external_network = Some(ext.name);
        Ok(())
    }

    async fn observe(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        net: &OrgNetwork,
    ) -> Result<()> {
        let Some(name) = &net.external_network else {
            return Ok(());
        };
        d.set("external_network", name)?;
        let ext = match client.call(client.backend().get_external_network(name)).await {
            Ok(ext) => ext,
            Err(e) if is_not_found(&e) => {
                tracing::warn!("external network {} of network {} not found", name, net.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        d.set("external_network_gateway", &ext.gateway)?;
        d.set("external_network_netmask", &ext.netmask)?;
        d.set("external_network_dns1", &ext.dns1)?;
        d.set("external_network_dns2", &ext.dns2)?;
        d.set("external_network_dns_suffix", &ext.dns_suffix)?;
        Ok(())
    }
}
