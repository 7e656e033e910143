//! vcd_network_isolated

use super::network_common::{
    addressing_schema, base_schema, dhcp_pool_attribute, dhcp_pool_blocks, dhcp_pools,
    validate_dhcp_pools, NetworkFlavor, NetworkResource,
};
use super::ResourceDescriptor;
use crate::import::ImportLayout;
use crate::schema::hash::isolated_dhcp_pool_hash;
use crate::schema::{Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{EdgeGateway, NetworkKind, OrgNetwork};
use crate::vcd::VcdClient;
use anyhow::Result;
use async_trait::async_trait;

pub const NAME: &str = "vcd_network_isolated";

pub fn schema() -> Schema {
    base_schema()
        .merge(addressing_schema())
        .attr("dhcp_pool", dhcp_pool_attribute(isolated_dhcp_pool_hash))
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), NetworkResource(Isolated))
        .description("isolated org VDC network")
        .importable(ImportLayout::OrgVdcEntity, "network-name")
        .with_data_source(&["name", "org", "vdc"])
}

pub struct Isolated;

#[async_trait]
impl NetworkFlavor for Isolated {
    fn kind(&self) -> NetworkKind {
        NetworkKind::Isolated
    }

    async fn build(
        &self,
        d: &ResourceData,
        _client: &VcdClient,
        _edge: Option<&EdgeGateway>,
        net: &mut OrgNetwork,
    ) -> Result<()> {
        net.dhcp_pools = dhcp_pools(d);
        Ok(())
    }

    async fn observe(
        &self,
        d: &mut ResourceData,
        _client: &VcdClient,
        net: &OrgNetwork,
    ) -> Result<()> {
        d.set("dhcp_pool", dhcp_pool_blocks(&net.dhcp_pools))
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        validate_dhcp_pools(d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_is_well_formed() {
        assert!(schema().check().is_ok());
        assert!(descriptor().data_source.unwrap().check().is_ok());
    }
}
