//! vcd_nsxt_alb_settings
//!
//! Turns the advanced load balancer on or off for an NSX-T edge gateway.
//! Update-only singleton: delete deactivates.

use super::{
    edge_gateway_by_id, gone, vdc_parent_schema, write_parents, Lifecycle, ResourceDescriptor,
};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{AlbSettings, EdgeGateway};
use crate::vcd::VcdClient;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_nsxt_alb_settings";

pub fn schema() -> Schema {
    vdc_parent_schema()
        .attr("edge_gateway_id", Attribute::string().required().force_new())
        .attr("is_active", Attribute::bool().required())
        .attr(
            "service_network_specification",
            Attribute::string()
                .optional()
                .computed()
                .force_new()
                .description("CIDR of the service engine network, e.g. 192.168.255.1/25"),
        )
        .attr("supported_feature_set", Attribute::string().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), AlbSettingsResource)
        .description("NSX-T ALB activation on an edge gateway")
        .importable(ImportLayout::OrgVdcEntity, "edge-gateway-name")
}

async fn apply(client: &VcdClient, edge: &EdgeGateway, settings: &AlbSettings) -> Result<()> {
    let _guard = client.lock_edge_gateway(edge).await?;
    client
        .call(client.backend().update_alb_settings(&edge.id, settings))
        .await
        .with_context(|| format!("error updating ALB settings of edge gateway {}", edge.name))?;
    Ok(())
}

pub struct AlbSettingsResource;

#[async_trait]
impl Lifecycle for AlbSettingsResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;
        tracing::info!("Creating ALB settings of edge gateway {}", edge.name);
        d.set_id(&edge.id);
        self.update(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge_id = d.get_string("edge_gateway_id");
        tracing::info!("Reading ALB settings of edge gateway {}", edge_id);
        let settings = match client.call(client.backend().get_alb_settings(&edge_id)).await {
            Ok(s) => s,
            Err(e) if is_not_found(&e) => return gone(d, "edge gateway"),
            Err(e) => return Err(e),
        };
        d.set_id(&edge_id);
        d.set("is_active", settings.is_active)?;
        d.set("service_network_specification", &settings.service_network_specification)?;
        d.set("supported_feature_set", &settings.supported_feature_set)?;
        Ok(())
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;
        tracing::info!("Updating ALB settings of edge gateway {}", edge.name);
        let settings = AlbSettings {
            is_active: d.get_bool("is_active"),
            service_network_specification: d.get_string("service_network_specification"),
            ..Default::default()
        };
        apply(client, &edge, &settings).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;
        tracing::info!("Deactivating ALB on edge gateway {}", edge.name);
        apply(client, &edge, &AlbSettings::default()).await?;
        d.clear_id();
        Ok(())
    }

    async fn import(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        path: &ImportPath,
    ) -> Result<()> {
        let org = client.get_org(path.org()).await?;
        let vdc = client.get_vdc(&org, path.vdc()).await?;
        let edge = client.get_edge_gateway(&vdc, &path.entity).await?;
        write_parents(d, path)?;
        d.set("edge_gateway_id", &edge.id)?;
        d.set_id(&edge.id);
        Ok(())
    }
}
