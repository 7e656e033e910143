//! vcd_edgegateway_settings
//!
//! Global load balancer and firewall switches of an edge gateway. The
//! settings always exist, so this is an update-only singleton: create
//! applies the configuration, delete restores the defaults.

use super::{gone, vdc_parent_schema, write_parents, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{validate, Attribute, Schema};
use crate::state::ResourceData;
use crate::vcd::client::looks_like_id;
use crate::vcd::types::{EdgeGateway, EdgeSettings};
use crate::vcd::VcdClient;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_edgegateway_settings";

pub const LB_LOG_LEVELS: &[&str] = &[
    "emergency", "alert", "critical", "error", "warning", "notice", "info", "debug",
];
pub const FW_ACTIONS: &[&str] = &["accept", "deny"];

pub fn schema() -> Schema {
    vdc_parent_schema()
        .attr(
            "edge_gateway",
            Attribute::string()
                .required()
                .force_new()
                .description("name of the edge gateway"),
        )
        .attr("edge_gateway_id", Attribute::string().computed())
        .attr("lb_enabled", Attribute::bool().optional().default(false))
        .attr("lb_acceleration_enabled", Attribute::bool().optional().default(false))
        .attr("lb_logging_enabled", Attribute::bool().optional().default(false))
        .attr(
            "lb_loglevel",
            Attribute::string()
                .optional()
                .default("info")
                .validate(validate::string_in_slice(LB_LOG_LEVELS, false)),
        )
        .attr(
            "fw_enabled",
            Attribute::bool().optional().default(true).validate(validate::noop_value_warning(
                "false",
                "with the firewall disabled all traffic passes the edge gateway",
            )),
        )
        .attr("fw_default_rule_logging_enabled", Attribute::bool().optional().default(false))
        .attr(
            "fw_default_rule_action",
            Attribute::string()
                .optional()
                .default("deny")
                .validate(validate::string_in_slice(FW_ACTIONS, false)),
        )
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), EdgeSettingsResource)
        .description("edge gateway load balancer and firewall settings")
        .importable(ImportLayout::OrgVdcEntity, "edge-gateway-name")
}

fn settings_from_bag(d: &ResourceData) -> EdgeSettings {
    EdgeSettings {
        lb_enabled: d.get_bool("lb_enabled"),
        lb_acceleration_enabled: d.get_bool("lb_acceleration_enabled"),
        lb_logging_enabled: d.get_bool("lb_logging_enabled"),
        lb_loglevel: d.get_string("lb_loglevel"),
        fw_enabled: d.get_bool("fw_enabled"),
        fw_default_rule_logging_enabled: d.get_bool("fw_default_rule_logging_enabled"),
        fw_default_rule_action: d.get_string("fw_default_rule_action"),
    }
}

fn write_settings(d: &mut ResourceData, edge: &EdgeGateway) -> Result<()> {
    let s = &edge.settings;
    d.set_id(&edge.id);
    d.set("edge_gateway", &edge.name)?;
    d.set("edge_gateway_id", &edge.id)?;
    d.set("lb_enabled", s.lb_enabled)?;
    d.set("lb_acceleration_enabled", s.lb_acceleration_enabled)?;
    d.set("lb_logging_enabled", s.lb_logging_enabled)?;
    d.set("lb_loglevel", &s.lb_loglevel)?;
    d.set("fw_enabled", s.fw_enabled)?;
    d.set("fw_default_rule_logging_enabled", s.fw_default_rule_logging_enabled)?;
    d.set("fw_default_rule_action", &s.fw_default_rule_action)?;
    Ok(())
}

async fn apply(client: &VcdClient, edge: &EdgeGateway, settings: &EdgeSettings) -> Result<()> {
    let _guard = client.lock_edge_gateway(edge).await?;
    client
        .call(client.backend().update_edge_settings(&edge.id, settings))
        .await
        .with_context(|| format!("error updating settings of edge gateway {}", edge.name))?;
    Ok(())
}

pub struct EdgeSettingsResource;

#[async_trait]
impl Lifecycle for EdgeSettingsResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        tracing::info!("Creating settings of edge gateway {}", edge.name);
        d.set_id(&edge.id);
        self.update(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        tracing::info!("Reading settings of edge gateway {}", d.get_str("edge_gateway"));
        let edge = if looks_like_id(d.id()) {
            match client.call(client.backend().get_edge_gateway(d.id())).await {
                Ok(edge) => edge,
                Err(e) if is_not_found(&e) => return gone(d, "edge gateway"),
                Err(e) => return Err(e),
            }
        } else {
            client.edge_gateway_from(d, "edge_gateway").await?.2
        };
        write_settings(d, &edge)
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        tracing::info!("Updating settings of edge gateway {}", edge.name);
        apply(client, &edge, &settings_from_bag(d)).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        tracing::info!("Restoring default settings of edge gateway {}", edge.name);
        apply(client, &edge, &EdgeSettings::default()).await?;
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
        d.set("edge_gateway", &edge.name)?;
        d.set_id(&edge.id);
        Ok(())
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
    }

    #[test]
    fn test_unset_attributes_mean_defaults() {
        let config = json!({"edge_gateway": "edge1"});
        let d = ResourceData::from_json(Arc::new(schema()), &config).unwrap();
        assert_eq!(settings_from_bag(&d), EdgeSettings::default());
    }
}
