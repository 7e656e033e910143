//! vcd_nsxt_alb_edgegateway_service_engine_group
//!
//! Assigns a service engine group to an edge gateway. Assignments are
//! written under the edge gateway lock.

use super::{
    edge_gateway_by_id, gone, pick, vdc_parent_schema, write_vdc_parents, Lifecycle,
    ResourceDescriptor,
};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{AttrValue, Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::AlbSegAssignment;
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_nsxt_alb_edgegateway_service_engine_group";

pub fn schema() -> Schema {
    vdc_parent_schema()
        .attr("edge_gateway_id", Attribute::string().required().force_new())
        .attr("service_engine_group_id", Attribute::string().required().force_new())
        .attr("service_engine_group_name", Attribute::string().computed())
        .attr("max_virtual_services", Attribute::int().optional())
        .attr("reserved_virtual_services", Attribute::int().optional())
        .attr("deployed_virtual_services", Attribute::int().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), AlbEdgeSegResource)
        .description("NSX-T ALB service engine group assignment to an edge gateway")
        .importable(ImportLayout::OrgVdcEdgeEntity, "service-engine-group-name")
        .with_data_source(&["edge_gateway_id", "service_engine_group_id"])
}

fn assignment_from_bag(d: &ResourceData) -> AlbSegAssignment {
    AlbSegAssignment {
        id: d.id().to_string(),
        edge_gateway_id: d.get_string("edge_gateway_id"),
        service_engine_group_id: d.get_string("service_engine_group_id"),
        max_virtual_services: d.get("max_virtual_services").and_then(AttrValue::as_int),
        reserved_virtual_services: d.get("reserved_virtual_services").and_then(AttrValue::as_int),
        ..Default::default()
    }
}

fn write_assignment(d: &mut ResourceData, a: &AlbSegAssignment) -> Result<()> {
    d.set_id(&a.id);
    d.set("edge_gateway_id", &a.edge_gateway_id)?;
    d.set("service_engine_group_id", &a.service_engine_group_id)?;
    d.set("service_engine_group_name", &a.service_engine_group_name)?;
    if let Some(max) = a.max_virtual_services {
        d.set("max_virtual_services", max)?;
    }
    if let Some(reserved) = a.reserved_virtual_services {
        d.set("reserved_virtual_services", reserved)?;
    }
    d.set("deployed_virtual_services", a.deployed_virtual_services)?;
    Ok(())
}

pub struct AlbEdgeSegResource;

#[async_trait]
impl Lifecycle for AlbEdgeSegResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;
        let assignment = assignment_from_bag(d);

        let guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!(
            "Assigning service engine group {} to edge gateway {}",
            assignment.service_engine_group_id,
            edge.name
        );
        let created = client
            .call(client.backend().create_alb_seg_assignment(&assignment))
            .await
            .with_context(|| {
                format!(
                    "error assigning service engine group to edge gateway {}",
                    edge.name
                )
            })?;
        drop(guard);

        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        tracing::info!("Reading service engine group assignment {}", d.id());
        let assignment = if d.id().is_empty() {
            let all = client
                .call(client.backend().list_alb_seg_assignments(d.get_str("edge_gateway_id")))
                .await?;
            let seg_id = d.get_string("service_engine_group_id");
            all.into_iter().find(|a| a.service_engine_group_id == seg_id)
        } else {
            match client.call(client.backend().get_alb_seg_assignment(d.id())).await {
                Ok(a) => Some(a),
                Err(e) if is_not_found(&e) => None,
                Err(e) => return Err(e),
            }
        };
        match assignment {
            Some(a) => write_assignment(d, &a),
            None => gone(d, "service engine group assignment"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;
        let assignment = assignment_from_bag(d);

        let guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!("Updating service engine group assignment {}", assignment.id);
        client
            .call(client.backend().update_alb_seg_assignment(&assignment))
            .await
            .with_context(|| {
                format!("error updating service engine group assignment {}", assignment.id)
            })?;
        drop(guard);

        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let edge = edge_gateway_by_id(client, d.get_str("edge_gateway_id")).await?;

        let _guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!("Removing service engine group assignment {}", d.id());
        client
            .call(client.backend().delete_alb_seg_assignment(d.id()))
            .await
            .with_context(|| format!("error removing service engine group assignment {}", d.id()))?;
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
        let edge = client.get_edge_gateway(&vdc, path.edge_gateway()).await?;
        let all = client.call(client.backend().list_alb_seg_assignments(&edge.id)).await?;
        let Some(a) = pick(
            all,
            "",
            &path.entity,
            |a| a.id.as_str(),
            |a| a.service_engine_group_name.as_str(),
        ) else {
            bail!(
                "service engine group {:?} is not assigned to edge gateway {}",
                path.entity,
                edge.name
            );
        };
        // the edge gateway is referenced by ID only
        write_vdc_parents(d, path)?;
        d.set("edge_gateway_id", &edge.id)?;
        d.set("service_engine_group_id", &a.service_engine_group_id)?;
        d.set_id(&a.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let max = d.get("max_virtual_services").and_then(AttrValue::as_int);
        let reserved = d.get("reserved_virtual_services").and_then(AttrValue::as_int);
        if let (Some(max), Some(reserved)) = (max, reserved) {
            if reserved > max {
                diags.push_error(format!(
                    "reserved_virtual_services ({}) cannot exceed max_virtual_services ({})",
                    reserved, max
                ));
            }
        }
        diags
    }
}
