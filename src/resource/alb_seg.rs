//! vcd_nsxt_alb_service_engine_group

use super::{gone, pick, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{validate, AttrValue, Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::AlbServiceEngineGroup;
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_nsxt_alb_service_engine_group";

pub const RESERVATION_MODELS: &[&str] = &["DEDICATED", "SHARED"];

pub fn schema() -> Schema {
    Schema::new()
        .attr("name", Attribute::string().required())
        .attr("description", Attribute::string().optional())
        .attr("alb_cloud_id", Attribute::string().required().force_new())
        .attr(
            "reservation_model",
            Attribute::string()
                .required()
                .force_new()
                .validate(validate::string_in_slice(RESERVATION_MODELS, false)),
        )
        .attr(
            "importable_service_engine_group_name",
            Attribute::string().required().force_new(),
        )
        .attr("max_virtual_services", Attribute::int().optional().computed())
        .attr("reserved_virtual_services", Attribute::int().optional().computed())
        .attr("deployed_virtual_services", Attribute::int().computed())
        .attr("ha_mode", Attribute::string().computed())
        .attr("overallocated", Attribute::bool().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), AlbSegResource)
        .description("NSX-T ALB service engine group")
        .importable(ImportLayout::Entity, "service-engine-group-name")
        .with_data_source(&["name"])
}

fn optional_int(d: &ResourceData, key: &str) -> Option<i64> {
    d.get(key).and_then(AttrValue::as_int)
}

fn seg_from_bag(d: &ResourceData) -> AlbServiceEngineGroup {
    AlbServiceEngineGroup {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        alb_cloud_id: d.get_string("alb_cloud_id"),
        reservation_model: d.get_string("reservation_model"),
        importable_service_engine_group_name: d.get_string("importable_service_engine_group_name"),
        max_virtual_services: optional_int(d, "max_virtual_services"),
        reserved_virtual_services: optional_int(d, "reserved_virtual_services"),
        ..Default::default()
    }
}

fn write_seg(d: &mut ResourceData, s: &AlbServiceEngineGroup) -> Result<()> {
    d.set_id(&s.id);
    d.set("name", &s.name)?;
    d.set("description", &s.description)?;
    d.set("alb_cloud_id", &s.alb_cloud_id)?;
    d.set("reservation_model", &s.reservation_model)?;
    d.set(
        "importable_service_engine_group_name",
        &s.importable_service_engine_group_name,
    )?;
    if let Some(max) = s.max_virtual_services {
        d.set("max_virtual_services", max)?;
    }
    if let Some(reserved) = s.reserved_virtual_services {
        d.set("reserved_virtual_services", reserved)?;
    }
    d.set("deployed_virtual_services", s.deployed_virtual_services)?;
    d.set("ha_mode", &s.ha_mode)?;
    d.set("overallocated", s.overallocated)?;
    Ok(())
}

async fn find_seg(client: &VcdClient, d: &ResourceData) -> Result<Option<AlbServiceEngineGroup>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_alb_service_engine_group(d.id())).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let all = client.call(client.backend().list_alb_service_engine_groups()).await?;
    Ok(pick(all, "", d.get_str("name"), |s| s.id.as_str(), |s| s.name.as_str()))
}

pub struct AlbSegResource;

#[async_trait]
impl Lifecycle for AlbSegResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let seg = seg_from_bag(d);
        tracing::info!("Creating ALB service engine group {}", seg.name);
        let created = client
            .call(client.backend().create_alb_service_engine_group(&seg))
            .await
            .with_context(|| format!("error creating ALB service engine group {}", seg.name))?;
        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        tracing::info!("Reading ALB service engine group {}", d.get_str("name"));
        match find_seg(client, d).await? {
            Some(s) => write_seg(d, &s),
            None => gone(d, "ALB service engine group"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let seg = seg_from_bag(d);
        tracing::info!("Updating ALB service engine group {}", seg.name);
        client
            .call(client.backend().update_alb_service_engine_group(&seg))
            .await
            .with_context(|| format!("error updating ALB service engine group {}", seg.name))?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting ALB service engine group {}", name);
        client
            .call(client.backend().delete_alb_service_engine_group(d.id()))
            .await
            .with_context(|| format!("error deleting ALB service engine group {}", name))?;
        d.clear_id();
        Ok(())
    }

    async fn import(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        path: &ImportPath,
    ) -> Result<()> {
        let all = client.call(client.backend().list_alb_service_engine_groups()).await?;
        let Some(s) = pick(all, "", &path.entity, |s| s.id.as_str(), |s| s.name.as_str()) else {
            bail!("unable to find ALB service engine group {:?}", path.entity);
        };
        d.set("name", &s.name)?;
        d.set_id(&s.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        if let (Some(max), Some(reserved)) = (
            optional_int(d, "max_virtual_services"),
            optional_int(d, "reserved_virtual_services"),
        ) {
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
