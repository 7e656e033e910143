//! vcd_vapp
//!
//! vApps. A freshly created vApp can take a moment to show up in queries,
//! so create polls for it (bounded) before the first read.

use super::metadata::{metadata_schema, read_metadata, update_metadata, validate_metadata};
use super::{
    gone, pick, vdc_parent_schema, write_parents, Lifecycle, ResourceDescriptor, Timeouts,
    LONG_TIMEOUT,
};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{
    vapp_status_text, EntityKind, MetadataTarget, VApp, Vdc, VAPP_STATUS_POWERED_ON,
};
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_vapp";

pub fn schema() -> Schema {
    vdc_parent_schema()
        .attr("name", Attribute::string().required().force_new())
        .attr("description", Attribute::string().optional())
        .attr(
            "power_on",
            Attribute::bool()
                .optional()
                .default(false)
                .description("power the vApp on after create and keep it on"),
        )
        .attr("guest_properties", Attribute::string_map().optional())
        .attr("status", Attribute::int().computed())
        .attr("status_text", Attribute::string().computed())
        .attr("href", Attribute::string().computed())
        .merge(metadata_schema())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), VAppResource)
        .description("vApp")
        .importable(ImportLayout::OrgVdcEntity, "vapp-name")
        .with_data_source(&["name", "org", "vdc"])
        .timeouts(Timeouts::uniform(LONG_TIMEOUT))
}

fn vapp_from_bag(d: &ResourceData) -> VApp {
    VApp {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        guest_properties: d.get_map("guest_properties"),
        ..Default::default()
    }
}

fn write_vapp(d: &mut ResourceData, vapp: &VApp) -> Result<()> {
    d.set_id(&vapp.id);
    d.set("name", &vapp.name)?;
    d.set("description", &vapp.description)?;
    d.set("guest_properties", vapp.guest_properties.clone())?;
    d.set("status", vapp.status)?;
    d.set("status_text", vapp_status_text(vapp.status))?;
    d.set("href", &vapp.href)?;
    if d.schema().get("power_on").is_some_and(|a| a.is_computed_only()) {
        d.set("power_on", vapp.status == VAPP_STATUS_POWERED_ON)?;
    }
    Ok(())
}

async fn find_vapp(client: &VcdClient, vdc: &Vdc, d: &ResourceData) -> Result<Option<VApp>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_vapp(d.id())).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let vapps = client.call(client.backend().list_vapps(&vdc.id)).await?;
    Ok(pick(vapps, "", d.get_str("name"), |v| v.id.as_str(), |v| v.name.as_str()))
}

async fn set_power(client: &VcdClient, vapp: &str, on: bool) -> Result<()> {
    tracing::info!("Powering vApp {} {}", vapp, if on { "on" } else { "off" });
    client
        .call(client.backend().set_vapp_power(vapp, on))
        .await
        .with_context(|| format!("error powering vApp {} {}", vapp, if on { "on" } else { "off" }))
}

pub struct VAppResource;

#[async_trait]
impl Lifecycle for VAppResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let vapp = vapp_from_bag(d);
        tracing::info!("Creating vApp {} in VDC {}", vapp.name, vdc.name);

        let created = client
            .call(client.backend().create_vapp(&vdc.id, &vapp))
            .await
            .with_context(|| format!("error creating vApp {}", vapp.name))?;
        d.set_id(&created.id);

        let id = created.id.clone();
        let visible = client
            .wait_until_visible("vApp", move || {
                let id = id.clone();
                async move {
                    match client.backend().get_vapp(&id).await {
                        Ok(v) => Ok(Some(v)),
                        Err(e) if is_not_found(&e) => Ok(None),
                        Err(e) => Err(e),
                    }
                }
            })
            .await?;
        if visible.is_none() {
            bail!(
                "vApp {} ({}) was created but is not visible yet; apply again to reconcile",
                vapp.name,
                created.id
            );
        }

        if d.get_bool("power_on") {
            set_power(client, &created.id, true).await?;
        }
        let target = MetadataTarget::new(EntityKind::VApp, &created.id);
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        tracing::info!("Reading vApp {} in VDC {}", d.get_str("name"), vdc.name);
        let Some(vapp) = find_vapp(client, &vdc, d).await? else {
            return gone(d, "vApp");
        };
        write_vapp(d, &vapp)?;
        let target = MetadataTarget::new(EntityKind::VApp, &vapp.id);
        read_metadata(d, client, &target).await
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let vapp = vapp_from_bag(d);
        tracing::info!("Updating vApp {}", vapp.name);
        if d.has_changes(&["description", "guest_properties"]) {
            client
                .call(client.backend().update_vapp(&vapp))
                .await
                .with_context(|| format!("error updating vApp {}", vapp.name))?;
        }
        if d.has_change("power_on") {
            set_power(client, &vapp.id, d.get_bool("power_on")).await?;
        }
        let target = MetadataTarget::new(EntityKind::VApp, d.id());
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting vApp {}", name);
        let vapp = match client.call(client.backend().get_vapp(d.id())).await {
            Ok(v) => v,
            Err(e) if is_not_found(&e) => {
                d.clear_id();
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if vapp.status == VAPP_STATUS_POWERED_ON {
            set_power(client, &vapp.id, false).await?;
        }
        client
            .call(client.backend().delete_vapp(&vapp.id))
            .await
            .with_context(|| format!("error deleting vApp {}", name))?;
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
        let vapps = client.call(client.backend().list_vapps(&vdc.id)).await?;
        let found = pick(vapps, "", &path.entity, |v| v.id.as_str(), |v| v.name.as_str());
        let Some(vapp) = found else {
            bail!("unable to find vApp {:?} in VDC {}", path.entity, vdc.name);
        };
        write_parents(d, path)?;
        d.set("name", &vapp.name)?;
        d.set("power_on", vapp.status == VAPP_STATUS_POWERED_ON)?;
        d.set_id(&vapp.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        validate_metadata(d)
    }
}
