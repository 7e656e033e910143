//! vcd_nsxt_alb_controller
//!
//! Advanced load balancer controllers registered with the platform.
//! Provider-scoped: no organization or VDC parents.

use super::{gone, pick, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{validate, Attribute, Schema};
use crate::state::ResourceData;
use crate::vcd::types::AlbController;
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_nsxt_alb_controller";

pub const LICENSE_TYPES: &[&str] = &["BASIC", "ENTERPRISE"];

pub fn schema() -> Schema {
    Schema::new()
        .attr("name", Attribute::string().required())
        .attr("description", Attribute::string().optional())
        .attr("url", Attribute::string().required().description("controller URL, https://host"))
        .attr("username", Attribute::string().required())
        .attr("password", Attribute::string().required().sensitive())
        .attr(
            "license_type",
            Attribute::string()
                .optional()
                .computed()
                .validate(validate::string_in_slice(LICENSE_TYPES, false)),
        )
        .attr("version", Attribute::string().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), AlbControllerResource)
        .description("NSX-T ALB controller")
        .importable(ImportLayout::Entity, "controller-name")
        .with_data_source(&["name"])
}

fn controller_from_bag(d: &ResourceData) -> AlbController {
    AlbController {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        url: d.get_string("url"),
        username: d.get_string("username"),
        password: Some(d.get_string("password")).filter(|p| !p.is_empty()),
        license_type: d.get_string("license_type"),
        ..Default::default()
    }
}

fn write_controller(d: &mut ResourceData, c: &AlbController) -> Result<()> {
    d.set_id(&c.id);
    d.set("name", &c.name)?;
    d.set("description", &c.description)?;
    d.set("url", &c.url)?;
    d.set("username", &c.username)?;
    d.set("license_type", &c.license_type)?;
    d.set("version", &c.version)?;
    Ok(())
}

async fn find_controller(client: &VcdClient, d: &ResourceData) -> Result<Option<AlbController>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_alb_controller(d.id())).await {
            Ok(c) => Ok(Some(c)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let all = client.call(client.backend().list_alb_controllers()).await?;
    Ok(pick(all, "", d.get_str("name"), |c| c.id.as_str(), |c| c.name.as_str()))
}

pub struct AlbControllerResource;

#[async_trait]
impl Lifecycle for AlbControllerResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let controller = controller_from_bag(d);
        tracing::info!("Creating ALB controller {}", controller.name);
        let created = client
            .call(client.backend().create_alb_controller(&controller))
            .await
            .with_context(|| format!("error creating ALB controller {}", controller.name))?;
        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        tracing::info!("Reading ALB controller {}", d.get_str("name"));
        match find_controller(client, d).await? {
            Some(c) => write_controller(d, &c),
            None => gone(d, "ALB controller"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let controller = controller_from_bag(d);
        tracing::info!("Updating ALB controller {}", controller.name);
        client
            .call(client.backend().update_alb_controller(&controller))
            .await
            .with_context(|| format!("error updating ALB controller {}", controller.name))?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting ALB controller {}", name);
        client
            .call(client.backend().delete_alb_controller(d.id()))
            .await
            .with_context(|| format!("error deleting ALB controller {}", name))?;
        d.clear_id();
        Ok(())
    }

    async fn import(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        path: &ImportPath,
    ) -> Result<()> {
        let all = client.call(client.backend().list_alb_controllers()).await?;
        let Some(c) = pick(all, "", &path.entity, |c| c.id.as_str(), |c| c.name.as_str()) else {
            bail!("unable to find ALB controller {:?}", path.entity);
        };
        d.set("name", &c.name)?;
        d.set_id(&c.id);
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
        assert!(descriptor().data_source.unwrap().check().is_ok());
    }

    #[test]
    fn test_password_never_written_back() {
        let mut d = ResourceData::from_json(
            Arc::new(schema()),
            &json!({"name": "c1", "url": "https://alb", "username": "admin", "password": "secret"}),
        )
        .unwrap();
        let observed = AlbController {
            id: "urn:vcloud:loadBalancerController:1".into(),
            name: "c1".into(),
            version: "21.1.2".into(),
            ..Default::default()
        };
        write_controller(&mut d, &observed).unwrap();
        assert_eq!(d.get_str("password"), "secret");
        assert_eq!(d.get_str("version"), "21.1.2");
    }
}
