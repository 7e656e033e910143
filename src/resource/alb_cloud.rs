//! vcd_nsxt_alb_cloud

use super::{gone, pick, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{Attribute, Schema};
use crate::state::ResourceData;
use crate::vcd::types::AlbCloud;
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_nsxt_alb_cloud";

pub fn schema() -> Schema {
    Schema::new()
        .attr("name", Attribute::string().required())
        .attr("description", Attribute::string().optional())
        .attr("controller_id", Attribute::string().required().force_new())
        .attr("importable_cloud_id", Attribute::string().required().force_new())
        .attr("network_pool_id", Attribute::string().required().force_new())
        .attr("network_pool_name", Attribute::string().computed())
        .attr("health_status", Attribute::string().computed())
        .attr("health_message", Attribute::string().computed())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), AlbCloudResource)
        .description("NSX-T ALB cloud")
        .importable(ImportLayout::Entity, "cloud-name")
        .with_data_source(&["name"])
}

fn cloud_from_bag(d: &ResourceData) -> AlbCloud {
    AlbCloud {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        controller_id: d.get_string("controller_id"),
        importable_cloud_id: d.get_string("importable_cloud_id"),
        network_pool_id: d.get_string("network_pool_id"),
        ..Default::default()
    }
}

fn write_cloud(d: &mut ResourceData, c: &AlbCloud) -> Result<()> {
    d.set_id(&c.id);
    d.set("name", &c.name)?;
    d.set("description", &c.description)?;
    d.set("controller_id", &c.controller_id)?;
    d.set("importable_cloud_id", &c.importable_cloud_id)?;
    d.set("network_pool_id", &c.network_pool_id)?;
    d.set("network_pool_name", &c.network_pool_name)?;
    d.set("health_status", &c.health_status)?;
    d.set("health_message", &c.health_message)?;
    Ok(())
}

async fn find_cloud(client: &VcdClient, d: &ResourceData) -> Result<Option<AlbCloud>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_alb_cloud(d.id())).await {
            Ok(c) => Ok(Some(c)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let all = client.call(client.backend().list_alb_clouds()).await?;
    Ok(pick(all, "", d.get_str("name"), |c| c.id.as_str(), |c| c.name.as_str()))
}

pub struct AlbCloudResource;

#[async_trait]
impl Lifecycle for AlbCloudResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let cloud = cloud_from_bag(d);
        tracing::info!("Creating ALB cloud {}", cloud.name);
        let created = client
            .call(client.backend().create_alb_cloud(&cloud))
            .await
            .with_context(|| format!("error creating ALB cloud {}", cloud.name))?;
        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        tracing::info!("Reading ALB cloud {}", d.get_str("name"));
        match find_cloud(client, d).await? {
            Some(c) => write_cloud(d, &c),
            None => gone(d, "ALB cloud"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let cloud = cloud_from_bag(d);
        tracing::info!("Updating ALB cloud {}", cloud.name);
        client
            .call(client.backend().update_alb_cloud(&cloud))
            .await
            .with_context(|| format!("error updating ALB cloud {}", cloud.name))?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting ALB cloud {}", name);
        client
            .call(client.backend().delete_alb_cloud(d.id()))
            .await
            .with_context(|| format!("error deleting ALB cloud {}", name))?;
        d.clear_id();
        Ok(())
    }

    async fn import(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        path: &ImportPath,
    ) -> Result<()> {
        let all = client.call(client.backend().list_alb_clouds()).await?;
        let Some(c) = pick(all, "", &path.entity, |c| c.id.as_str(), |c| c.name.as_str()) else {
            bail!("unable to find ALB cloud {:?}", path.entity);
        };
        d.set("name", &c.name)?;
        d.set_id(&c.id);
        Ok(())
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
