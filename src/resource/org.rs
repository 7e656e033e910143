//! vcd_org
//!
//! Organizations. Creating one disabled fails on some backend versions; the
//! create path recognizes that failure and explains the workaround.

use super::metadata::{metadata_schema, read_metadata, update_metadata, validate_metadata};
use super::{gone, Lifecycle, ResourceDescriptor};
use crate::error::DISABLED_ORG_FAILURE_SIGNATURE;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{block, validate, AttrValue, Attribute, BlockExt, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{AdminOrg, EntityKind, MetadataTarget, VAppLease, VAppTemplateLease};
use crate::vcd::VcdClient;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_org";

fn vapp_lease_schema() -> Schema {
    Schema::new()
        .attr(
            "max_runtime_lease_in_sec",
            Attribute::int().required().validate(validate::lease_seconds()),
        )
        .attr("power_off_on_runtime_lease_expiration", Attribute::bool().required())
        .attr(
            "maximum_storage_lease_in_sec",
            Attribute::int().required().validate(validate::lease_seconds()),
        )
        .attr("delete_on_storage_lease_expiration", Attribute::bool().required())
}

fn vapp_template_lease_schema() -> Schema {
    Schema::new()
        .attr(
            "maximum_storage_lease_in_sec",
            Attribute::int().required().validate(validate::lease_seconds()),
        )
        .attr("delete_on_storage_lease_expiration", Attribute::bool().required())
}

pub fn schema() -> Schema {
    Schema::new()
        .attr("name", Attribute::string().required().force_new())
        .attr("full_name", Attribute::string().required())
        .attr("description", Attribute::string().optional())
        .attr("is_enabled", Attribute::bool().optional().default(true))
        .attr(
            "deployed_vm_quota",
            Attribute::int()
                .optional()
                .default(0i64)
                .description("maximum number of VMs deployed at once; 0 means unlimited"),
        )
        .attr(
            "stored_vm_quota",
            Attribute::int()
                .optional()
                .default(0i64)
                .description("maximum number of VMs stored; 0 means unlimited"),
        )
        .attr("can_publish_catalogs", Attribute::bool().optional().default(true))
        .attr("delay_after_power_on_seconds", Attribute::int().optional().default(0i64))
        .attr("delete_force", Attribute::bool().optional().default(false))
        .attr("delete_recursive", Attribute::bool().optional().default(false))
        .attr(
            "vapp_lease",
            Attribute::list(vapp_lease_schema()).optional().computed().max_items(1),
        )
        .attr(
            "vapp_template_lease",
            Attribute::list(vapp_template_lease_schema())
                .optional()
                .computed()
                .max_items(1),
        )
        .attr("href", Attribute::string().computed())
        .merge(metadata_schema())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), OrgResource)
        .description("organization")
        .importable(ImportLayout::Entity, "org-name")
        .with_data_source(&["name"])
}

fn org_from_bag(d: &ResourceData) -> AdminOrg {
    let vapp_lease = d.get_single_block("vapp_lease").map(|b| VAppLease {
        max_runtime_lease_in_sec: b.int_field("max_runtime_lease_in_sec"),
        power_off_on_runtime_lease_expiration: b
            .bool_field("power_off_on_runtime_lease_expiration"),
        maximum_storage_lease_in_sec: b.int_field("maximum_storage_lease_in_sec"),
        delete_on_storage_lease_expiration: b.bool_field("delete_on_storage_lease_expiration"),
    });
    let vapp_template_lease = d.get_single_block("vapp_template_lease").map(|b| VAppTemplateLease {
        maximum_storage_lease_in_sec: b.int_field("maximum_storage_lease_in_sec"),
        delete_on_storage_lease_expiration: b.bool_field("delete_on_storage_lease_expiration"),
    });
    AdminOrg {
        id: d.id().to_string(),
        name: d.get_string("name"),
        full_name: d.get_string("full_name"),
        description: d.get_string("description"),
        is_enabled: d.get_bool("is_enabled"),
        deployed_vm_quota: d.get_int("deployed_vm_quota"),
        stored_vm_quota: d.get_int("stored_vm_quota"),
        can_publish_catalogs: d.get_bool("can_publish_catalogs"),
        delay_after_power_on_seconds: d.get_int("delay_after_power_on_seconds"),
        vapp_lease,
        vapp_template_lease,
        ..Default::default()
    }
}

fn write_org(d: &mut ResourceData, org: &AdminOrg) -> Result<()> {
    d.set_id(&org.id);
    d.set("name", &org.name)?;
    d.set("full_name", &org.full_name)?;
    d.set("description", &org.description)?;
    d.set("is_enabled", org.is_enabled)?;
    d.set("deployed_vm_quota", org.deployed_vm_quota)?;
    d.set("stored_vm_quota", org.stored_vm_quota)?;
    d.set("can_publish_catalogs", org.can_publish_catalogs)?;
    d.set("delay_after_power_on_seconds", org.delay_after_power_on_seconds)?;
    d.set("href", &org.href)?;

    let leases = match &org.vapp_lease {
        Some(l) => vec![block([
            ("max_runtime_lease_in_sec", AttrValue::from(l.max_runtime_lease_in_sec)),
            (
                "power_off_on_runtime_lease_expiration",
                AttrValue::from(l.power_off_on_runtime_lease_expiration),
            ),
            ("maximum_storage_lease_in_sec", AttrValue::from(l.maximum_storage_lease_in_sec)),
            (
                "delete_on_storage_lease_expiration",
                AttrValue::from(l.delete_on_storage_lease_expiration),
            ),
        ])],
        None => Vec::new(),
    };
    d.set("vapp_lease", leases)?;

    let template_leases = match &org.vapp_template_lease {
        Some(l) => vec![block([
            ("maximum_storage_lease_in_sec", AttrValue::from(l.maximum_storage_lease_in_sec)),
            (
                "delete_on_storage_lease_expiration",
                AttrValue::from(l.delete_on_storage_lease_expiration),
            ),
        ])],
        None => Vec::new(),
    };
    d.set("vapp_template_lease", template_leases)?;
    Ok(())
}

/// Explain the disabled-org failure when the backend reports it; other
/// errors pass through with operation context.
async fn explain_create_failure(
    client: &VcdClient,
    org: &AdminOrg,
    err: anyhow::Error,
) -> anyhow::Error {
    let raw = format!("{:#}", err);
    if org.is_enabled || !raw.contains(DISABLED_ORG_FAILURE_SIGNATURE) {
        return err.context(format!("error creating organization {}", org.name));
    }
    let version = client
        .backend_version()
        .await
        .unwrap_or_else(|_| "unknown".to_string());
    anyhow!(
        "error creating organization {}: backend version {} cannot create a disabled organization. \
         Workaround: create enabled, then disable via update (set is_enabled = false and apply again). \
         Backend error: {}",
        org.name,
        version,
        raw
    )
}

pub struct OrgResource;

#[async_trait]
impl Lifecycle for OrgResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let org = org_from_bag(d);
        tracing::info!("Creating organization {}", org.name);

        let created = match client.call(client.backend().create_org(&org)).await {
            Ok(created) => created,
            Err(e) => return Err(explain_create_failure(client, &org, e).await),
        };
        d.set_id(&created.id);

        let target = MetadataTarget::new(EntityKind::Org, &created.id);
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let key = if d.id().is_empty() {
            d.get_string("name")
        } else {
            d.id().to_string()
        };
        tracing::info!("Reading organization {}", key);

        let Some(org) = client.find_org(&key).await? else {
            return gone(d, "organization");
        };
        write_org(d, &org)?;
        let target = MetadataTarget::new(EntityKind::Org, &org.id);
        read_metadata(d, client, &target).await
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let org = org_from_bag(d);
        tracing::info!("Updating organization {}", org.name);

        let org_fields = [
            "full_name",
            "description",
            "is_enabled",
            "deployed_vm_quota",
            "stored_vm_quota",
            "can_publish_catalogs",
            "delay_after_power_on_seconds",
            "vapp_lease",
            "vapp_template_lease",
        ];
        if d.has_changes(&org_fields) {
            client
                .call(client.backend().update_org(&org))
                .await
                .with_context(|| format!("error updating organization {}", org.name))?;
        }

        let target = MetadataTarget::new(EntityKind::Org, d.id());
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting organization {}", name);
        client
            .call(client.backend().delete_org(
                d.id(),
                d.get_bool("delete_force"),
                d.get_bool("delete_recursive"),
            ))
            .await
            .with_context(|| format!("error deleting organization {}", name))?;
        d.clear_id();
        Ok(())
    }

    async fn import(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        path: &ImportPath,
    ) -> Result<()> {
        let org = client.get_org(&path.entity).await?;
        d.set_id(&org.id);
        d.set("name", &org.name)?;
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        validate_metadata(d)
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
    fn test_org_from_bag_reads_leases() {
        let d = ResourceData::from_json(
            Arc::new(schema()),
            &json!({
                "name": "org1",
                "full_name": "Org One",
                "vapp_lease": [{
                    "max_runtime_lease_in_sec": 3600,
                    "power_off_on_runtime_lease_expiration": true,
                    "maximum_storage_lease_in_sec": 0,
                    "delete_on_storage_lease_expiration": false
                }]
            }),
        )
        .unwrap();
        let org = org_from_bag(&d);
        assert!(org.is_enabled);
        assert!(org.can_publish_catalogs);
        assert_eq!(org.vapp_lease.unwrap().max_runtime_lease_in_sec, 3600);
        assert!(org.vapp_template_lease.is_none());
    }
}
