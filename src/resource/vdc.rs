//! vcd_org_vdc
//!
//! Virtual data centers. Compute capacity is a nested single-item list;
//! storage profiles are a set keyed by every field so a limit change
//! shows up in the plan.

use super::metadata::{metadata_schema, read_metadata, update_metadata, validate_metadata};
use super::{gone, Lifecycle, ResourceDescriptor, Timeouts, LONG_TIMEOUT};
use crate::import::{ImportLayout, ImportPath};
use crate::schema::hash::storage_profile_hash;
use crate::schema::{block, validate, AttrValue, Attribute, Block, BlockExt, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{
    CapacityValue, ComputeCapacity, EntityKind, MetadataTarget, Vdc, VdcStorageProfile,
};
use crate::vcd::VcdClient;
use anyhow::{Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_org_vdc";

pub const ALLOCATION_MODELS: &[&str] =
    &["AllocationVApp", "AllocationPool", "ReservationPool", "Flex"];

fn capacity_schema() -> Schema {
    Schema::new()
        .attr("allocated", Attribute::int().optional().computed())
        .attr("limit", Attribute::int().optional().computed())
        .attr("reserved", Attribute::int().computed())
        .attr("used", Attribute::int().computed())
}

fn compute_capacity_schema() -> Schema {
    Schema::new()
        .attr("cpu", Attribute::list(capacity_schema()).required().max_items(1))
        .attr("memory", Attribute::list(capacity_schema()).required().max_items(1))
}

fn storage_profile_schema() -> Schema {
    Schema::new()
        .attr("name", Attribute::string().required())
        .attr(
            "limit",
            Attribute::int()
                .required()
                .description("storage limit in MB, 0 means unlimited"),
        )
        .attr("default", Attribute::bool().required())
        .attr("enabled", Attribute::bool().optional().default(true))
}

pub fn schema() -> Schema {
    Schema::new()
        .attr(
            "org",
            Attribute::string()
                .optional()
                .force_new()
                .description("organization; defaults to the provider org"),
        )
        .attr("name", Attribute::string().required().force_new())
        .attr("description", Attribute::string().optional())
        .attr(
            "allocation_model",
            Attribute::string()
                .required()
                .force_new()
                .validate(validate::string_in_slice(ALLOCATION_MODELS, false)),
        )
        .attr("provider_vdc_name", Attribute::string().required().force_new())
        .attr("network_pool_name", Attribute::string().optional().force_new())
        .attr("network_quota", Attribute::int().optional().default(0i64))
        .attr("vm_quota", Attribute::int().optional().default(0i64))
        .attr("enabled", Attribute::bool().optional().default(true))
        .attr(
            "compute_capacity",
            Attribute::list(compute_capacity_schema()).required().max_items(1),
        )
        .attr(
            "storage_profile",
            Attribute::set(storage_profile_schema())
                .required()
                .set_hash(storage_profile_hash),
        )
        .attr(
            "cpu_guaranteed",
            Attribute::float()
                .optional()
                .computed()
                .validate(validate::float_between(0.0, 1.0)),
        )
        .attr(
            "memory_guaranteed",
            Attribute::float()
                .optional()
                .computed()
                .validate(validate::float_between(0.0, 1.0)),
        )
        .attr("delete_force", Attribute::bool().optional().default(false))
        .attr("delete_recursive", Attribute::bool().optional().default(false))
        .attr("href", Attribute::string().computed())
        .merge(metadata_schema())
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), VdcResource)
        .description("virtual data center")
        .importable(ImportLayout::OrgEntity, "vdc-name")
        .with_data_source(&["name", "org"])
        .timeouts(Timeouts::uniform(LONG_TIMEOUT))
}

fn capacity_from(b: Option<&AttrValue>) -> CapacityValue {
    let first = match b {
        Some(AttrValue::List(l)) => l.first(),
        _ => None,
    };
    first
        .map(|c| CapacityValue {
            allocated: c.int_field("allocated"),
            limit: c.int_field("limit"),
            ..Default::default()
        })
        .unwrap_or_default()
}

fn capacity_block(c: &CapacityValue) -> Vec<Block> {
    vec![block([
        ("allocated", c.allocated),
        ("limit", c.limit),
        ("reserved", c.reserved),
        ("used", c.used),
    ])]
}

fn vdc_from_bag(d: &ResourceData) -> Vdc {
    let compute_capacity = d
        .get_single_block("compute_capacity")
        .map(|cc| ComputeCapacity {
            cpu: capacity_from(cc.get("cpu")),
            memory: capacity_from(cc.get("memory")),
        })
        .unwrap_or_default();
    let storage_profiles = d
        .get_blocks("storage_profile")
        .iter()
        .map(|p| VdcStorageProfile {
            name: p.str_field("name").to_string(),
            limit: p.int_field("limit"),
            default: p.bool_field("default"),
            enabled: p.bool_field("enabled"),
        })
        .collect();
    Vdc {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        allocation_model: d.get_string("allocation_model"),
        provider_vdc_name: d.get_string("provider_vdc_name"),
        network_pool_name: d.get_string("network_pool_name"),
        network_quota: d.get_int("network_quota"),
        vm_quota: d.get_int("vm_quota"),
        is_enabled: d.get_bool("enabled"),
        cpu_guaranteed: d.get("cpu_guaranteed").and_then(AttrValue::as_float),
        memory_guaranteed: d.get("memory_guaranteed").and_then(AttrValue::as_float),
        compute_capacity,
        storage_profiles,
        ..Default::default()
    }
}

fn write_vdc(d: &mut ResourceData, vdc: &Vdc) -> Result<()> {
    d.set_id(&vdc.id);
    d.set("name", &vdc.name)?;
    d.set("description", &vdc.description)?;
    d.set("allocation_model", &vdc.allocation_model)?;
    d.set("provider_vdc_name", &vdc.provider_vdc_name)?;
    d.set("network_pool_name", &vdc.network_pool_name)?;
    d.set("network_quota", vdc.network_quota)?;
    d.set("vm_quota", vdc.vm_quota)?;
    d.set("enabled", vdc.is_enabled)?;
    d.set("href", &vdc.href)?;
    if let Some(v) = vdc.cpu_guaranteed {
        d.set("cpu_guaranteed", v)?;
    }
    if let Some(v) = vdc.memory_guaranteed {
        d.set("memory_guaranteed", v)?;
    }

    let cc = block([
        ("cpu", capacity_block(&vdc.compute_capacity.cpu)),
        ("memory", capacity_block(&vdc.compute_capacity.memory)),
    ]);
    d.set("compute_capacity", vec![cc])?;

    let profiles: Vec<Block> = vdc
        .storage_profiles
        .iter()
        .map(|p| {
            block([
                ("name", AttrValue::from(&p.name)),
                ("limit", AttrValue::from(p.limit)),
                ("default", AttrValue::from(p.default)),
                ("enabled", AttrValue::from(p.enabled)),
            ])
        })
        .collect();
    d.set("storage_profile", profiles)?;
    Ok(())
}

pub struct VdcResource;

#[async_trait]
impl Lifecycle for VdcResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let org = client.org_from(d).await?;
        let vdc = vdc_from_bag(d);
        tracing::info!("Creating VDC {} in organization {}", vdc.name, org.name);

        let created = client
            .call(client.backend().create_vdc(&org.id, &vdc))
            .await
            .with_context(|| format!("error creating VDC {}", vdc.name))?;
        d.set_id(&created.id);

        let target = MetadataTarget::new(EntityKind::Vdc, &created.id);
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let org = client.org_from(d).await?;
        let key = if d.id().is_empty() {
            d.get_string("name")
        } else {
            d.id().to_string()
        };
        tracing::info!("Reading VDC {} in organization {}", key, org.name);

        let Some(vdc) = client.find_vdc(&org, &key).await? else {
            return gone(d, "VDC");
        };
        write_vdc(d, &vdc)?;
        let target = MetadataTarget::new(EntityKind::Vdc, &vdc.id);
        read_metadata(d, client, &target).await
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let vdc = vdc_from_bag(d);
        tracing::info!("Updating VDC {}", vdc.name);

        let fields = [
            "description",
            "network_quota",
            "vm_quota",
            "enabled",
            "compute_capacity",
            "storage_profile",
            "cpu_guaranteed",
            "memory_guaranteed",
        ];
        if d.has_changes(&fields) {
            client
                .call(client.backend().update_vdc(&vdc))
                .await
                .with_context(|| format!("error updating VDC {}", vdc.name))?;
        }

        let target = MetadataTarget::new(EntityKind::Vdc, d.id());
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let name = d.get_string("name");
        tracing::info!("Deleting VDC {}", name);
        client
            .call(client.backend().delete_vdc(
                d.id(),
                d.get_bool("delete_force"),
                d.get_bool("delete_recursive"),
            ))
            .await
            .with_context(|| format!("error deleting VDC {}", name))?;
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
        let vdc = client.get_vdc(&org, &path.entity).await?;
        d.set("org", &org.name)?;
        d.set("name", &vdc.name)?;
        d.set_id(&vdc.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = validate_metadata(d);
        let profiles = d.get_blocks("storage_profile");
        let defaults = profiles.iter().filter(|p| p.bool_field("default")).count();
        if !profiles.is_empty() && defaults != 1 {
            diags.push_error(format!(
                "exactly one storage_profile must be the default, found {}",
                defaults
            ));
        }
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn config() -> serde_json::Value {
        json!({
            "name": "vdc1",
            "allocation_model": "Flex",
            "provider_vdc_name": "pvdc",
            "compute_capacity": [{
                "cpu": [{"allocated": 2048, "limit": 4096}],
                "memory": [{"allocated": 1024}]
            }],
            "storage_profile": [
                {"name": "gold", "limit": 10240, "default": true},
                {"name": "silver", "limit": 0, "default": false}
            ]
        })
    }

    #[test]
    fn test_schema_is_well_formed() {
        assert!(schema().check().is_ok());
    }

    #[test]
    fn test_vdc_from_bag() {
        let d = ResourceData::from_json(Arc::new(schema()), &config()).unwrap();
        let vdc = vdc_from_bag(&d);
        assert_eq!(vdc.compute_capacity.cpu.limit, 4096);
        assert_eq!(vdc.compute_capacity.memory.allocated, 1024);
        assert_eq!(vdc.storage_profiles.len(), 2);
        assert!(vdc.storage_profiles.iter().all(|p| p.enabled));
        assert!(vdc.cpu_guaranteed.is_none());
    }

    #[test]
    fn test_exactly_one_default_profile() {
        let d = ResourceData::from_json(Arc::new(schema()), &config()).unwrap();
        assert!(!VdcResource.validate(&d).has_errors());

        let mut c = config();
        c["storage_profile"][1]["default"] = json!(true);
        let d = ResourceData::from_json(Arc::new(schema()), &c).unwrap();
        assert!(VdcResource.validate(&d).has_errors());
    }
}
