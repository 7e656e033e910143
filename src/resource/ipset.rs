//! vcd_ipset

use super::{gone, pick, vdc_parent_schema, write_parents, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::{Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{IpSet, Vdc};
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::net::IpAddr;

pub const NAME: &str = "vcd_ipset";

pub fn schema() -> Schema {
    vdc_parent_schema()
        .attr("name", Attribute::string().required())
        .attr("description", Attribute::string().optional())
        .attr("is_inheritance_allowed", Attribute::bool().optional().default(true))
        .attr(
            "ip_addresses",
            Attribute::string_set()
                .optional()
                .description("addresses, ranges (a-b) or CIDR blocks"),
        )
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), IpSetResource)
        .description("IP set")
        .importable(ImportLayout::OrgVdcEntity, "ipset-name")
        .with_data_source(&["name", "org", "vdc"])
}

/// Address, `a-b` range or `addr/prefix` block.
fn valid_ip_entry(entry: &str) -> bool {
    if let Some((start, end)) = entry.split_once('-') {
        return start.trim().parse::<IpAddr>().is_ok() && end.trim().parse::<IpAddr>().is_ok();
    }
    if let Some((addr, prefix)) = entry.split_once('/') {
        let Ok(addr) = addr.parse::<IpAddr>() else {
            return false;
        };
        let max = if addr.is_ipv4() { 32 } else { 128 };
        return prefix.parse::<u8>().is_ok_and(|p| p <= max);
    }
    entry.parse::<IpAddr>().is_ok()
}

fn ipset_from_bag(d: &ResourceData) -> IpSet {
    IpSet {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        inheritance_allowed: d.get_bool("is_inheritance_allowed"),
        ip_addresses: d.get_string_set("ip_addresses").into_iter().collect(),
    }
}

fn write_ipset(d: &mut ResourceData, ipset: &IpSet) -> Result<()> {
    d.set_id(&ipset.id);
    d.set("name", &ipset.name)?;
    d.set("description", &ipset.description)?;
    d.set("is_inheritance_allowed", ipset.inheritance_allowed)?;
    d.set(
        "ip_addresses",
        ipset.ip_addresses.iter().cloned().collect::<std::collections::BTreeSet<_>>(),
    )?;
    Ok(())
}

async fn find_ipset(client: &VcdClient, vdc: &Vdc, d: &ResourceData) -> Result<Option<IpSet>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_ipset(&vdc.id, d.id())).await {
            Ok(s) => Ok(Some(s)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let sets = client.call(client.backend().list_ipsets(&vdc.id)).await?;
    Ok(pick(sets, "", d.get_str("name"), |s| s.id.as_str(), |s| s.name.as_str()))
}

pub struct IpSetResource;

#[async_trait]
impl Lifecycle for IpSetResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let ipset = ipset_from_bag(d);
        tracing::info!("Creating IP set {} in VDC {}", ipset.name, vdc.name);
        let created = client
            .call(client.backend().create_ipset(&vdc.id, &ipset))
            .await
            .with_context(|| format!("error creating IP set {}", ipset.name))?;
        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        tracing::info!("Reading IP set {} in VDC {}", d.get_str("name"), vdc.name);
        match find_ipset(client, &vdc, d).await? {
            Some(ipset) => write_ipset(d, &ipset),
            None => gone(d, "IP set"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let ipset = ipset_from_bag(d);
        tracing::info!("Updating IP set {} in VDC {}", ipset.name, vdc.name);
        client
            .call(client.backend().update_ipset(&vdc.id, &ipset))
            .await
            .with_context(|| format!("error updating IP set {}", ipset.name))?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let name = d.get_string("name");
        tracing::info!("Deleting IP set {} in VDC {}", name, vdc.name);
        client
            .call(client.backend().delete_ipset(&vdc.id, d.id()))
            .await
            .with_context(|| format!("error deleting IP set {}", name))?;
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
        let sets = client.call(client.backend().list_ipsets(&vdc.id)).await?;
        let found = pick(sets, "", &path.entity, |s| s.id.as_str(), |s| s.name.as_str());
        let Some(ipset) = found else {
            bail!("unable to find IP set {:?} in VDC {}", path.entity, vdc.name);
        };
        write_parents(d, path)?;
        d.set("name", &ipset.name)?;
        d.set_id(&ipset.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        for entry in d.get_string_set("ip_addresses") {
            if !valid_ip_entry(&entry) {
                diags.push_error(format!(
                    "ip_addresses: {:?} is not an address, range or CIDR block",
                    entry
                ));
            }
        }
        diags
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

    #[test]
    fn test_valid_ip_entry() {
        assert!(valid_ip_entry("10.0.0.1"));
        assert!(valid_ip_entry("10.0.0.1-10.0.0.20"));
        assert!(valid_ip_entry("192.168.0.0/24"));
        assert!(valid_ip_entry("fe80::/64"));
        assert!(!valid_ip_entry("10.0.0.0/33"));
        assert!(!valid_ip_entry("example.com"));
        assert!(!valid_ip_entry("10.0.0.1-"));
    }
}
