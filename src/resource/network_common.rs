//! Org VDC networks
//!
//! Routed, isolated and direct networks share one lifecycle; the parts
//! that differ per kind sit behind [`NetworkFlavor`].

use super::metadata::{metadata_schema, read_metadata, update_metadata, validate_metadata};
use super::{gone, payload_changed, vdc_parent_schema, write_parents, Lifecycle};
use crate::error::is_not_found;
use crate::import::ImportPath;
use crate::schema::hash::static_ip_pool_hash;
use crate::schema::{block, validate, Attribute, Block, BlockExt, Diagnostics, Schema, SetHashFn};
use crate::state::ResourceData;
use crate::vcd::client::looks_like_id;
use crate::vcd::types::{
    DhcpPool, EdgeGateway, EntityKind, IpRange, MetadataTarget, NetworkKind, OrgNetwork, Vdc,
};
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const DEFAULT_NETMASK: &str = "255.255.255.0";
pub const DEFAULT_LEASE_TIME: i64 = 3600;
pub const MAX_LEASE_TIME: i64 = 7200;

// =========================================================================
// Schema pieces
// =========================================================================

/// Parents, name, description, sharing, href and metadata.
pub(super) fn base_schema() -> Schema {
    vdc_parent_schema()
        .attr("name", Attribute::string().required().force_new())
        .attr("description", Attribute::string().optional())
        .attr("shared", Attribute::bool().optional().default(false))
        .attr("href", Attribute::string().computed())
        .merge(metadata_schema())
}

fn ip_range_schema() -> Schema {
    Schema::new()
        .attr(
            "start_address",
            Attribute::string().required().validate(validate::is_ip_address()),
        )
        .attr(
            "end_address",
            Attribute::string().required().validate(validate::is_ip_address()),
        )
}

/// Gateway, netmask, DNS and the static IP pool.
pub(super) fn addressing_schema() -> Schema {
    Schema::new()
        .attr(
            "gateway",
            Attribute::string()
                .required()
                .force_new()
                .validate(validate::is_ip_address()),
        )
        .attr(
            "netmask",
            Attribute::string()
                .optional()
                .force_new()
                .default(DEFAULT_NETMASK)
                .validate(validate::is_ip_address()),
        )
        .attr("dns1", Attribute::string().optional().validate(validate::is_ip_address()))
        .attr("dns2", Attribute::string().optional().validate(validate::is_ip_address()))
        .attr("dns_suffix", Attribute::string().optional())
        .attr(
            "static_ip_pool",
            Attribute::set(ip_range_schema())
                .optional()
                .set_hash(static_ip_pool_hash)
                .description("range of IPs handed out statically"),
        )
}

/// DHCP pool set. The hasher differs between routed and isolated networks.
pub(super) fn dhcp_pool_attribute(hash: SetHashFn) -> Attribute {
    let pool = ip_range_schema()
        .attr(
            "default_lease_time",
            Attribute::int().optional().default(DEFAULT_LEASE_TIME),
        )
        .attr("max_lease_time", Attribute::int().optional().default(MAX_LEASE_TIME));
    Attribute::set(pool)
        .optional()
        .set_hash(hash)
        .description("range of IPs handed out by DHCP")
}

// =========================================================================
// Bag conversion
// =========================================================================

fn ranges(d: &ResourceData, key: &str) -> Vec<IpRange> {
    d.get_blocks(key)
        .iter()
        .map(|b| IpRange {
            start_address: b.str_field("start_address").to_string(),
            end_address: b.str_field("end_address").to_string(),
        })
        .collect()
}

pub(super) fn dhcp_pools(d: &ResourceData) -> Vec<DhcpPool> {
    d.get_blocks("dhcp_pool")
        .iter()
        .map(|b| DhcpPool {
            start_address: b.str_field("start_address").to_string(),
            end_address: b.str_field("end_address").to_string(),
            default_lease_time: b.int_field("default_lease_time"),
            max_lease_time: b.int_field("max_lease_time"),
        })
        .collect()
}

pub(super) fn dhcp_pool_blocks(pools: &[DhcpPool]) -> Vec<Block> {
    pools
        .iter()
        .map(|p| {
            let mut b = block([
                ("start_address", p.start_address.as_str()),
                ("end_address", p.end_address.as_str()),
            ]);
            b.insert("default_lease_time".into(), p.default_lease_time.into());
            b.insert("max_lease_time".into(), p.max_lease_time.into());
            b
        })
        .collect()
}

/// Lease times must be ordered within each pool.
pub(super) fn validate_dhcp_pools(d: &ResourceData) -> Diagnostics {
    let mut diags = Diagnostics::new();
    for pool in dhcp_pools(d) {
        if pool.default_lease_time > pool.max_lease_time {
            diags.push_error(format!(
                "dhcp_pool {}-{}: default_lease_time ({}) exceeds max_lease_time ({})",
                pool.start_address, pool.end_address, pool.default_lease_time, pool.max_lease_time
            ));
        }
    }
    diags
}

fn network_from_bag(d: &ResourceData, kind: NetworkKind) -> OrgNetwork {
    OrgNetwork {
        id: d.id().to_string(),
        name: d.get_string("name"),
        description: d.get_string("description"),
        kind,
        gateway: d.get_string("gateway"),
        netmask: d.get_string("netmask"),
        dns1: d.get_string("dns1"),
        dns2: d.get_string("dns2"),
        dns_suffix: d.get_string("dns_suffix"),
        shared: d.get_bool("shared"),
        static_ip_pools: ranges(d, "static_ip_pool"),
        ..Default::default()
    }
}

fn write_common(d: &mut ResourceData, net: &OrgNetwork) -> Result<()> {
    d.set_id(&net.id);
    d.set("name", &net.name)?;
    d.set("description", &net.description)?;
    d.set("shared", net.shared)?;
    d.set("href", &net.href)?;
    if d.schema().contains("gateway") {
        d.set("gateway", &net.gateway)?;
        d.set("netmask", &net.netmask)?;
        d.set("dns1", &net.dns1)?;
        d.set("dns2", &net.dns2)?;
        d.set("dns_suffix", &net.dns_suffix)?;
        let pools: Vec<Block> = net
            .static_ip_pools
            .iter()
            .map(|r| {
                block([
                    ("start_address", r.start_address.as_str()),
                    ("end_address", r.end_address.as_str()),
                ])
            })
            .collect();
        d.set("static_ip_pool", pools)?;
    }
    Ok(())
}

/// Look the network up by ID, or by name when the bag has no ID or a
/// legacy name-shaped one.
async fn find_network(
    client: &VcdClient,
    vdc: &Vdc,
    d: &ResourceData,
) -> Result<Option<OrgNetwork>> {
    let id = d.id();
    if looks_like_id(id) {
        return match client.call(client.backend().get_network(id)).await {
            Ok(net) => Ok(Some(net)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let name = if id.is_empty() { d.get_str("name") } else { id };
    let networks = client.call(client.backend().list_networks(&vdc.id)).await?;
    Ok(networks.into_iter().find(|n| n.name.eq_ignore_ascii_case(name)))
}

// =========================================================================
// Shared lifecycle
// =========================================================================

/// What one network kind adds to the shared lifecycle
#[async_trait]
pub(super) trait NetworkFlavor: Send + Sync {
    fn kind(&self) -> NetworkKind;

    /// Edge gateway the network hangs off, locked around mutations.
    async fn parent_edge(
        &self,
        _d: &ResourceData,
        _client: &VcdClient,
        _vdc: &Vdc,
    ) -> Result<Option<EdgeGateway>> {
        Ok(None)
    }

    /// Fill in the kind-specific part of the request.
    async fn build(
        &self,
        d: &ResourceData,
        client: &VcdClient,
        edge: Option<&EdgeGateway>,
        net: &mut OrgNetwork,
    ) -> Result<()>;

    /// Write the kind-specific observed attributes.
    async fn observe(
        &self,
        d: &mut ResourceData,
        client: &VcdClient,
        net: &OrgNetwork,
    ) -> Result<()>;

    fn validate(&self, _d: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }
}

pub(super) struct NetworkResource<F>(pub F);

impl<F: NetworkFlavor> NetworkResource<F> {
    async fn request(
        &self,
        d: &ResourceData,
        client: &VcdClient,
    ) -> Result<(Vdc, Option<EdgeGateway>, OrgNetwork)> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let edge = self.0.parent_edge(d, client, &vdc).await?;
        let mut net = network_from_bag(d, self.0.kind());
        net.vdc_id = vdc.id.clone();
        self.0.build(d, client, edge.as_ref(), &mut net).await?;
        Ok((vdc, edge, net))
    }
}

#[async_trait]
impl<F: NetworkFlavor> Lifecycle for NetworkResource<F> {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (vdc, edge, net) = self.request(d, client).await?;
        tracing::info!("Creating {} network {} in VDC {}", net.kind, net.name, vdc.name);

        let created = {
            let _guard = match &edge {
                Some(e) => Some(client.lock_edge_gateway(e).await?),
                None => None,
            };
            client
                .call(client.backend().create_network(&vdc.id, &net))
                .await
                .with_context(|| format!("error creating {} network {}", net.kind, net.name))?
        };
        d.set_id(&created.id);

        let target = MetadataTarget::new(EntityKind::Network, &created.id);
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let kind = self.0.kind();
        tracing::info!("Reading {} network {}", kind, d.get_str("name"));

        let Some(net) = find_network(client, &vdc, d).await? else {
            return gone(d, "network");
        };
        if net.kind != kind {
            bail!("network {} is a {} network, expected {}", net.name, net.kind, kind);
        }
        write_common(d, &net)?;
        self.0.observe(d, client, &net).await?;
        let target = MetadataTarget::new(EntityKind::Network, &net.id);
        read_metadata(d, client, &target).await
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        if payload_changed(d) {
            let (_, edge, net) = self.request(d, client).await?;
            tracing::info!("Updating {} network {}", net.kind, net.name);
            let _guard = match &edge {
                Some(e) => Some(client.lock_edge_gateway(e).await?),
                None => None,
            };
            client
                .call(client.backend().update_network(&net))
                .await
                .with_context(|| format!("error updating {} network {}", net.kind, net.name))?;
        }

        let target = MetadataTarget::new(EntityKind::Network, d.id());
        update_metadata(d, client, &target).await?;
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, vdc) = client.org_and_vdc(d).await?;
        let edge = self.0.parent_edge(d, client, &vdc).await?;
        let name = d.get_string("name");
        tracing::info!("Deleting {} network {}", self.0.kind(), name);

        let _guard = match &edge {
            Some(e) => Some(client.lock_edge_gateway(e).await?),
            None => None,
        };
        client
            .call(client.backend().delete_network(d.id()))
            .await
            .with_context(|| format!("error deleting network {}", name))?;
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
        let networks = client.call(client.backend().list_networks(&vdc.id)).await?;
        let kind = self.0.kind();
        let Some(net) = networks
            .into_iter()
            .find(|n| n.kind == kind && n.name.eq_ignore_ascii_case(&path.entity))
        else {
            bail!("no {} network named {:?} in VDC {}", kind, path.entity, vdc.name);
        };
        write_parents(d, path)?;
        d.set("name", &net.name)?;
        d.set_id(&net.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = validate_metadata(d);
        diags.extend(self.0.validate(d));
        diags
    }
}
