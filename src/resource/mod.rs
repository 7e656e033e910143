//! Resource lifecycle layer
//!
//! One module per resource kind. Each exposes a [`ResourceDescriptor`]: the
//! declared [`Schema`], the [`Lifecycle`] dispatchers, the import layout and
//! the timeouts. The [`registry`] collects them once and checks every schema
//! at startup.
//!
//! # Architecture
//!
//! - [`registry`] - builds and caches the descriptors
//! - [`metadata`] - shared metadata read/write for entities that carry it
//! - one module per kind (`org`, `vdc`, `network_*`, `nat`, ...)
//!
//! Dispatchers take the state bag and the session handle. Read after every
//! mutation reconciles the bag with the backend; a read that finds nothing
//! clears the identifier instead of failing.

pub mod metadata;
pub mod registry;

mod alb_cloud;
mod alb_controller;
mod alb_edge_seg;
mod alb_seg;
mod alb_settings;
mod edgegateway_settings;
mod ipset;
mod lb_app_profile;
mod nat;
mod network_common;
mod network_direct;
mod network_isolated;
mod network_routed;
mod org;
mod vapp;
mod vdc;

pub use registry::*;

use crate::error::ERR_EDGE_NOT_FOUND;
use crate::import::{parse_import_id, ImportLayout, ImportPath};
use crate::schema::{Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::EdgeGateway;
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Create/read/update/delete/import callbacks of one resource kind
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()>;

    /// Reconcile the bag with the backend. With an empty identifier the
    /// entity is looked up by name (data sources, legacy state).
    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()>;

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()>;

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()>;

    /// Resolve a parsed import path into parent references and an identifier.
    async fn import(
        &self,
        _d: &mut ResourceData,
        _client: &VcdClient,
        _path: &ImportPath,
    ) -> Result<()> {
        bail!("this resource does not support import")
    }

    /// Checks that span several attributes.
    fn validate(&self, _d: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }
}

/// Per-operation timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub create: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn uniform(d: Duration) -> Self {
        Self {
            create: d,
            update: d,
            delete: d,
        }
    }
}

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
pub const LONG_TIMEOUT: Duration = Duration::from_secs(20 * 60);

impl Default for Timeouts {
    fn default() -> Self {
        Self::uniform(DEFAULT_TIMEOUT)
    }
}

/// Static contract of a resource kind
#[derive(Clone)]
pub struct ResourceDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: Arc<Schema>,
    /// Data-source flavour of the schema, if the kind has one
    pub data_source: Option<Arc<Schema>>,
    pub lifecycle: Arc<dyn Lifecycle>,
    pub import_layout: Option<ImportLayout>,
    /// Name of the last import segment in error messages
    pub import_entity: &'static str,
    pub timeouts: Timeouts,
}

impl ResourceDescriptor {
    pub fn new(name: &'static str, schema: Schema, lifecycle: impl Lifecycle + 'static) -> Self {
        Self {
            name,
            description: "",
            schema: Arc::new(schema),
            data_source: None,
            lifecycle: Arc::new(lifecycle),
            import_layout: None,
            import_entity: "",
            timeouts: Timeouts::default(),
        }
    }

    pub fn description(mut self, text: &'static str) -> Self {
        self.description = text;
        self
    }

    pub fn importable(mut self, layout: ImportLayout, entity: &'static str) -> Self {
        self.import_layout = Some(layout);
        self.import_entity = entity;
        self
    }

    /// Also register a data source; `lookup` attributes keep their flags.
    pub fn with_data_source(mut self, lookup: &[&str]) -> Self {
        self.data_source = Some(Arc::new(self.schema.as_data_source(lookup)));
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Parse an import identifier with this kind's layout.
    pub fn parse_import(&self, id: &str, separator: &str) -> Result<ImportPath> {
        let Some(layout) = self.import_layout else {
            bail!("{} does not support import", self.name);
        };
        parse_import_id(id, separator, layout, self.import_entity)
    }
}

/// Data-source read: look the entity up by its lookup attributes and fail
/// if nothing matches.
pub async fn read_data_source(
    descriptor: &ResourceDescriptor,
    d: &mut ResourceData,
    client: &VcdClient,
) -> Result<()> {
    d.clear_id();
    descriptor.lifecycle.read(d, client).await?;
    if d.id().is_empty() {
        let name = d.get_str("name");
        if name.is_empty() {
            bail!("{}: no matching entity found", descriptor.name);
        }
        bail!("{}: no entity named {:?} found", descriptor.name, name);
    }
    Ok(())
}

// =========================================================================
// Shared helpers for the dispatchers
// =========================================================================

/// `org` and `vdc` parent references.
pub(crate) fn vdc_parent_schema() -> Schema {
    Schema::new()
        .attr(
            "org",
            Attribute::string()
                .optional()
                .force_new()
                .description("organization; defaults to the provider org"),
        )
        .attr(
            "vdc",
            Attribute::string()
                .optional()
                .force_new()
                .description("VDC; defaults to the provider VDC"),
        )
}

/// `org`, `vdc` and `edge_gateway` parent references.
pub(crate) fn edge_parent_schema() -> Schema {
    vdc_parent_schema().attr(
        "edge_gateway",
        Attribute::string()
            .required()
            .force_new()
            .description("name of the parent edge gateway"),
    )
}

/// Write the `org` and `vdc` segments of an import path into the bag.
pub(crate) fn write_vdc_parents(d: &mut ResourceData, path: &ImportPath) -> Result<()> {
    if let Some(org) = &path.org {
        d.set("org", org)?;
    }
    if let Some(vdc) = &path.vdc {
        d.set("vdc", vdc)?;
    }
    Ok(())
}

/// Write the parent segments of an import path into the bag.
pub(crate) fn write_parents(d: &mut ResourceData, path: &ImportPath) -> Result<()> {
    write_vdc_parents(d, path)?;
    if let Some(edge) = &path.edge_gateway {
        d.set("edge_gateway", edge)?;
    }
    Ok(())
}

/// The entity vanished out of band: clear the identifier so the host
/// plans a re-create.
pub(crate) fn gone(d: &mut ResourceData, what: &str) -> Result<()> {
    if !d.id().is_empty() {
        tracing::warn!("{} {} not found, removing from state", what, d.id());
    }
    d.clear_id();
    Ok(())
}

/// Edge gateway referenced by ID (`edge_gateway_id` attributes).
pub(crate) async fn edge_gateway_by_id(client: &VcdClient, id: &str) -> Result<EdgeGateway> {
    client
        .call(client.backend().get_edge_gateway(id))
        .await
        .with_context(|| format!("{}: {}", ERR_EDGE_NOT_FOUND, id))
}

/// Did anything other than parent references or metadata change?
pub(crate) fn payload_changed(d: &ResourceData) -> bool {
    const SKIP: &[&str] = &["org", "vdc", "edge_gateway", "metadata", "metadata_entry"];
    d.schema()
        .iter()
        .any(|(name, a)| !a.is_computed_only() && !SKIP.contains(&name) && d.has_change(name))
}

/// Pick the entity matching the bag: by identifier when there is one,
/// otherwise by case-insensitive name.
pub(crate) fn pick<T>(
    items: Vec<T>,
    id: &str,
    name: &str,
    id_of: fn(&T) -> &str,
    name_of: fn(&T) -> &str,
) -> Option<T> {
    if !id.is_empty() {
        return items.into_iter().find(|item| id_of(item) == id);
    }
    if name.is_empty() {
        return None;
    }
    items.into_iter().find(|item| name_of(item).eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named {
        id: &'static str,
        name: &'static str,
    }

    fn items() -> Vec<Named> {
        vec![
            Named { id: "1", name: "Alpha" },
            Named { id: "2", name: "beta" },
        ]
    }

    #[test]
    fn test_pick_prefers_id() {
        let found = pick(items(), "2", "Alpha", |n| n.id, |n| n.name).unwrap();
        assert_eq!(found.id, "2");
        assert!(pick(items(), "3", "Alpha", |n| n.id, |n| n.name).is_none());
    }

    #[test]
    fn test_pick_by_name_ignores_case() {
        let found = pick(items(), "", "alpha", |n| n.id, |n| n.name).unwrap();
        assert_eq!(found.id, "1");
        assert!(pick(items(), "", "", |n| n.id, |n| n.name).is_none());
    }

    #[test]
    fn test_timeouts_default() {
        assert_eq!(Timeouts::default().create, DEFAULT_TIMEOUT);
        assert_eq!(Timeouts::uniform(LONG_TIMEOUT).delete, LONG_TIMEOUT);
    }
}
