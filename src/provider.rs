//! Provider factory
//!
//! [`Provider`] is what the host engine talks to. It owns the session
//! client, exposes the provider descriptor and drives the dispatchers of the
//! registered resource kinds: validate, plan, create, read, update, delete,
//! import and data-source reads.
//!
//! State crosses this boundary as JSON objects: configuration blocks in,
//! state bags (with their `id`) out.

use crate::config::ProviderConfig;
use crate::error::VcdError;
use crate::resource::{
    get_data_source, get_registry, get_resource, read_data_source, ResourceDescriptor,
};
use crate::schema::diff::{plan, PlanResult};
use crate::schema::validate::check_values;
use crate::schema::Diagnostics;
use crate::state::ResourceData;
use crate::vcd::http::RestBackend;
use crate::vcd::VcdClient;
use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Outcome of a dispatcher call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Applied {
    /// Resulting state bag; an empty `id` means the entity is gone
    pub state: Value,
    pub warnings: Vec<String>,
}

impl Applied {
    fn from_bag(mut d: ResourceData, mut warnings: Vec<String>) -> Self {
        d.commit();
        warnings.extend(d.take_warnings());
        Self {
            state: d.to_json(),
            warnings,
        }
    }

    pub fn id(&self) -> &str {
        self.state.get("id").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn is_gone(&self) -> bool {
        self.id().is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Create,
    Update,
    Delete,
}

impl Operation {
    fn as_str(self) -> &'static str {
        match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
        }
    }

    fn limit(self, descriptor: &ResourceDescriptor) -> Duration {
        match self {
            Operation::Create => descriptor.timeouts.create,
            Operation::Update => descriptor.timeouts.update,
            Operation::Delete => descriptor.timeouts.delete,
        }
    }
}

fn descriptor(kind: &str) -> Result<&'static ResourceDescriptor> {
    get_resource(kind).ok_or_else(|| anyhow!("unknown resource kind {:?}", kind))
}

fn bag(descriptor: &ResourceDescriptor, value: &Value) -> Result<ResourceData> {
    ResourceData::from_json(Arc::clone(&descriptor.schema), value)
        .with_context(|| format!("invalid {} configuration", descriptor.name))
}

/// Declared checks plus the kind's own cross-attribute checks.
fn diagnostics(descriptor: &ResourceDescriptor, d: &ResourceData) -> Diagnostics {
    let mut diags = check_values(&descriptor.schema, d.values(), "");
    diags.extend(descriptor.lifecycle.validate(d));
    diags
}

/// Validate a configuration bag and fail before any backend call.
fn checked(descriptor: &ResourceDescriptor, d: &ResourceData) -> Result<Vec<String>> {
    diagnostics(descriptor, d)
        .into_result()
        .with_context(|| format!("invalid {} configuration", descriptor.name))
}

async fn bounded<F>(descriptor: &ResourceDescriptor, op: Operation, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let limit = op.limit(descriptor);
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.with_context(|| format!("{} {} failed", op.as_str(), descriptor.name)),
        Err(_) => Err(VcdError::Timeout(
            limit.as_secs(),
            format!("{} of {}", op.as_str(), descriptor.name),
        )
        .into()),
    }
}

/// The provider as seen by the host engine
#[derive(Clone)]
pub struct Provider {
    client: VcdClient,
}

impl Provider {
    /// Build a session from an explicit provider block (merged over the
    /// environment and the config file) against the REST backend.
    pub fn configure(block: &Value) -> Result<Self> {
        let config = ProviderConfig::resolve(block)?;
        tracing::info!("Configuring provider for {}", config.url);
        let backend = RestBackend::new(&config).context("Failed to create REST backend")?;
        Ok(Self::from_client(VcdClient::new(config, Arc::new(backend))))
    }

    pub fn from_client(client: VcdClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &VcdClient {
        &self.client
    }

    /// Same session, carrying the host's cancellation signal for one call.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            client: self.client.with_cancel(cancel),
        }
    }

    /// Provider descriptor: configuration attributes, resource schemas and
    /// data-source schemas.
    pub fn schema() -> Value {
        let mut resources = Map::new();
        let mut data_sources = Map::new();
        for d in get_registry().iter() {
            resources.insert(
                d.name.to_string(),
                json!({
                    "description": d.description,
                    "importable": d.import_layout.is_some(),
                    "timeouts": {
                        "create": d.timeouts.create.as_secs(),
                        "update": d.timeouts.update.as_secs(),
                        "delete": d.timeouts.delete.as_secs(),
                    },
                    "attributes": d.schema.to_json(),
                }),
            );
            if let Some(ds) = &d.data_source {
                data_sources.insert(d.name.to_string(), json!({ "attributes": ds.to_json() }));
            }
        }
        json!({
            "provider": ProviderConfig::schema().to_json(),
            "resources": resources,
            "data_sources": data_sources,
        })
    }

    /// Plan-time validation of a configuration block.
    pub fn validate(kind: &str, config: &Value) -> Result<Diagnostics> {
        let descriptor = descriptor(kind)?;
        let d = bag(descriptor, config)?;
        Ok(diagnostics(descriptor, &d))
    }

    /// Compare stored state with a configuration block. `prior` may be
    /// `null` when nothing exists yet.
    pub fn plan(kind: &str, prior: &Value, config: &Value) -> Result<PlanResult> {
        let descriptor = descriptor(kind)?;
        let prior = if prior.is_null() {
            ResourceData::new(Arc::clone(&descriptor.schema))
        } else {
            bag(descriptor, prior)?
        };
        let proposed = bag(descriptor, config)?.with_prior(&prior);
        Ok(plan(&prior, &proposed))
    }

    pub async fn create(&self, kind: &str, config: &Value) -> Result<Applied> {
        let descriptor = descriptor(kind)?;
        let mut d = bag(descriptor, config)?;
        let warnings = checked(descriptor, &d)?;

        tracing::info!("Dispatching create of {}", kind);
        let create = descriptor.lifecycle.create(&mut d, &self.client);
        bounded(descriptor, Operation::Create, create).await?;
        Ok(Applied::from_bag(d, warnings))
    }

    /// Refresh stored state. A vanished entity yields an empty `id`.
    pub async fn read(&self, kind: &str, state: &Value) -> Result<Applied> {
        let descriptor = descriptor(kind)?;
        let mut d = bag(descriptor, state)?;
        d.commit();

        tracing::info!("Dispatching read of {} {}", kind, d.id());
        descriptor
            .lifecycle
            .read(&mut d, &self.client)
            .await
            .with_context(|| format!("read {} failed", kind))?;
        Ok(Applied::from_bag(d, Vec::new()))
    }

    pub async fn update(&self, kind: &str, prior: &Value, config: &Value) -> Result<Applied> {
        let descriptor = descriptor(kind)?;
        let prior = bag(descriptor, prior)?;
        if prior.id().is_empty() {
            bail!("cannot update {}: stored state has no id", kind);
        }
        let config = bag(descriptor, config)?;
        let warnings = checked(descriptor, &config)?;
        let mut d = config.with_prior(&prior);

        tracing::info!("Dispatching update of {} {}", kind, d.id());
        let update = descriptor.lifecycle.update(&mut d, &self.client);
        bounded(descriptor, Operation::Update, update).await?;
        Ok(Applied::from_bag(d, warnings))
    }

    pub async fn delete(&self, kind: &str, state: &Value) -> Result<()> {
        let descriptor = descriptor(kind)?;
        let mut d = bag(descriptor, state)?;
        if d.id().is_empty() {
            return Ok(());
        }

        tracing::info!("Dispatching delete of {} {}", kind, d.id());
        let delete = descriptor.lifecycle.delete(&mut d, &self.client);
        bounded(descriptor, Operation::Delete, delete).await
    }

    /// Import by dotted identifier, then read the full state.
    pub async fn import(&self, kind: &str, id: &str) -> Result<Applied> {
        let descriptor = descriptor(kind)?;
        let path = descriptor.parse_import(id, self.client.import_separator())?;
        let mut d = ResourceData::new(Arc::clone(&descriptor.schema));

        tracing::info!("Dispatching import of {} {}", kind, id);
        descriptor
            .lifecycle
            .import(&mut d, &self.client, &path)
            .await
            .with_context(|| format!("import {} failed", kind))?;
        descriptor
            .lifecycle
            .read(&mut d, &self.client)
            .await
            .with_context(|| format!("read {} failed", kind))?;
        if d.id().is_empty() {
            bail!("{} {:?} not found after import", kind, id);
        }
        Ok(Applied::from_bag(d, Vec::new()))
    }

    pub async fn read_data_source(&self, kind: &str, config: &Value) -> Result<Applied> {
        let descriptor =
            get_data_source(kind).ok_or_else(|| anyhow!("unknown data source {:?}", kind))?;
        let Some(schema) = &descriptor.data_source else {
            bail!("unknown data source {:?}", kind);
        };
        let mut d = ResourceData::from_json(Arc::clone(schema), config)
            .with_context(|| format!("invalid {} data source configuration", kind))?;
        check_values(schema, d.values(), "")
            .into_result()
            .with_context(|| format!("invalid {} data source configuration", kind))?;

        tracing::info!("Dispatching data source read of {}", kind);
        read_data_source(descriptor, &mut d, &self.client).await?;
        Ok(Applied::from_bag(d, Vec::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_lists_every_kind() {
        let schema = Provider::schema();
        let resources = schema["resources"].as_object().unwrap();
        assert_eq!(resources.len(), get_registry().iter().count());
        assert!(schema["provider"]["url"].is_object());
        assert!(schema["data_sources"].get("vcd_edgegateway_settings").is_none());
    }

    #[test]
    fn test_validate_unknown_kind() {
        assert!(Provider::validate("vcd_nope", &json!({})).is_err());
    }

    #[test]
    fn test_validate_reports_missing_required() {
        let diags = Provider::validate("vcd_ipset", &json!({})).unwrap();
        assert!(diags.has_errors());
    }

    #[test]
    fn test_applied_gone() {
        let applied = Applied {
            state: json!({"id": ""}),
            warnings: Vec::new(),
        };
        assert!(applied.is_gone());
    }
}
