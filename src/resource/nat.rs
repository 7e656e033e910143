//! vcd_nsxv_snat / vcd_nsxv_dnat
//!
//! Both kinds live on the same edge gateway endpoint and share one
//! lifecycle. [`NatOps`] supplies what differs: the request fields and how
//! they are read back. Read refuses a rule whose action belongs to the other
//! kind, so neither resource can silently take over the other's rules.

use super::{
    edge_parent_schema, gone, payload_changed, write_parents, Lifecycle, ResourceDescriptor,
};
use crate::error::{is_not_found, ERR_KIND_MISMATCH};
use crate::import::{ImportLayout, ImportPath};
use crate::schema::diff::suppress_word_to_empty;
use crate::schema::{validate, AttrValue, Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::client::{vnic_index, vnic_network, NETWORK_TYPE_EXT, NETWORK_TYPE_ORG};
use crate::vcd::types::{EdgeGateway, NatRule};
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::fmt;

pub const SNAT_NAME: &str = "vcd_nsxv_snat";
pub const DNAT_NAME: &str = "vcd_nsxv_dnat";

pub const NETWORK_TYPES: &[&str] = &[NETWORK_TYPE_EXT, NETWORK_TYPE_ORG];
pub const PROTOCOLS: &[&str] = &["tcp", "udp", "icmp", "any"];

/// NAT rule flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NatKind {
    Snat,
    Dnat,
}

impl NatKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NatKind::Snat => "snat",
            NatKind::Dnat => "dnat",
        }
    }

    pub fn resource_name(self) -> &'static str {
        match self {
            NatKind::Snat => SNAT_NAME,
            NatKind::Dnat => DNAT_NAME,
        }
    }
}

impl fmt::Display for NatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fail unless `rule` carries the action of `expected` (case-insensitive).
pub fn check_kind(rule: &NatRule, expected: NatKind) -> Result<()> {
    if rule.action.eq_ignore_ascii_case(expected.as_str()) {
        return Ok(());
    }
    bail!(
        "{}: NAT rule {} has action {:?} but this resource manages {:?} rules; use the matching resource type instead of {}",
        ERR_KIND_MISMATCH,
        rule.id,
        rule.action.to_lowercase(),
        expected.as_str(),
        expected.resource_name()
    )
}

// =========================================================================
// Per-kind capabilities
// =========================================================================

/// What differs between SNAT and DNAT
pub trait NatOps: Send + Sync {
    fn kind(&self) -> NatKind;

    /// Kind-specific attributes, merged into the shared schema.
    fn schema(&self) -> Schema {
        Schema::new()
    }

    /// Copy kind-specific fields from the bag into the request.
    fn build_request(&self, _d: &ResourceData, _rule: &mut NatRule) {}

    /// Write kind-specific fields of an observed rule into the bag.
    fn read_back(&self, _d: &mut ResourceData, _rule: &NatRule) -> Result<()> {
        Ok(())
    }

    fn validate(&self, _d: &ResourceData) -> Diagnostics {
        Diagnostics::new()
    }
}

pub struct Snat;

impl NatOps for Snat {
    fn kind(&self) -> NatKind {
        NatKind::Snat
    }
}

pub struct Dnat;

impl NatOps for Dnat {
    fn kind(&self) -> NatKind {
        NatKind::Dnat
    }

    fn schema(&self) -> Schema {
        Schema::new()
            .attr(
                "protocol",
                Attribute::string()
                    .optional()
                    .validate(validate::string_in_slice(PROTOCOLS, true))
                    .diff_suppress(suppress_word_to_empty("any")),
            )
            .attr(
                "icmp_type",
                Attribute::string()
                    .optional()
                    .diff_suppress(suppress_word_to_empty("any")),
            )
            .attr(
                "original_port",
                Attribute::string()
                    .optional()
                    .diff_suppress(suppress_word_to_empty("any")),
            )
            .attr(
                "translated_port",
                Attribute::string()
                    .optional()
                    .diff_suppress(suppress_word_to_empty("any")),
            )
    }

    fn build_request(&self, d: &ResourceData, rule: &mut NatRule) {
        let or_any = |key: &str| match d.get_str(key) {
            "" => "any".to_string(),
            v => v.to_lowercase(),
        };
        rule.protocol = or_any("protocol");
        rule.icmp_type = or_any("icmp_type");
        rule.original_port = or_any("original_port");
        rule.translated_port = or_any("translated_port");
    }

    fn read_back(&self, d: &mut ResourceData, rule: &NatRule) -> Result<()> {
        d.set("protocol", &rule.protocol)?;
        d.set("icmp_type", &rule.icmp_type)?;
        d.set("original_port", &rule.original_port)?;
        d.set("translated_port", &rule.translated_port)?;
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let protocol = d.get_str("protocol").to_lowercase();
        let protocol = if protocol.is_empty() { "any".to_string() } else { protocol };
        let port_ok = matches!(protocol.as_str(), "tcp" | "udp" | "any");
        for key in ["original_port", "translated_port"] {
            let port = d.get_str(key);
            if !port.is_empty() && !port.eq_ignore_ascii_case("any") && !port_ok {
                diags.push_error(format!(
                    "{} can only be set with protocol tcp, udp or any, not {}",
                    key, protocol
                ));
            }
        }
        let icmp = d.get_str("icmp_type");
        if !icmp.is_empty() && !icmp.eq_ignore_ascii_case("any") && protocol != "icmp" {
            diags.push_error(format!(
                "icmp_type can only be set with protocol icmp, not {}",
                protocol
            ));
        }
        diags
    }
}

// =========================================================================
// Shared lifecycle
// =========================================================================

fn base_schema() -> Schema {
    edge_parent_schema()
        .attr(
            "network_type",
            Attribute::string()
                .optional()
                .default(NETWORK_TYPE_EXT)
                .validate(validate::string_in_slice(NETWORK_TYPES, false))
                .description("ext for an uplink, org for an org network"),
        )
        .attr("network_name", Attribute::string().required())
        .attr("rule_type", Attribute::string().computed())
        .attr(
            "rule_tag",
            Attribute::int()
                .optional()
                .computed()
                .force_new()
                .validate(validate::int_between(65537, 131072)),
        )
        .attr("enabled", Attribute::bool().optional().default(true))
        .attr("logging_enabled", Attribute::bool().optional().default(false))
        .attr("description", Attribute::string().optional())
        .attr("original_address", Attribute::string().required())
        .attr("translated_address", Attribute::string().required())
}

pub struct NatResource<O>(pub O);

impl<O: NatOps> NatResource<O> {
    fn request(&self, d: &ResourceData, edge: &EdgeGateway) -> Result<NatRule> {
        let vnic = vnic_index(edge, d.get_str("network_name"), d.get_str("network_type"))?;
        let mut rule = NatRule {
            id: d.id().to_string(),
            action: self.0.kind().as_str().to_string(),
            rule_tag: d.get("rule_tag").and_then(AttrValue::as_int).filter(|t| *t > 0),
            enabled: d.get_bool("enabled"),
            logging_enabled: d.get_bool("logging_enabled"),
            description: d.get_string("description"),
            vnic: Some(vnic),
            original_address: d.get_string("original_address"),
            translated_address: d.get_string("translated_address"),
            ..Default::default()
        };
        self.0.build_request(d, &mut rule);
        Ok(rule)
    }

    fn write(&self, d: &mut ResourceData, edge: &EdgeGateway, rule: &NatRule) -> Result<()> {
        if let Some(index) = rule.vnic {
            let (network_name, network_type) = vnic_network(edge, index)?;
            d.set("network_name", network_name)?;
            d.set("network_type", network_type)?;
        }
        d.set("rule_type", rule.action.to_lowercase())?;
        if let Some(tag) = rule.rule_tag {
            d.set("rule_tag", tag)?;
        }
        d.set("enabled", rule.enabled)?;
        d.set("logging_enabled", rule.logging_enabled)?;
        d.set("description", &rule.description)?;
        d.set("original_address", &rule.original_address)?;
        d.set("translated_address", &rule.translated_address)?;
        self.0.read_back(d, rule)
    }
}

#[async_trait]
impl<O: NatOps> Lifecycle for NatResource<O> {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let kind = self.0.kind();
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        let rule = self.request(d, &edge)?;

        let guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!("Creating {} rule on edge gateway {}", kind, edge.name);
        let created = client
            .call(client.backend().create_nat_rule(&edge.id, &rule))
            .await
            .with_context(|| {
                format!("error creating {} rule on edge gateway {}", kind, edge.name)
            })?;
        drop(guard);

        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let kind = self.0.kind();
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        tracing::info!("Reading {} rule {} on edge gateway {}", kind, d.id(), edge.name);

        let rule = match client.call(client.backend().get_nat_rule(&edge.id, d.id())).await {
            Ok(rule) => rule,
            Err(e) if is_not_found(&e) => return gone(d, "NAT rule"),
            Err(e) => return Err(e),
        };
        check_kind(&rule, kind)?;
        self.write(d, &edge, &rule)
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let kind = self.0.kind();
        if payload_changed(d) {
            let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
            let rule = self.request(d, &edge)?;

            let _guard = client.lock_edge_gateway(&edge).await?;
            tracing::info!("Updating {} rule {} on edge gateway {}", kind, rule.id, edge.name);
            client
                .call(client.backend().update_nat_rule(&edge.id, &rule))
                .await
                .with_context(|| format!("error updating {} rule {}", kind, rule.id))?;
        }
        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let kind = self.0.kind();
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;

        let _guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!("Deleting {} rule {} on edge gateway {}", kind, d.id(), edge.name);
        match client.call(client.backend().delete_nat_rule(&edge.id, d.id())).await {
            Ok(()) => {}
            Err(e) if is_not_found(&e) => {}
            Err(e) => return Err(e.context(format!("error deleting {} rule {}", kind, d.id()))),
        }
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
        let edge = client.get_edge_gateway(&vdc, path.edge_gateway()).await?;
        let rule = client
            .call(client.backend().get_nat_rule(&edge.id, &path.entity))
            .await
            .with_context(|| {
                format!(
                    "unable to find NAT rule {} on edge gateway {}",
                    path.entity, edge.name
                )
            })?;
        check_kind(&rule, self.0.kind())?;

        write_parents(d, path)?;
        d.set_id(&rule.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        self.0.validate(d)
    }
}

fn descriptor_for<O: NatOps + 'static>(ops: O, description: &'static str) -> ResourceDescriptor {
    let kind = ops.kind();
    let schema = base_schema().merge(ops.schema());
    ResourceDescriptor::new(kind.resource_name(), schema, NatResource(ops))
        .description(description)
        .importable(ImportLayout::OrgVdcEdgeEntity, "nat-rule-id")
}

pub fn snat_descriptor() -> ResourceDescriptor {
    descriptor_for(Snat, "source NAT rule on an NSX-V edge gateway")
}

pub fn dnat_descriptor() -> ResourceDescriptor {
    descriptor_for(Dnat, "destination NAT rule on an NSX-V edge gateway")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn rule(action: &str) -> NatRule {
        NatRule {
            id: "196609".to_string(),
            action: action.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_kind_case_insensitive() {
        assert!(check_kind(&rule("SNAT"), NatKind::Snat).is_ok());
        assert!(check_kind(&rule("dnat"), NatKind::Dnat).is_ok());
    }

    #[test]
    fn test_check_kind_names_actual_and_expected() {
        let err = check_kind(&rule("snat"), NatKind::Dnat).unwrap_err().to_string();
        assert!(err.contains("\"snat\""), "{}", err);
        assert!(err.contains("\"dnat\""), "{}", err);
        assert!(err.starts_with(ERR_KIND_MISMATCH));
    }

    #[test]
    fn test_schemas_are_well_formed() {
        assert!(snat_descriptor().schema.check().is_ok());
        let dnat = dnat_descriptor();
        assert!(dnat.schema.check().is_ok());
        assert!(dnat.schema.contains("protocol"));
        assert!(!snat_descriptor().schema.contains("protocol"));
    }

    #[test]
    fn test_dnat_port_requires_port_protocol() {
        let schema = Arc::new(base_schema().merge(Dnat.schema()));
        let bag = |extra: serde_json::Value| {
            let mut v = json!({
                "edge_gateway": "edge1",
                "network_name": "public",
                "original_address": "1.1.1.1",
                "translated_address": "10.0.0.5"
            });
            for (k, val) in extra.as_object().unwrap() {
                v[k] = val.clone();
            }
            ResourceData::from_json(Arc::clone(&schema), &v).unwrap()
        };
        let errors = |extra: serde_json::Value| Dnat.validate(&bag(extra)).has_errors();
        assert!(!errors(json!({"protocol": "tcp", "original_port": "443"})));
        assert!(!errors(json!({"original_port": "443"})));
        assert!(errors(json!({"protocol": "icmp", "original_port": "443"})));
        assert!(errors(json!({"protocol": "tcp", "icmp_type": "echo-request"})));
        assert!(!errors(json!({"protocol": "icmp", "icmp_type": "echo-request"})));
    }

    #[test]
    fn test_dnat_request_defaults_to_any() {
        let schema = Arc::new(base_schema().merge(Dnat.schema()));
        let d = ResourceData::from_json(
            schema,
            &json!({
                "edge_gateway": "edge1",
                "network_name": "public",
                "original_address": "1.1.1.1",
                "translated_address": "10.0.0.5",
                "protocol": "TCP"
            }),
        )
        .unwrap();
        let mut r = NatRule::default();
        Dnat.build_request(&d, &mut r);
        assert_eq!(r.protocol, "tcp");
        assert_eq!(r.original_port, "any");
        assert_eq!(r.icmp_type, "any");
    }
}
