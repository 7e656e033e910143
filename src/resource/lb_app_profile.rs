//! vcd_lb_app_profile
//!
//! Load balancer application profiles on an NSX-V edge gateway.

use super::{edge_parent_schema, gone, pick, write_parents, Lifecycle, ResourceDescriptor};
use crate::error::is_not_found;
use crate::import::{ImportLayout, ImportPath};
use crate::schema::diff::suppress_case_insensitive;
use crate::schema::{validate, Attribute, Diagnostics, Schema};
use crate::state::ResourceData;
use crate::vcd::types::{EdgeGateway, LbAppProfile, LbPersistence};
use crate::vcd::VcdClient;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;

pub const NAME: &str = "vcd_lb_app_profile";

pub const PROFILE_TYPES: &[&str] = &["tcp", "udp", "http", "https"];
pub const PERSISTENCE_METHODS: &[&str] = &["cookie", "ssl-sessionid", "sourceip"];
pub const COOKIE_MODES: &[&str] = &["insert", "prefix", "app"];

pub fn schema() -> Schema {
    edge_parent_schema()
        .attr("name", Attribute::string().required())
        .attr(
            "type",
            Attribute::string()
                .required()
                .validate(validate::string_in_slice(PROFILE_TYPES, true))
                .diff_suppress(suppress_case_insensitive()),
        )
        .attr("enable_ssl_passthrough", Attribute::bool().optional().default(false))
        .attr("http_redirect_url", Attribute::string().optional())
        .attr(
            "persistence_mechanism",
            Attribute::string()
                .optional()
                .validate(validate::string_in_slice(PERSISTENCE_METHODS, true))
                .diff_suppress(suppress_case_insensitive()),
        )
        .attr("cookie_name", Attribute::string().optional())
        .attr(
            "cookie_mode",
            Attribute::string()
                .optional()
                .validate(validate::string_in_slice(COOKIE_MODES, true))
                .diff_suppress(suppress_case_insensitive()),
        )
        .attr("expiration", Attribute::int().optional().default(0i64))
        .attr("insert_x_forwarded_http_header", Attribute::bool().optional().default(false))
        .attr("enable_pool_side_ssl", Attribute::bool().optional().default(false))
}

pub fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(NAME, schema(), LbAppProfileResource)
        .description("load balancer application profile")
        .importable(ImportLayout::OrgVdcEdgeEntity, "app-profile-name")
        .with_data_source(&["name", "org", "vdc", "edge_gateway"])
}

fn profile_from_bag(d: &ResourceData) -> LbAppProfile {
    let method = d.get_str("persistence_mechanism").to_lowercase();
    let persistence = (!method.is_empty()).then(|| LbPersistence {
        method,
        cookie_name: d.get_string("cookie_name"),
        cookie_mode: d.get_str("cookie_mode").to_lowercase(),
        expire: d.get_int("expiration"),
    });
    LbAppProfile {
        id: d.id().to_string(),
        name: d.get_string("name"),
        template: d.get_str("type").to_uppercase(),
        ssl_passthrough: d.get_bool("enable_ssl_passthrough"),
        http_redirect_url: d.get_string("http_redirect_url"),
        persistence,
        insert_x_forwarded_for: d.get_bool("insert_x_forwarded_http_header"),
        server_ssl_enabled: d.get_bool("enable_pool_side_ssl"),
    }
}

fn write_profile(d: &mut ResourceData, p: &LbAppProfile) -> Result<()> {
    d.set_id(&p.id);
    d.set("name", &p.name)?;
    d.set("type", p.template.to_lowercase())?;
    d.set("enable_ssl_passthrough", p.ssl_passthrough)?;
    d.set("http_redirect_url", &p.http_redirect_url)?;
    let persistence = p.persistence.clone().unwrap_or_default();
    d.set("persistence_mechanism", &persistence.method)?;
    d.set("cookie_name", &persistence.cookie_name)?;
    d.set("cookie_mode", &persistence.cookie_mode)?;
    d.set("expiration", persistence.expire)?;
    d.set("insert_x_forwarded_http_header", p.insert_x_forwarded_for)?;
    d.set("enable_pool_side_ssl", p.server_ssl_enabled)?;
    Ok(())
}

async fn find_profile(
    client: &VcdClient,
    edge: &EdgeGateway,
    d: &ResourceData,
) -> Result<Option<LbAppProfile>> {
    if !d.id().is_empty() {
        return match client.call(client.backend().get_lb_app_profile(&edge.id, d.id())).await {
            Ok(p) => Ok(Some(p)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        };
    }
    let profiles = client.call(client.backend().list_lb_app_profiles(&edge.id)).await?;
    Ok(pick(profiles, "", d.get_str("name"), |p| p.id.as_str(), |p| p.name.as_str()))
}

pub struct LbAppProfileResource;

#[async_trait]
impl Lifecycle for LbAppProfileResource {
    async fn create(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        let profile = profile_from_bag(d);

        let guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!(
            "Creating LB application profile {} on edge gateway {}",
            profile.name,
            edge.name
        );
        let created = client
            .call(client.backend().create_lb_app_profile(&edge.id, &profile))
            .await
            .with_context(|| format!("error creating LB application profile {}", profile.name))?;
        drop(guard);

        d.set_id(&created.id);
        self.read(d, client).await
    }

    async fn read(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        tracing::info!(
            "Reading LB application profile {} on edge gateway {}",
            d.get_str("name"),
            edge.name
        );
        match find_profile(client, &edge, d).await? {
            Some(p) => write_profile(d, &p),
            None => gone(d, "LB application profile"),
        }
    }

    async fn update(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        let profile = profile_from_bag(d);

        let guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!(
            "Updating LB application profile {} on edge gateway {}",
            profile.name,
            edge.name
        );
        client
            .call(client.backend().update_lb_app_profile(&edge.id, &profile))
            .await
            .with_context(|| format!("error updating LB application profile {}", profile.name))?;
        drop(guard);

        self.read(d, client).await
    }

    async fn delete(&self, d: &mut ResourceData, client: &VcdClient) -> Result<()> {
        let (_, _, edge) = client.edge_gateway_from(d, "edge_gateway").await?;
        let name = d.get_string("name");

        let _guard = client.lock_edge_gateway(&edge).await?;
        tracing::info!("Deleting LB application profile {} on edge gateway {}", name, edge.name);
        client
            .call(client.backend().delete_lb_app_profile(&edge.id, d.id()))
            .await
            .with_context(|| format!("error deleting LB application profile {}", name))?;
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
        let profiles = client.call(client.backend().list_lb_app_profiles(&edge.id)).await?;
        let found = pick(profiles, "", &path.entity, |p| p.id.as_str(), |p| p.name.as_str());
        let Some(profile) = found else {
            bail!(
                "unable to find LB application profile {:?} on edge gateway {}",
                path.entity,
                edge.name
            );
        };
        write_parents(d, path)?;
        d.set("name", &profile.name)?;
        d.set_id(&profile.id);
        Ok(())
    }

    fn validate(&self, d: &ResourceData) -> Diagnostics {
        let mut diags = Diagnostics::new();
        let method = d.get_str("persistence_mechanism");
        let is_cookie = method.eq_ignore_ascii_case("cookie");
        for key in ["cookie_name", "cookie_mode"] {
            if !d.get_str(key).is_empty() && !is_cookie {
                diags.push_error(format!("{} requires persistence_mechanism \"cookie\"", key));
            }
        }
        let https = d.get_str("type").eq_ignore_ascii_case("https");
        if d.get_bool("enable_ssl_passthrough") && !https {
            diags.push_error("enable_ssl_passthrough requires type \"https\"");
        }
        diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    fn bag(v: serde_json::Value) -> ResourceData {
        ResourceData::from_json(Arc::new(schema()), &v).unwrap()
    }

    #[test]
    fn test_schema_is_well_formed() {
        assert!(schema().check().is_ok());
        assert!(descriptor().data_source.unwrap().check().is_ok());
    }

    #[test]
    fn test_profile_from_bag() {
        let d = bag(json!({
            "edge_gateway": "edge1",
            "name": "web",
            "type": "HTTP",
            "persistence_mechanism": "Cookie",
            "cookie_name": "JSESSIONID",
            "cookie_mode": "insert"
        }));
        let p = profile_from_bag(&d);
        assert_eq!(p.template, "HTTP");
        assert_eq!(p.persistence.unwrap().method, "cookie");
    }

    #[test]
    fn test_profile_without_persistence() {
        let d = bag(json!({"edge_gateway": "edge1", "name": "tcp", "type": "tcp"}));
        assert!(profile_from_bag(&d).persistence.is_none());
        assert!(LbAppProfileResource.validate(&d).is_empty());
    }

    #[test]
    fn test_cookie_fields_need_cookie_persistence() {
        let d = bag(json!({
            "edge_gateway": "edge1",
            "name": "web",
            "type": "http",
            "persistence_mechanism": "sourceip",
            "cookie_name": "X"
        }));
        assert!(LbAppProfileResource.validate(&d).has_errors());

        let d = bag(json!({
            "edge_gateway": "edge1",
            "name": "web",
            "type": "http",
            "enable_ssl_passthrough": true
        }));
        assert!(LbAppProfileResource.validate(&d).has_errors());
    }
}
