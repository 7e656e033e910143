//! REST backend
//!
//! [`VcdBackend`] over the platform's JSON REST surface. Collections are
//! paged (`page`/`pageCount`/`values`); mutations may answer `202 Accepted`
//! with a task that is polled until it finishes or `max_retry_timeout` runs
//! out.

use super::auth::VcdCredentials;
use super::backend::VcdBackend;
use super::types::*;
use crate::config::ProviderConfig;
use crate::error::VcdError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

const PAGE_SIZE: &str = "128";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sanitize response body for logging: truncate and strip control bytes.
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..end], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Generic message for a status the backend did not explain.
fn status_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Invalid request. Check your parameters.",
        401 => "Authentication failed. Check user, password or token.",
        403 => "Permission denied.",
        409 => "Resource conflict. The entity may already exist or be busy.",
        429 => "Rate limit exceeded. Please try again later.",
        500 | 503 => "Service temporarily unavailable. Please try again.",
        _ => "Request failed.",
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| status_message(status).to_string())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    values: Vec<T>,
    #[serde(default)]
    page_count: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    version: String,
    #[serde(default)]
    deprecated: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Versions {
    #[serde(default)]
    version_info: Vec<VersionInfo>,
}

enum Outcome {
    Body(String),
    Task(Task),
}

/// HTTP backend
pub struct RestBackend {
    http: Client,
    root: Url,
    api_version: String,
    credentials: VcdCredentials,
    max_retry: Duration,
    poll_interval: Duration,
}

impl RestBackend {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(concat!("vcd-provider/", env!("CARGO_PKG_VERSION")))
            .danger_accept_invalid_certs(config.allow_unverified_ssl)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            root: config.host_root()?,
            api_version: config.api_version.clone(),
            credentials: VcdCredentials::from_config(config),
            max_retry: config.max_retry(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn url(&self, path: &str) -> Result<Url> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Url::parse(path).with_context(|| format!("invalid URL {:?}", path));
        }
        self.root
            .join(path.trim_start_matches('/'))
            .with_context(|| format!("invalid path {:?}", path))
    }

    /// Send one request. 404 becomes `NotFound`; other failures become `Api`.
    /// An expired session is refreshed once.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String)> {
        let mut retried = false;
        loop {
            tracing::debug!("{} {}", method, url);
            let token = self
                .credentials
                .get_token(&self.http, &self.root, &self.api_version)
                .await?;

            let mut request = self
                .http
                .request(method.clone(), url.clone())
                .bearer_auth(&token)
                .header(
                    reqwest::header::ACCEPT,
                    format!("application/json;version={}", self.api_version),
                );
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request.send().await.context("Failed to send request")?;
            let status = response.status();
            let text = response.text().await.context("Failed to read response body")?;

            if status == StatusCode::UNAUTHORIZED && !retried {
                tracing::debug!("Session rejected, logging in again");
                self.credentials.invalidate().await;
                retried = true;
                continue;
            }
            if status == StatusCode::NOT_FOUND {
                return Err(VcdError::not_found(url.path().to_string()).into());
            }
            if !status.is_success() {
                tracing::error!("API error: {} - {}", status, sanitize_for_log(&text));
                return Err(VcdError::Api {
                    status: status.as_u16(),
                    message: error_message(status, &text),
                }
                .into());
            }
            return Ok((status, text));
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (_, text) = self.send(Method::GET, self.url(path)?, None).await?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse response of GET {}", path))
    }

    /// Fetch every page of a collection. `filter` uses the platform's FIQL
    /// syntax, e.g. `vdcId==urn:...`.
    async fn get_all<T: DeserializeOwned>(
        &self,
        path: &str,
        filter: Option<&str>,
    ) -> Result<Vec<T>> {
        let mut all_items = Vec::new();
        let mut page = 1u32;

        loop {
            let mut url = self.url(path)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("page", &page.to_string());
                query.append_pair("pageSize", PAGE_SIZE);
                if let Some(filter) = filter {
                    query.append_pair("filter", filter);
                }
            }
            let (_, text) = self.send(Method::GET, url, None).await?;
            let result: Page<T> = serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse page {} of {}", page, path))?;
            all_items.extend(result.values);

            if page >= result.page_count {
                break;
            }
            page += 1;
        }

        Ok(all_items)
    }

    async fn execute(&self, method: Method, path: &str, body: Option<Value>) -> Result<Outcome> {
        let (status, text) = self.send(method, self.url(path)?, body.as_ref()).await?;
        if status == StatusCode::ACCEPTED && !text.trim().is_empty() {
            let task: Task = serde_json::from_str(&text).context("Failed to parse task")?;
            return Ok(Outcome::Task(self.wait_task(task).await?));
        }
        Ok(Outcome::Body(text))
    }

    /// POST `body`; when the backend answers with a task, fetch the owner
    /// entity from `entity_path(owner_id)`.
    async fn create<T, B, F>(&self, path: &str, body: &B, entity_path: F) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
        F: Fn(&str) -> String + Send,
    {
        let body = serde_json::to_value(body).context("Failed to serialize request")?;
        match self.execute(Method::POST, path, Some(body)).await? {
            Outcome::Body(text) => {
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse response of POST {}", path))
            }
            Outcome::Task(task) => {
                let owner = task
                    .owner
                    .filter(|o| !o.id.is_empty())
                    .ok_or_else(|| anyhow!("task {} finished without an owner entity", task.id))?;
                self.get(&entity_path(&owner.id)).await
            }
        }
    }

    /// PUT `body`, then return the stored entity.
    async fn replace<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + Sync,
    {
        let body = serde_json::to_value(body).context("Failed to serialize request")?;
        match self.execute(Method::PUT, path, Some(body)).await? {
            Outcome::Body(text) if !text.trim().is_empty() => {
                serde_json::from_str(&text)
                    .with_context(|| format!("Failed to parse response of PUT {}", path))
            }
            _ => self.get(path).await,
        }
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.execute(Method::DELETE, path, None).await.map(|_| ())
    }

    async fn action(&self, path: &str) -> Result<()> {
        self.execute(Method::POST, path, None).await.map(|_| ())
    }

    /// Poll a task until it finishes, bounded by `max_retry_timeout`.
    async fn wait_task(&self, mut task: Task) -> Result<Task> {
        let deadline = tokio::time::Instant::now() + self.max_retry;
        let task_path = if task.href.is_empty() {
            format!("api/task/{}", task.id.rsplit(':').next().unwrap_or(&task.id))
        } else {
            task.href.clone()
        };

        while !task.is_finished() {
            if tokio::time::Instant::now() >= deadline {
                let what = format!("task {}", task.id);
                return Err(VcdError::Timeout(self.max_retry.as_secs(), what).into());
            }
            tokio::time::sleep(self.poll_interval).await;
            task = self.get(&task_path).await?;
            tracing::debug!("Task {} ({}) is {}", task.id, task.operation, task.status);
        }

        if task.status != "success" {
            let message = task
                .error
                .as_ref()
                .map(|e| e.message.clone())
                .unwrap_or_else(|| task.status.clone());
            return Err(VcdError::TaskFailed {
                task: task.id.clone(),
                message,
            }
            .into());
        }
        Ok(task)
    }
}

fn eq_filter(field: &str, value: &str) -> String {
    format!("{}=={}", field, value)
}

fn key_segment(key: &str) -> String {
    urlencoding::encode(key).into_owned()
}

#[async_trait]
impl VcdBackend for RestBackend {
    async fn version(&self) -> Result<String> {
        let versions: Versions = self.get("api/versions").await?;
        versions
            .version_info
            .into_iter()
            .filter(|v| !v.deprecated)
            .map(|v| v.version)
            .max_by(|a, b| {
                let parse = |s: &str| {
                    s.split('.')
                        .map(|p| p.parse::<u32>().unwrap_or(0))
                        .collect::<Vec<_>>()
                };
                parse(a).cmp(&parse(b))
            })
            .ok_or_else(|| anyhow!("backend reported no supported API versions"))
    }

    // Organizations

    async fn list_orgs(&self) -> Result<Vec<AdminOrg>> {
        self.get_all("cloudapi/1.0.0/orgs", None).await
    }

    async fn get_org(&self, id: &str) -> Result<AdminOrg> {
        self.get(&format!("cloudapi/1.0.0/orgs/{}", id)).await
    }

    async fn create_org(&self, org: &AdminOrg) -> Result<AdminOrg> {
        self.create("cloudapi/1.0.0/orgs", org, |id| format!("cloudapi/1.0.0/orgs/{}", id))
            .await
    }

    async fn update_org(&self, org: &AdminOrg) -> Result<AdminOrg> {
        self.replace(&format!("cloudapi/1.0.0/orgs/{}", org.id), org).await
    }

    async fn delete_org(&self, id: &str, force: bool, recursive: bool) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/orgs/{}?force={}&recursive={}", id, force, recursive))
            .await
    }

    // VDCs

    async fn list_vdcs(&self, org_id: &str) -> Result<Vec<Vdc>> {
        self.get_all("cloudapi/1.0.0/vdcs", Some(&eq_filter("orgId", org_id))).await
    }

    async fn get_vdc(&self, id: &str) -> Result<Vdc> {
        self.get(&format!("cloudapi/1.0.0/vdcs/{}", id)).await
    }

    async fn create_vdc(&self, org_id: &str, vdc: &Vdc) -> Result<Vdc> {
        self.create(&format!("cloudapi/1.0.0/orgs/{}/vdcs", org_id), vdc, |id| {
            format!("cloudapi/1.0.0/vdcs/{}", id)
        })
        .await
    }

    async fn update_vdc(&self, vdc: &Vdc) -> Result<Vdc> {
        self.replace(&format!("cloudapi/1.0.0/vdcs/{}", vdc.id), vdc).await
    }

    async fn delete_vdc(&self, id: &str, force: bool, recursive: bool) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/vdcs/{}?force={}&recursive={}", id, force, recursive))
            .await
    }

    // Edge gateways

    async fn list_edge_gateways(&self, vdc_id: &str) -> Result<Vec<EdgeGateway>> {
        self.get_all("cloudapi/1.0.0/edgeGateways", Some(&eq_filter("vdcId", vdc_id)))
            .await
    }

    async fn get_edge_gateway(&self, id: &str) -> Result<EdgeGateway> {
        self.get(&format!("cloudapi/1.0.0/edgeGateways/{}", id)).await
    }

    async fn update_edge_settings(
        &self,
        edge_id: &str,
        settings: &EdgeSettings,
    ) -> Result<EdgeSettings> {
        self.replace(&format!("cloudapi/1.0.0/edgeGateways/{}/settings", edge_id), settings)
            .await
    }

    // Networks

    async fn list_networks(&self, vdc_id: &str) -> Result<Vec<OrgNetwork>> {
        self.get_all("cloudapi/1.0.0/orgVdcNetworks", Some(&eq_filter("vdcId", vdc_id)))
            .await
    }

    async fn get_network(&self, id: &str) -> Result<OrgNetwork> {
        self.get(&format!("cloudapi/1.0.0/orgVdcNetworks/{}", id)).await
    }

    async fn create_network(&self, vdc_id: &str, network: &OrgNetwork) -> Result<OrgNetwork> {
        let mut body = network.clone();
        body.vdc_id = vdc_id.to_string();
        self.create("cloudapi/1.0.0/orgVdcNetworks", &body, |id| {
            format!("cloudapi/1.0.0/orgVdcNetworks/{}", id)
        })
        .await
    }

    async fn update_network(&self, network: &OrgNetwork) -> Result<OrgNetwork> {
        self.replace(&format!("cloudapi/1.0.0/orgVdcNetworks/{}", network.id), network)
            .await
    }

    async fn delete_network(&self, id: &str) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/orgVdcNetworks/{}", id)).await
    }

    async fn get_external_network(&self, name: &str) -> Result<ExternalNetwork> {
        let found: Vec<ExternalNetwork> = self
            .get_all("cloudapi/1.0.0/externalNetworks", Some(&eq_filter("name", name)))
            .await?;
        found
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| VcdError::not_found(format!("external network {}", name)).into())
    }

    // NAT rules

    async fn list_nat_rules(&self, edge_id: &str) -> Result<Vec<NatRule>> {
        self.get_all(&format!("network/edges/{}/nat/config/rules", edge_id), None)
            .await
    }

    async fn get_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<NatRule> {
        self.get(&format!("network/edges/{}/nat/config/rules/{}", edge_id, rule_id))
            .await
    }

    async fn create_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule> {
        let base = format!("network/edges/{}/nat/config/rules", edge_id);
        self.create(&base, rule, |id| format!("{}/{}", base, id)).await
    }

    async fn update_nat_rule(&self, edge_id: &str, rule: &NatRule) -> Result<NatRule> {
        self.replace(&format!("network/edges/{}/nat/config/rules/{}", edge_id, rule.id), rule)
            .await
    }

    async fn delete_nat_rule(&self, edge_id: &str, rule_id: &str) -> Result<()> {
        self.remove(&format!("network/edges/{}/nat/config/rules/{}", edge_id, rule_id))
            .await
    }

    // Load balancer application profiles

    async fn list_lb_app_profiles(&self, edge_id: &str) -> Result<Vec<LbAppProfile>> {
        self.get_all(
            &format!("network/edges/{}/loadbalancer/config/applicationprofiles", edge_id),
            None,
        )
        .await
    }

    async fn get_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<LbAppProfile> {
        self.get(&format!(
            "network/edges/{}/loadbalancer/config/applicationprofiles/{}",
            edge_id, id
        ))
        .await
    }

    async fn create_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile> {
        let base = format!("network/edges/{}/loadbalancer/config/applicationprofiles", edge_id);
        self.create(&base, profile, |id| format!("{}/{}", base, id)).await
    }

    async fn update_lb_app_profile(
        &self,
        edge_id: &str,
        profile: &LbAppProfile,
    ) -> Result<LbAppProfile> {
        self.replace(
            &format!(
                "network/edges/{}/loadbalancer/config/applicationprofiles/{}",
                edge_id, profile.id
            ),
            profile,
        )
        .await
    }

    async fn delete_lb_app_profile(&self, edge_id: &str, id: &str) -> Result<()> {
        self.remove(&format!(
            "network/edges/{}/loadbalancer/config/applicationprofiles/{}",
            edge_id, id
        ))
        .await
    }

    // IP sets

    async fn list_ipsets(&self, vdc_id: &str) -> Result<Vec<IpSet>> {
        self.get_all(&format!("network/services/ipset/scope/{}", vdc_id), None)
            .await
    }

    async fn get_ipset(&self, _vdc_id: &str, id: &str) -> Result<IpSet> {
        self.get(&format!("network/services/ipset/{}", id)).await
    }

    async fn create_ipset(&self, vdc_id: &str, ipset: &IpSet) -> Result<IpSet> {
        self.create(&format!("network/services/ipset/scope/{}", vdc_id), ipset, |id| {
            format!("network/services/ipset/{}", id)
        })
        .await
    }

    async fn update_ipset(&self, _vdc_id: &str, ipset: &IpSet) -> Result<IpSet> {
        self.replace(&format!("network/services/ipset/{}", ipset.id), ipset).await
    }

    async fn delete_ipset(&self, _vdc_id: &str, id: &str) -> Result<()> {
        self.remove(&format!("network/services/ipset/{}", id)).await
    }

    // vApps

    async fn list_vapps(&self, vdc_id: &str) -> Result<Vec<VApp>> {
        self.get_all(&format!("cloudapi/1.0.0/vdcs/{}/vApps", vdc_id), None).await
    }

    async fn get_vapp(&self, id: &str) -> Result<VApp> {
        self.get(&format!("cloudapi/1.0.0/vApps/{}", id)).await
    }

    async fn create_vapp(&self, vdc_id: &str, vapp: &VApp) -> Result<VApp> {
        self.create(&format!("cloudapi/1.0.0/vdcs/{}/vApps", vdc_id), vapp, |id| {
            format!("cloudapi/1.0.0/vApps/{}", id)
        })
        .await
    }

    async fn update_vapp(&self, vapp: &VApp) -> Result<VApp> {
        self.replace(&format!("cloudapi/1.0.0/vApps/{}", vapp.id), vapp).await
    }

    async fn set_vapp_power(&self, id: &str, power_on: bool) -> Result<()> {
        let action = if power_on { "powerOn" } else { "powerOff" };
        self.action(&format!("cloudapi/1.0.0/vApps/{}/actions/{}", id, action))
            .await
    }

    async fn delete_vapp(&self, id: &str) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/vApps/{}", id)).await
    }

    // Metadata

    async fn get_metadata(&self, target: &MetadataTarget) -> Result<Vec<MetadataEntry>> {
        self.get_all(&format!("cloudapi/1.0.0/entities/{}/metadata", target.id), None)
            .await
    }

    async fn set_metadata_entry(
        &self,
        target: &MetadataTarget,
        entry: &MetadataEntry,
    ) -> Result<()> {
        let path = format!(
            "cloudapi/1.0.0/entities/{}/metadata/{}",
            target.id,
            key_segment(&entry.key)
        );
        let body = serde_json::to_value(entry).context("Failed to serialize metadata entry")?;
        self.execute(Method::PUT, &path, Some(body)).await.map(|_| ())
    }

    async fn delete_metadata_entry(&self, target: &MetadataTarget, key: &str) -> Result<()> {
        self.remove(&format!(
            "cloudapi/1.0.0/entities/{}/metadata/{}",
            target.id,
            key_segment(key)
        ))
        .await
    }

    // NSX-T ALB controllers

    async fn list_alb_controllers(&self) -> Result<Vec<AlbController>> {
        self.get_all("cloudapi/1.0.0/loadBalancer/controllers", None).await
    }

    async fn get_alb_controller(&self, id: &str) -> Result<AlbController> {
        self.get(&format!("cloudapi/1.0.0/loadBalancer/controllers/{}", id)).await
    }

    async fn create_alb_controller(&self, controller: &AlbController) -> Result<AlbController> {
        self.create("cloudapi/1.0.0/loadBalancer/controllers", controller, |id| {
            format!("cloudapi/1.0.0/loadBalancer/controllers/{}", id)
        })
        .await
    }

    async fn update_alb_controller(&self, controller: &AlbController) -> Result<AlbController> {
        self.replace(
            &format!("cloudapi/1.0.0/loadBalancer/controllers/{}", controller.id),
            controller,
        )
        .await
    }

    async fn delete_alb_controller(&self, id: &str) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/loadBalancer/controllers/{}", id))
            .await
    }

    // NSX-T ALB clouds

    async fn list_alb_clouds(&self) -> Result<Vec<AlbCloud>> {
        self.get_all("cloudapi/1.0.0/loadBalancer/clouds", None).await
    }

    async fn get_alb_cloud(&self, id: &str) -> Result<AlbCloud> {
        self.get(&format!("cloudapi/1.0.0/loadBalancer/clouds/{}", id)).await
    }

    async fn create_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud> {
        self.create("cloudapi/1.0.0/loadBalancer/clouds", cloud, |id| {
            format!("cloudapi/1.0.0/loadBalancer/clouds/{}", id)
        })
        .await
    }

    async fn update_alb_cloud(&self, cloud: &AlbCloud) -> Result<AlbCloud> {
        self.replace(&format!("cloudapi/1.0.0/loadBalancer/clouds/{}", cloud.id), cloud)
            .await
    }

    async fn delete_alb_cloud(&self, id: &str) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/loadBalancer/clouds/{}", id)).await
    }

    // NSX-T ALB service engine groups

    async fn list_alb_service_engine_groups(&self) -> Result<Vec<AlbServiceEngineGroup>> {
        self.get_all("cloudapi/1.0.0/loadBalancer/serviceEngineGroups", None)
            .await
    }

    async fn get_alb_service_engine_group(&self, id: &str) -> Result<AlbServiceEngineGroup> {
        self.get(&format!("cloudapi/1.0.0/loadBalancer/serviceEngineGroups/{}", id))
            .await
    }

    async fn create_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup> {
        self.create("cloudapi/1.0.0/loadBalancer/serviceEngineGroups", seg, |id| {
            format!("cloudapi/1.0.0/loadBalancer/serviceEngineGroups/{}", id)
        })
        .await
    }

    async fn update_alb_service_engine_group(
        &self,
        seg: &AlbServiceEngineGroup,
    ) -> Result<AlbServiceEngineGroup> {
        self.replace(
            &format!("cloudapi/1.0.0/loadBalancer/serviceEngineGroups/{}", seg.id),
            seg,
        )
        .await
    }

    async fn delete_alb_service_engine_group(&self, id: &str) -> Result<()> {
        self.remove(&format!("cloudapi/1.0.0/loadBalancer/serviceEngineGroups/{}", id))
            .await
    }

    // NSX-T ALB edge gateway settings

    async fn get_alb_settings(&self, edge_id: &str) -> Result<AlbSettings> {
        self.get(&format!("cloudapi/1.0.0/edgeGateways/{}/loadBalancer", edge_id))
            .await
    }

    async fn update_alb_settings(
        &self,
        edge_id: &str,
        settings: &AlbSettings,
    ) -> Result<AlbSettings> {
        self.replace(
            &format!("cloudapi/1.0.0/edgeGateways/{}/loadBalancer", edge_id),
            settings,
        )
        .await
    }

    // NSX-T ALB service engine group assignments

    async fn list_alb_seg_assignments(&self, edge_id: &str) -> Result<Vec<AlbSegAssignment>> {
        self.get_all(
            "cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments",
            Some(&eq_filter("gatewayRef.id", edge_id)),
        )
        .await
    }

    async fn get_alb_seg_assignment(&self, id: &str) -> Result<AlbSegAssignment> {
        self.get(&format!(
            "cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments/{}",
            id
        ))
        .await
    }

    async fn create_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment> {
        self.create(
            "cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments",
            assignment,
            |id| format!("cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments/{}", id),
        )
        .await
    }

    async fn update_alb_seg_assignment(
        &self,
        assignment: &AlbSegAssignment,
    ) -> Result<AlbSegAssignment> {
        self.replace(
            &format!(
                "cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments/{}",
                assignment.id
            ),
            assignment,
        )
        .await
    }

    async fn delete_alb_seg_assignment(&self, id: &str) -> Result<()> {
        self.remove(&format!(
            "cloudapi/1.0.0/loadBalancer/serviceEngineGroups/assignments/{}",
            id
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_and_strips() {
        let long = "x".repeat(500);
        let out = sanitize_for_log(&long);
        assert!(out.contains("truncated, 500 bytes total"));
        assert_eq!(sanitize_for_log("a\u{0007}b\nc"), "abc");
    }

    #[test]
    fn test_error_message_prefers_backend_message() {
        let body = r#"{"minorErrorCode":"BAD_REQUEST","message":"name already used"}"#;
        assert_eq!(error_message(StatusCode::BAD_REQUEST, body), "name already used");
        assert_eq!(error_message(StatusCode::FORBIDDEN, "<html>"), "Permission denied.");
    }

    #[test]
    fn test_eq_filter() {
        assert_eq!(eq_filter("vdcId", "urn:vcloud:vdc:1"), "vdcId==urn:vcloud:vdc:1");
        assert_eq!(key_segment("a b/c"), "a%20b%2Fc");
    }
}
