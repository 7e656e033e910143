//! Configuration Management
//!
//! Process-wide provider settings: credentials, endpoint and session
//! defaults. Values come from the provider block, then the environment, then
//! an optional file under the user's config directory.

use crate::import::DEFAULT_IMPORT_SEPARATOR;
use crate::schema::{validate, Attribute, Schema};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAX_RETRY_TIMEOUT: u64 = 60;
pub const DEFAULT_API_VERSION: &str = "36.0";
pub const DEFAULT_SYS_ORG: &str = "System";

/// How the session authenticates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// User and password against the login organization
    #[default]
    Integrated,
    /// Pre-issued bearer token
    Token,
}

impl AuthType {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "integrated" => Ok(AuthType::Integrated),
            "token" => Ok(AuthType::Token),
            other => bail!("unsupported auth_type {:?}: expected integrated or token", other),
        }
    }
}

/// Provider configuration
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub user: String,
    pub password: String,
    pub token: String,
    pub auth_type: AuthType,
    /// Default organization for resources that leave `org` unset
    pub org: String,
    /// Default VDC for resources that leave `vdc` unset
    pub vdc: String,
    /// Organization used to log in
    pub sysorg: String,
    pub url: String,
    pub allow_unverified_ssl: bool,
    /// Upper bound in seconds for waiting on backend tasks
    pub max_retry_timeout: u64,
    pub import_separator: String,
    pub api_version: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            token: String::new(),
            auth_type: AuthType::Integrated,
            org: String::new(),
            vdc: String::new(),
            sysorg: String::new(),
            url: String::new(),
            allow_unverified_ssl: false,
            max_retry_timeout: DEFAULT_MAX_RETRY_TIMEOUT,
            import_separator: DEFAULT_IMPORT_SEPARATOR.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

// Credentials never reach the logs.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |s: &str| if s.is_empty() { "" } else { "***" };
        f.debug_struct("ProviderConfig")
            .field("user", &self.user)
            .field("password", &mask(&self.password))
            .field("token", &mask(&self.token))
            .field("auth_type", &self.auth_type)
            .field("org", &self.org)
            .field("vdc", &self.vdc)
            .field("sysorg", &self.sysorg)
            .field("url", &self.url)
            .field("allow_unverified_ssl", &self.allow_unverified_ssl)
            .field("max_retry_timeout", &self.max_retry_timeout)
            .field("import_separator", &self.import_separator)
            .field("api_version", &self.api_version)
            .finish()
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

impl ProviderConfig {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("vcd-provider").join("config.json"))
    }

    /// Load configuration from disk, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring malformed config file {}: {}", path.display(), e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Overlay `VCD_*` environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`; empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("VCD_USER") {
            self.user = v;
        }
        if let Some(v) = get("VCD_PASSWORD") {
            self.password = v;
        }
        if let Some(v) = get("VCD_TOKEN") {
            self.token = v;
        }
        if let Some(v) = get("VCD_AUTH_TYPE") {
            self.auth_type = AuthType::parse(&v)?;
        }
        if let Some(v) = get("VCD_ORG") {
            self.org = v;
        }
        if let Some(v) = get("VCD_VDC") {
            self.vdc = v;
        }
        if let Some(v) = get("VCD_SYS_ORG") {
            self.sysorg = v;
        }
        if let Some(v) = get("VCD_URL") {
            self.url = v;
        }
        if let Some(v) = get("VCD_ALLOW_UNVERIFIED_SSL") {
            self.allow_unverified_ssl = parse_bool(&v);
        }
        if let Some(v) = get("VCD_MAX_RETRY_TIMEOUT") {
            self.max_retry_timeout = v.parse().with_context(|| {
                format!("VCD_MAX_RETRY_TIMEOUT must be a number of seconds, got {:?}", v)
            })?;
        }
        if let Some(v) = get("VCD_IMPORT_SEPARATOR") {
            self.import_separator = v;
        }
        if let Some(v) = get("VCD_API_VERSION") {
            self.api_version = v;
        }
        Ok(())
    }

    /// Overlay an explicit provider block. `null` values are ignored.
    pub fn merge_json(&mut self, block: &Value) -> Result<()> {
        let Value::Object(overrides) = block else {
            if block.is_null() {
                return Ok(());
            }
            bail!("provider configuration must be an object");
        };
        let mut current =
            serde_json::to_value(&*self).context("Failed to serialize configuration")?;
        if let Value::Object(ref mut map) = current {
            for (key, value) in overrides {
                if !map.contains_key(key) {
                    bail!("unsupported provider attribute {:?}", key);
                }
                if !value.is_null() {
                    map.insert(key.clone(), value.clone());
                }
            }
        }
        *self = serde_json::from_value(current).context("Invalid provider configuration")?;
        Ok(())
    }

    /// Build the effective configuration: file, then environment, then `block`.
    pub fn resolve(block: &Value) -> Result<Self> {
        let mut config = Self::load();
        config.apply_env()?;
        config.merge_json(block)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no session could be built from.
    pub fn validate(&self) -> Result<()> {
        self.api_url()?;
        match self.auth_type {
            AuthType::Token if self.token.is_empty() => {
                bail!("auth_type token requires `token` (or VCD_TOKEN)")
            }
            AuthType::Integrated if self.user.is_empty() || self.password.is_empty() => {
                bail!(
                    "auth_type integrated requires `user` and `password` (or VCD_USER/VCD_PASSWORD)"
                )
            }
            _ => {}
        }
        if self.max_retry_timeout == 0 {
            bail!("max_retry_timeout must be greater than zero");
        }
        Ok(())
    }

    /// Parsed endpoint; must end in `/api`.
    pub fn api_url(&self) -> Result<Url> {
        if self.url.is_empty() {
            bail!("`url` is required (or VCD_URL), e.g. https://vcd.example.com/api");
        }
        let url = Url::parse(&self.url).with_context(|| format!("invalid url {:?}", self.url))?;
        if !url.path().trim_end_matches('/').ends_with("/api") {
            bail!("url {:?} must end with /api", self.url);
        }
        Ok(url)
    }

    /// Host root the REST paths are joined onto: the url minus `/api`, with
    /// a trailing slash so relative joins keep any path prefix.
    pub fn host_root(&self) -> Result<Url> {
        let mut url = self.api_url()?;
        let path = url.path().trim_end_matches('/').trim_end_matches("/api").to_string();
        url.set_path(&format!("{}/", path));
        url.set_query(None);
        Ok(url)
    }

    /// Organization the session logs in to.
    pub fn login_org(&self) -> &str {
        if !self.sysorg.is_empty() {
            &self.sysorg
        } else if !self.org.is_empty() {
            &self.org
        } else {
            DEFAULT_SYS_ORG
        }
    }

    pub fn max_retry(&self) -> Duration {
        Duration::from_secs(self.max_retry_timeout)
    }

    pub fn separator(&self) -> &str {
        if self.import_separator.is_empty() {
            DEFAULT_IMPORT_SEPARATOR
        } else {
            &self.import_separator
        }
    }

    /// Process-wide configuration attributes, as declared to the host.
    pub fn schema() -> Schema {
        const AUTH_TYPES: &[&str] = &["integrated", "token"];
        Schema::new()
            .attr("user", Attribute::string().optional().description("login user"))
            .attr("password", Attribute::string().optional().sensitive())
            .attr("token", Attribute::string().optional().sensitive().description("bearer token"))
            .attr(
                "auth_type",
                Attribute::string()
                    .optional()
                    .default("integrated")
                    .validate(validate::string_in_slice(AUTH_TYPES, false)),
            )
            .attr("org", Attribute::string().optional().description("default organization"))
            .attr("vdc", Attribute::string().optional().description("default VDC"))
            .attr("sysorg", Attribute::string().optional().description("login organization"))
            .attr("url", Attribute::string().optional().description("API endpoint ending in /api"))
            .attr("allow_unverified_ssl", Attribute::bool().optional().default(false))
            .attr(
                "max_retry_timeout",
                Attribute::int()
                    .optional()
                    .default(DEFAULT_MAX_RETRY_TIMEOUT as i64)
                    .validate(validate::int_between(1, 86_400)),
            )
            .attr(
                "import_separator",
                Attribute::string().optional().default(DEFAULT_IMPORT_SEPARATOR),
            )
            .attr("api_version", Attribute::string().optional().default(DEFAULT_API_VERSION))
    }
}
