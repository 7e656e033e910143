//! VCD Client
//!
//! Session handle handed to every dispatcher. It carries the backend, the
//! provider defaults, the per-parent lock table and the host's cancellation
//! signal, and resolves parent entities (organization, VDC, edge gateway)
//! from a state bag.

use super::backend::VcdBackend;
use super::types::{AdminOrg, EdgeGateway, Vdc, VnicKind};
use crate::config::ProviderConfig;
use crate::error::{
    is_not_found, VcdError, ERR_EDGE_NOT_FOUND, ERR_EMPTY_ORG, ERR_EMPTY_VDC, ERR_ORG_NOT_FOUND,
    ERR_VDC_NOT_FOUND,
};
use crate::locks::{edge_gateway_key, ParentLockGuard, ParentLocks};
use crate::state::ResourceData;
use anyhow::{anyhow, bail, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Default bound for waiting on a just-created entity to become visible
pub const DEFAULT_VISIBILITY_WAIT: Duration = Duration::from_secs(5);
const VISIBILITY_POLL: Duration = Duration::from_millis(500);

/// Network type tag used by NAT rules for uplinks
pub const NETWORK_TYPE_EXT: &str = "ext";
/// Network type tag used by NAT rules for org networks
pub const NETWORK_TYPE_ORG: &str = "org";

struct Session {
    config: ProviderConfig,
    backend: Arc<dyn VcdBackend>,
    locks: Arc<ParentLocks>,
    visibility_wait: Duration,
}

/// Session-scoped client. Cloning is cheap and shares the session.
#[derive(Clone)]
pub struct VcdClient {
    session: Arc<Session>,
    cancel: CancellationToken,
}

impl VcdClient {
    pub fn new(config: ProviderConfig, backend: Arc<dyn VcdBackend>) -> Self {
        Self {
            session: Arc::new(Session {
                config,
                backend,
                locks: Arc::new(ParentLocks::new()),
                visibility_wait: DEFAULT_VISIBILITY_WAIT,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// Same session with a different visibility bound. Every handle keeps
    /// locking against the one lock table.
    pub fn with_visibility_wait(self, wait: Duration) -> Self {
        let session = Session {
            config: self.session.config.clone(),
            backend: Arc::clone(&self.session.backend),
            locks: Arc::clone(&self.session.locks),
            visibility_wait: wait,
        };
        Self {
            session: Arc::new(session),
            cancel: self.cancel,
        }
    }

    /// Handle for one host call: same session, the host's cancellation signal.
    pub fn with_cancel(&self, cancel: CancellationToken) -> Self {
        Self {
            session: Arc::clone(&self.session),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.session.config
    }

    pub fn backend(&self) -> &dyn VcdBackend {
        self.session.backend.as_ref()
    }

    pub fn locks(&self) -> &ParentLocks {
        &self.session.locks
    }

    pub fn import_separator(&self) -> &str {
        self.session.config.separator()
    }

    /// Run a backend future unless the host cancels first. A cancelled
    /// future is dropped, which stops any task polling inside it.
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.cancel.is_cancelled() {
            return Err(VcdError::Cancelled.into());
        }
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VcdError::Cancelled.into()),
            result = fut => result,
        }
    }

    /// Take the mutex of an edge gateway. Held until the guard drops.
    pub async fn lock_edge_gateway(&self, edge: &EdgeGateway) -> Result<ParentLockGuard> {
        let key = edge_gateway_key(&edge.id);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(VcdError::Cancelled.into()),
            guard = self.session.locks.lock(&key) => {
                tracing::info!("Locked edge gateway {} ({})", edge.name, edge.id);
                Ok(guard)
            }
        }
    }

    pub async fn backend_version(&self) -> Result<String> {
        self.call(self.backend().version()).await
    }

    // =========================================================================
    // Parent resolution
    // =========================================================================

    /// `org` from the bag, else the provider default.
    pub fn org_name(&self, d: &ResourceData) -> Result<String> {
        let name = d.get_str("org");
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        if !self.config().org.is_empty() {
            return Ok(self.config().org.clone());
        }
        bail!(ERR_EMPTY_ORG)
    }

    /// `vdc` from the bag, else the provider default.
    pub fn vdc_name(&self, d: &ResourceData) -> Result<String> {
        let name = d.get_str("vdc");
        if !name.is_empty() {
            return Ok(name.to_string());
        }
        if !self.config().vdc.is_empty() {
            return Ok(self.config().vdc.clone());
        }
        bail!(ERR_EMPTY_VDC)
    }

    /// Find an organization by ID, falling back to a case-insensitive name
    /// match. A miss is a parent-resolution failure, not drift.
    pub async fn get_org(&self, name_or_id: &str) -> Result<AdminOrg> {
        self.find_org(name_or_id)
            .await?
            .ok_or_else(|| anyhow!("{}: {}", ERR_ORG_NOT_FOUND, name_or_id))
    }

    /// Like [`Self::get_org`] but reports absence as `None`.
    pub async fn find_org(&self, name_or_id: &str) -> Result<Option<AdminOrg>> {
        if looks_like_id(name_or_id) {
            match self.call(self.backend().get_org(name_or_id)).await {
                Ok(org) => return Ok(Some(org)),
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e),
            }
        }
        let orgs = self.call(self.backend().list_orgs()).await?;
        Ok(orgs.into_iter().find(|o| o.name.eq_ignore_ascii_case(name_or_id)))
    }

    pub async fn get_vdc(&self, org: &AdminOrg, name_or_id: &str) -> Result<Vdc> {
        self.find_vdc(org, name_or_id).await?.ok_or_else(|| {
            anyhow!("{}: {} (organization {})", ERR_VDC_NOT_FOUND, name_or_id, org.name)
        })
    }

    pub async fn find_vdc(&self, org: &AdminOrg, name_or_id: &str) -> Result<Option<Vdc>> {
        if looks_like_id(name_or_id) {
            match self.call(self.backend().get_vdc(name_or_id)).await {
                Ok(vdc) => return Ok(Some(vdc)),
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e),
            }
        }
        let vdcs = self.call(self.backend().list_vdcs(&org.id)).await?;
        Ok(vdcs.into_iter().find(|v| v.name.eq_ignore_ascii_case(name_or_id)))
    }

    pub async fn get_edge_gateway(&self, vdc: &Vdc, name_or_id: &str) -> Result<EdgeGateway> {
        if looks_like_id(name_or_id) {
            match self.call(self.backend().get_edge_gateway(name_or_id)).await {
                Ok(edge) => return Ok(edge),
                Err(e) if is_not_found(&e) => {}
                Err(e) => return Err(e),
            }
        }
        let edges = self.call(self.backend().list_edge_gateways(&vdc.id)).await?;
        edges
            .into_iter()
            .find(|e| e.name.eq_ignore_ascii_case(name_or_id))
            .ok_or_else(|| anyhow!("{}: {} (VDC {})", ERR_EDGE_NOT_FOUND, name_or_id, vdc.name))
    }

    /// Resolve the organization named by the bag.
    pub async fn org_from(&self, d: &ResourceData) -> Result<AdminOrg> {
        let name = self.org_name(d)?;
        self.get_org(&name).await
    }

    /// Resolve the organization and VDC named by the bag.
    pub async fn org_and_vdc(&self, d: &ResourceData) -> Result<(AdminOrg, Vdc)> {
        let org = self.org_from(d).await?;
        let vdc_name = self.vdc_name(d)?;
        let vdc = self.get_vdc(&org, &vdc_name).await?;
        Ok((org, vdc))
    }

    /// Resolve the edge gateway named by `attr` in the bag, with its parents.
    pub async fn edge_gateway_from(
        &self,
        d: &ResourceData,
        attr: &str,
    ) -> Result<(AdminOrg, Vdc, EdgeGateway)> {
        let (org, vdc) = self.org_and_vdc(d).await?;
        let edge_name = d.get_str(attr);
        if edge_name.is_empty() {
            bail!("{}: `{}` is empty", ERR_EDGE_NOT_FOUND, attr);
        }
        let edge = self.get_edge_gateway(&vdc, edge_name).await?;
        Ok((org, vdc, edge))
    }

    // =========================================================================
    // Eventual visibility
    // =========================================================================

    /// Poll `probe` until it yields `Some`, bounded by the session's
    /// visibility wait. Gives up with `None` rather than retrying forever.
    pub async fn wait_until_visible<T, F, Fut>(&self, what: &str, mut probe: F) -> Result<Option<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let deadline = tokio::time::Instant::now() + self.session.visibility_wait;
        loop {
            if let Some(found) = self.call(probe()).await? {
                return Ok(Some(found));
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!("{} not visible after {:?}", what, self.session.visibility_wait);
                return Ok(None);
            }
            tracing::debug!("{} not visible yet, retrying", what);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(VcdError::Cancelled.into()),
                _ = tokio::time::sleep(VISIBILITY_POLL) => {}
            }
        }
    }
}

/// Is this string an entity ID (`urn:vcloud:<type>:<uuid>` or a bare UUID)?
pub fn looks_like_id(s: &str) -> bool {
    if let Some(rest) = s.strip_prefix("urn:vcloud:") {
        return rest
            .rsplit_once(':')
            .is_some_and(|(_, uuid)| Uuid::parse_str(uuid).is_ok());
    }
    Uuid::parse_str(s).is_ok()
}

// =========================================================================
// Edge gateway vNIC resolution
// =========================================================================

fn vnic_kind_for(network_type: &str) -> Result<VnicKind> {
    match network_type {
        NETWORK_TYPE_EXT => Ok(VnicKind::Uplink),
        NETWORK_TYPE_ORG => Ok(VnicKind::Internal),
        other => bail!("unknown network type {:?}: expected ext or org", other),
    }
}

fn find_vnic(edge: &EdgeGateway, network_name: &str, kind: VnicKind) -> Option<u32> {
    edge.vnics
        .iter()
        .find(|v| v.kind == kind && v.network_name == network_name)
        .map(|v| v.index)
}

/// vNIC index of `network_name` on `edge`. Org networks attached as a
/// sub-interface are found on the second try.
pub fn vnic_index(edge: &EdgeGateway, network_name: &str, network_type: &str) -> Result<u32> {
    let kind = vnic_kind_for(network_type)?;
    if let Some(index) = find_vnic(edge, network_name, kind) {
        return Ok(index);
    }
    if kind == VnicKind::Internal {
        if let Some(index) = find_vnic(edge, network_name, VnicKind::Subinterface) {
            return Ok(index);
        }
    }
    bail!(
        "unable to find vNIC for network {:?} of type {:?} on edge gateway {}",
        network_name,
        network_type,
        edge.name
    )
}

/// Network name and type tag attached at vNIC `index`.
pub fn vnic_network(edge: &EdgeGateway, index: u32) -> Result<(String, &'static str)> {
    let vnic = edge
        .vnics
        .iter()
        .find(|v| v.index == index)
        .ok_or_else(|| anyhow!("edge gateway {} has no vNIC {}", edge.name, index))?;
    let network_type = match vnic.kind {
        VnicKind::Uplink => NETWORK_TYPE_EXT,
        VnicKind::Internal | VnicKind::Subinterface => NETWORK_TYPE_ORG,
        VnicKind::Trunk => bail!("vNIC {} on edge gateway {} is a trunk", index, edge.name),
    };
    Ok((vnic.network_name.clone(), network_type))
}
