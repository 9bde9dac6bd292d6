//! Tenant lookup for the checks that gate work on tenant standing.
//!
//! The platform's control plane owns tenant records; the engine only needs
//! plan and standing, so the port is a read-only profile lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Commercial plan a tenant subscribes to. Ordering follows entitlements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanTier {
    Starter,
    Professional,
    Enterprise,
}

impl PlanTier {
    /// Fiscal invoice numbering is sold on the upper tiers only.
    pub fn includes_fiscal_codes(&self) -> bool {
        matches!(self, PlanTier::Professional | PlanTier::Enterprise)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantProfile {
    pub id: Uuid,
    pub name: String,
    pub plan: PlanTier,
    pub active: bool,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn profile(&self, tenant_id: Uuid) -> CoreResult<Option<TenantProfile>>;

    /// Every known tenant. Background sweeps iterate this.
    async fn all(&self) -> CoreResult<Vec<TenantProfile>>;

    /// Profile of a tenant in good standing. Suspended tenants take no new
    /// work even though their existing shipments keep moving.
    async fn require_active(&self, tenant_id: Uuid) -> CoreResult<TenantProfile> {
        let profile = self
            .profile(tenant_id)
            .await?
            .ok_or_else(|| CoreError::not_found("tenant", tenant_id))?;
        if !profile.active {
            return Err(CoreError::Validation(format!(
                "tenant {tenant_id} is suspended"
            )));
        }
        Ok(profile)
    }
}

/// Fixed roster of tenants, for wiring tests and single-node deployments.
#[derive(Debug, Default, Clone)]
pub struct StaticTenantDirectory {
    tenants: HashMap<Uuid, TenantProfile>,
}

impl StaticTenantDirectory {
    pub fn new(profiles: impl IntoIterator<Item = TenantProfile>) -> Self {
        Self {
            tenants: profiles.into_iter().map(|p| (p.id, p)).collect(),
        }
    }

    pub fn insert(&mut self, profile: TenantProfile) {
        self.tenants.insert(profile.id, profile);
    }
}

#[async_trait]
impl TenantDirectory for StaticTenantDirectory {
    async fn profile(&self, tenant_id: Uuid) -> CoreResult<Option<TenantProfile>> {
        Ok(self.tenants.get(&tenant_id).cloned())
    }

    async fn all(&self) -> CoreResult<Vec<TenantProfile>> {
        Ok(self.tenants.values().cloned().collect())
    }
}
