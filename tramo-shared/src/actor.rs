use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of the caller performing an operation.
///
/// Roles are resolved by the authentication layer (out of scope here) and
/// arrive as part of the request context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Warehouse staff at origin or destination.
    Operator,
    /// Plans routes and assigns shipments to couriers.
    Dispatcher,
    /// Drives a route and records delivery outcomes.
    Courier,
    /// The receiving client confirming shipments.
    Client,
    /// Privileged cross-tenant operator.
    PlatformAdmin,
    /// Internal maintenance jobs (reconciliation).
    System,
}

impl Role {
    /// Whether this role may touch entities of any tenant.
    pub fn is_cross_tenant(&self) -> bool {
        matches!(self, Self::PlatformAdmin)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Operator => "operator",
            Self::Dispatcher => "dispatcher",
            Self::Courier => "courier",
            Self::Client => "client",
            Self::PlatformAdmin => "platform_admin",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller: tenant identity plus role.
///
/// Every service entry point takes an `Actor`; tenant scoping and the
/// operation policy are both checked against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub tenant_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(tenant_id: Uuid, role: Role) -> Self {
        Self { tenant_id, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_platform_admin_crosses_tenants() {
        assert!(Role::PlatformAdmin.is_cross_tenant());
        for role in [
            Role::Operator,
            Role::Dispatcher,
            Role::Courier,
            Role::Client,
            Role::System,
        ] {
            assert!(!role.is_cross_tenant());
        }
    }

    #[test]
    fn role_serializes_snake_case() {
        let json = serde_json::to_string(&Role::PlatformAdmin).unwrap();
        assert_eq!(json, "\"platform_admin\"");
    }
}
