use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemRole {
    User,
    SuperAdmin,
}

/// An authenticated principal, produced upstream of this core. Immutable for
/// the lifetime of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
    pub system_role: SystemRole,
}

impl Identity {
    pub fn user(user_id: Uuid, email: &str) -> Self {
        Self {
            user_id,
            email: email.to_string(),
            system_role: SystemRole::User,
        }
    }

    pub fn super_admin(user_id: Uuid, email: &str) -> Self {
        Self {
            user_id,
            email: email.to_string(),
            system_role: SystemRole::SuperAdmin,
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.system_role == SystemRole::SuperAdmin
    }
}

/// User-to-organization link. Only rows with `is_active` may back a
/// security context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub organization_role: String,
    pub permissions: HashSet<String>,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: Uuid, organization_id: Uuid, organization_role: &str) -> Self {
        Self {
            user_id,
            organization_id,
            organization_role: organization_role.to_string(),
            permissions: HashSet::new(),
            is_active: true,
            joined_at: Utc::now(),
        }
    }

    pub fn with_permissions(mut self, permissions: &[&str]) -> Self {
        self.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_joined_at(mut self, joined_at: DateTime<Utc>) -> Self {
        self.joined_at = joined_at;
        self
    }

    pub fn deactivated(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Read-only view of the identity/tenant directory. The core never mutates
/// membership state through this trait.
pub trait DirectoryStore: Send + Sync {
    /// Active memberships for a user, most-recently-joined first. The order
    /// is the default-tenant contract and must be stable.
    fn active_memberships(
        &self,
        user_id: Uuid,
    ) -> impl Future<Output = Result<Vec<Membership>>> + Send;

    /// The membership row for a specific user/organization pair, active or
    /// not. Callers decide what an inactive row means.
    fn membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Option<Membership>>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    memberships: Arc<RwLock<Vec<Membership>>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_membership(&self, membership: Membership) {
        let mut rows = self.memberships.write().await;
        rows.retain(|m| {
            !(m.user_id == membership.user_id && m.organization_id == membership.organization_id)
        });
        rows.push(membership);
    }

    pub async fn deactivate(&self, user_id: Uuid, organization_id: Uuid) {
        let mut rows = self.memberships.write().await;
        for m in rows.iter_mut() {
            if m.user_id == user_id && m.organization_id == organization_id {
                m.is_active = false;
            }
        }
    }
}

impl DirectoryStore for InMemoryDirectory {
    async fn active_memberships(&self, user_id: Uuid) -> Result<Vec<Membership>> {
        let rows = self.memberships.read().await;
        let mut found: Vec<Membership> = rows
            .iter()
            .filter(|m| m.user_id == user_id && m.is_active)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.joined_at.cmp(&a.joined_at));
        Ok(found)
    }

    async fn membership(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<Membership>> {
        let rows = self.memberships.read().await;
        Ok(rows
            .iter()
            .find(|m| m.user_id == user_id && m.organization_id == organization_id)
            .cloned())
    }
}
