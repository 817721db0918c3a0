use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::directory::{DirectoryStore, Identity, Membership};
use crate::error::CoreError;
use crate::security::audit::{AuditActor, AuditLogger, AuditStore};
use crate::security::roles;

/// The resolved, request-scoped authorization bundle. Constructed fresh per
/// inbound request and discarded with it; never cached, never shared across
/// requests. Invariant: `organization_id` is an active membership of
/// `user_id`, or `is_super_admin` is set and the bypass was audited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityContext {
    pub user_id: Uuid,
    pub organization_id: Uuid,
    pub user_email: String,
    pub organization_role: String,
    pub permissions: HashSet<String>,
    pub is_super_admin: bool,
}

impl SecurityContext {
    pub fn has_permission(&self, permission: &str) -> bool {
        self.is_super_admin || self.permissions.contains(permission)
    }

    pub fn has_role(&self, required: &str) -> bool {
        self.is_super_admin || roles::has_permission(&self.organization_role, required)
    }

    pub fn actor(&self) -> AuditActor {
        AuditActor::user(self.user_id).with_email(&self.user_email)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Explicit,
    Cookie,
    Header,
}

impl HintSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Cookie => "cookie",
            Self::Header => "header",
        }
    }
}

/// Tenant-selection hints carried by the request, already parsed by the
/// transport layer. Tried in a fixed order; first matching source wins.
#[derive(Debug, Clone, Default)]
pub struct TenantHints {
    pub explicit_org: Option<Uuid>,
    pub cookie_org: Option<Uuid>,
    pub header_org: Option<Uuid>,
}

impl TenantHints {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_explicit(mut self, organization_id: Uuid) -> Self {
        self.explicit_org = Some(organization_id);
        self
    }

    pub fn with_cookie(mut self, organization_id: Uuid) -> Self {
        self.cookie_org = Some(organization_id);
        self
    }

    pub fn with_header(mut self, organization_id: Uuid) -> Self {
        self.header_org = Some(organization_id);
        self
    }

    /// The precedence contract, as data. Explicit beats cookie beats header.
    fn sources(&self) -> [(HintSource, Option<Uuid>); 3] {
        [
            (HintSource::Explicit, self.explicit_org),
            (HintSource::Cookie, self.cookie_org),
            (HintSource::Header, self.header_org),
        ]
    }
}

/// Resolves an authenticated identity plus hints into one canonical
/// `SecurityContext`. Read-only against the directory; resolution never
/// mutates membership state.
pub struct SecurityContextResolver<D: DirectoryStore, S: AuditStore> {
    directory: D,
    audit: Arc<AuditLogger<S>>,
}

impl<D: DirectoryStore, S: AuditStore> SecurityContextResolver<D, S> {
    pub fn new(directory: D, audit: Arc<AuditLogger<S>>) -> Self {
        Self { directory, audit }
    }

    pub async fn resolve(
        &self,
        identity: &Identity,
        hints: &TenantHints,
    ) -> Result<SecurityContext, CoreError> {
        let is_super_admin = identity.is_super_admin();

        for (source, hinted) in hints.sources() {
            let Some(organization_id) = hinted else {
                continue;
            };

            let membership = self
                .directory
                .membership(identity.user_id, organization_id)
                .await
                .map_err(|e| CoreError::Directory(e.to_string()))?;

            match membership {
                Some(m) if m.is_active => {
                    let ctx = self.context_from_membership(identity, &m, is_super_admin);
                    self.note_resolved(&ctx, source.as_str()).await;
                    return Ok(ctx);
                }
                _ if source == HintSource::Explicit => {
                    if is_super_admin {
                        // Membership-less tenant selection is the one
                        // deliberate bypass, and it is never silent.
                        let ctx = SecurityContext {
                            user_id: identity.user_id,
                            organization_id,
                            user_email: identity.email.clone(),
                            organization_role: "super_admin".to_string(),
                            permissions: HashSet::new(),
                            is_super_admin: true,
                        };
                        self.audit
                            .log_admin_override(
                                ctx.actor(),
                                organization_id,
                                "tenant selected without membership",
                                serde_json::json!({ "source": source.as_str() }),
                            )
                            .await
                            .map_err(|e| CoreError::Storage(e.to_string()))?;
                        return Ok(ctx);
                    }
                    return Err(CoreError::Authorization(format!(
                        "no active membership in organization {organization_id}"
                    )));
                }
                _ => {
                    // A stale cookie or header selection is not an attack,
                    // just out of date. Fall through to the next source.
                    debug!(
                        source = source.as_str(),
                        organization = %organization_id,
                        user = %identity.user_id,
                        "hinted organization has no active membership, skipping"
                    );
                }
            }
        }

        let memberships = self
            .directory
            .active_memberships(identity.user_id)
            .await
            .map_err(|e| CoreError::Directory(e.to_string()))?;

        match memberships.first() {
            Some(m) => {
                let ctx = self.context_from_membership(identity, m, is_super_admin);
                self.note_resolved(&ctx, "default_membership").await;
                Ok(ctx)
            }
            None => {
                if let Err(e) = self
                    .audit
                    .log_resolution_failed(
                        AuditActor::user(identity.user_id).with_email(&identity.email),
                        "no active organization membership",
                    )
                    .await
                {
                    warn!("audit write failed during resolution denial: {e}");
                }
                Err(CoreError::NoActiveOrganization)
            }
        }
    }

    fn context_from_membership(
        &self,
        identity: &Identity,
        membership: &Membership,
        is_super_admin: bool,
    ) -> SecurityContext {
        SecurityContext {
            user_id: identity.user_id,
            organization_id: membership.organization_id,
            user_email: identity.email.clone(),
            organization_role: membership.organization_role.clone(),
            permissions: membership.permissions.clone(),
            is_super_admin,
        }
    }

    async fn note_resolved(&self, ctx: &SecurityContext, source: &str) {
        if let Err(e) = self
            .audit
            .log_tenant_resolved(ctx.actor(), ctx.organization_id, source)
            .await
        {
            warn!("audit write failed for tenant resolution: {e}");
        }
    }
}
