use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::content::{ResourceKind, WorkItem, WorkItemStore};
use crate::directory::DirectoryStore;
use crate::error::CoreError;
use crate::security::audit::{AuditLogger, AuditStore};
use crate::security::context::SecurityContext;

/// Confirms a resource belongs to the resolved tenant before any mutation.
/// The membership check runs first: an ownership probe against a tenant the
/// caller is not part of must not touch item storage at all.
pub struct OwnershipValidator<D, W, S>
where
    D: DirectoryStore,
    W: WorkItemStore,
    S: AuditStore,
{
    directory: D,
    items: W,
    audit: Arc<AuditLogger<S>>,
}

impl<D, W, S> OwnershipValidator<D, W, S>
where
    D: DirectoryStore,
    W: WorkItemStore,
    S: AuditStore,
{
    pub fn new(directory: D, items: W, audit: Arc<AuditLogger<S>>) -> Self {
        Self {
            directory,
            items,
            audit,
        }
    }

    /// True iff exactly one row matches `{id, kind, ctx.organization_id}`.
    /// A resource that exists under another tenant reads as absent.
    pub async fn owns(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        ctx: &SecurityContext,
    ) -> Result<bool, CoreError> {
        if !self.caller_is_in_tenant(ctx).await? {
            self.note_denied(ctx, kind, resource_id, "caller has no active membership")
                .await;
            return Ok(false);
        }

        let found = self
            .items
            .find_scoped(kind, resource_id, ctx.organization_id)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?;

        if found.is_none() {
            self.note_denied(ctx, kind, resource_id, "not in tenant").await;
        }
        Ok(found.is_some())
    }

    /// Ownership check that hands back the row. Absent and foreign-tenant
    /// resources are indistinguishable to the caller.
    pub async fn require_owned(
        &self,
        resource_id: Uuid,
        kind: ResourceKind,
        ctx: &SecurityContext,
    ) -> Result<WorkItem, CoreError> {
        if !self.caller_is_in_tenant(ctx).await? {
            self.note_denied(ctx, kind, resource_id, "caller has no active membership")
                .await;
            return Err(CoreError::NotFound {
                kind,
                id: resource_id,
            });
        }

        self.items
            .find_scoped(kind, resource_id, ctx.organization_id)
            .await
            .map_err(|e| CoreError::Storage(e.to_string()))?
            .ok_or(CoreError::NotFound {
                kind,
                id: resource_id,
            })
    }

    async fn caller_is_in_tenant(&self, ctx: &SecurityContext) -> Result<bool, CoreError> {
        if ctx.is_super_admin {
            return Ok(true);
        }
        let membership = self
            .directory
            .membership(ctx.user_id, ctx.organization_id)
            .await
            .map_err(|e| CoreError::Directory(e.to_string()))?;
        Ok(membership.map(|m| m.is_active).unwrap_or(false))
    }

    async fn note_denied(
        &self,
        ctx: &SecurityContext,
        kind: ResourceKind,
        resource_id: Uuid,
        reason: &str,
    ) {
        if let Err(e) = self
            .audit
            .log_ownership_denied(
                ctx.actor(),
                ctx.organization_id,
                &format!("{} {resource_id}: {reason}", kind.as_str()),
            )
            .await
        {
            warn!("audit write failed for ownership denial: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemoryWorkItems;
    use crate::directory::{InMemoryDirectory, Membership};
    use crate::security::audit::{create_audit_logger, InMemoryAuditStore};
    use std::collections::HashSet;

    fn ctx(user_id: Uuid, organization_id: Uuid) -> SecurityContext {
        SecurityContext {
            user_id,
            organization_id,
            user_email: "tester@acme.test".to_string(),
            organization_role: "member".to_string(),
            permissions: HashSet::new(),
            is_super_admin: false,
        }
    }

    async fn validator_with(
        memberships: Vec<Membership>,
        items: Vec<WorkItem>,
    ) -> OwnershipValidator<InMemoryDirectory, InMemoryWorkItems, InMemoryAuditStore> {
        let directory = InMemoryDirectory::new();
        for m in memberships {
            directory.add_membership(m).await;
        }
        let store = InMemoryWorkItems::new();
        for item in items {
            store.insert(item).await.unwrap();
        }
        OwnershipValidator::new(directory, store, Arc::new(create_audit_logger()))
    }

    #[tokio::test]
    async fn test_owns_in_tenant_resource() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let item = WorkItem::new(org, ResourceKind::Draft, "q3 brief", user);
        let id = item.id;
        let validator =
            validator_with(vec![Membership::new(user, org, "member")], vec![item]).await;

        assert!(validator
            .owns(id, ResourceKind::Draft, &ctx(user, org))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_foreign_tenant_resource_reads_as_absent() {
        let user = Uuid::new_v4();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let foreign_item =
            WorkItem::new(org_b, ResourceKind::ContentItem, "their banner", Uuid::new_v4());
        let id = foreign_item.id;
        let validator = validator_with(
            vec![Membership::new(user, org_a, "member")],
            vec![foreign_item],
        )
        .await;

        // The resource exists, just not in the caller's tenant.
        assert!(!validator
            .owns(id, ResourceKind::ContentItem, &ctx(user, org_a))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_no_membership_short_circuits_without_storage_read() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let item = WorkItem::new(org, ResourceKind::Idea, "concept", Uuid::new_v4());
        let id = item.id;
        // Caller has no membership row in the directory at all.
        let validator = validator_with(vec![], vec![item]).await;

        assert!(!validator
            .owns(id, ResourceKind::Idea, &ctx(user, org))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_inactive_membership_denies_ownership() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let item = WorkItem::new(org, ResourceKind::Draft, "old work", user);
        let id = item.id;
        let validator = validator_with(
            vec![Membership::new(user, org, "member").deactivated()],
            vec![item],
        )
        .await;

        assert!(!validator
            .owns(id, ResourceKind::Draft, &ctx(user, org))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_not_ownership() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let item = WorkItem::new(org, ResourceKind::Idea, "concept", user);
        let id = item.id;
        let validator =
            validator_with(vec![Membership::new(user, org, "member")], vec![item]).await;

        assert!(!validator
            .owns(id, ResourceKind::ContentItem, &ctx(user, org))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_require_owned_hides_foreign_existence() {
        let user = Uuid::new_v4();
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let foreign = WorkItem::new(org_b, ResourceKind::Draft, "theirs", Uuid::new_v4());
        let id = foreign.id;
        let validator = validator_with(
            vec![Membership::new(user, org_a, "member")],
            vec![foreign],
        )
        .await;

        let err = validator
            .require_owned(id, ResourceKind::Draft, &ctx(user, org_a))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::NotFound {
                kind: ResourceKind::Draft,
                id,
            }
        );
    }

    #[tokio::test]
    async fn test_require_owned_returns_row() {
        let user = Uuid::new_v4();
        let org = Uuid::new_v4();
        let item = WorkItem::new(org, ResourceKind::ContentItem, "hero image", user);
        let id = item.id;
        let validator =
            validator_with(vec![Membership::new(user, org, "manager")], vec![item]).await;

        let row = validator
            .require_owned(id, ResourceKind::ContentItem, &ctx(user, org))
            .await
            .unwrap();
        assert_eq!(row.id, id);
        assert_eq!(row.organization_id, org);
    }
}
