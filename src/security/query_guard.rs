use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::sync::{Arc, LazyLock};
use tracing::warn;

use crate::error::CoreError;
use crate::security::audit::{AuditLogger, AuditStore};
use crate::security::context::SecurityContext;

pub const ORGANIZATION_FIELD: &str = "organization_id";
pub const MEMBERSHIP_ACTIVE_FIELD: &str = "membership_is_active";

static ALLOWED_COLLECTIONS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    HashSet::from([
        "ideas",
        "drafts",
        "content_items",
        "work_items",
        "memberships",
        "organizations",
        "audit_events",
    ])
});

/// Substring screen against intents assembled from less-trusted paths.
/// This is defense-in-depth over parameterized execution downstream, not a
/// substitute for it.
static DANGEROUS_PATTERNS: &[&str] = &["union select", "drop table", "delete from"];

/// A data-access intent as assembled by the caller, before the tenant
/// filter has been proven or injected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryIntent {
    pub collection: String,
    pub filter: Map<String, Value>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl QueryIntent {
    pub fn read(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filter: Map::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_filter(mut self, key: &str, value: Value) -> Self {
        self.filter.insert(key.to_string(), value);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// An intent that has been proven to carry a correct tenant filter, or was
/// explicitly exempted through the audited super-admin branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardedQuery {
    pub intent: QueryIntent,
    pub bypassed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GuardOptions {
    /// When false (the default) the guarded intent also requires the
    /// caller's membership in the owning organization to be active.
    pub include_inactive: bool,
}

pub fn sanitize_identifier(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect()
}

pub fn is_collection_allowed(collection: &str) -> bool {
    let sanitized = sanitize_identifier(collection);
    ALLOWED_COLLECTIONS.contains(sanitized.as_str())
}

/// Reject intents targeting unknown collections or carrying SQL-shaped
/// payloads. Heuristic screen; see `DANGEROUS_PATTERNS`.
pub fn validate_intent(intent: &QueryIntent) -> Result<(), CoreError> {
    if !is_collection_allowed(&intent.collection) {
        return Err(CoreError::Security(format!(
            "collection '{}' is not queryable",
            intent.collection
        )));
    }

    let serialized = serde_json::to_string(intent)
        .map_err(|e| CoreError::Security(format!("unserializable intent: {e}")))?
        .to_lowercase();

    for pattern in DANGEROUS_PATTERNS {
        if serialized.contains(pattern) {
            return Err(CoreError::Security(format!(
                "dangerous pattern '{pattern}' detected"
            )));
        }
    }
    if serialized.contains("update ") && serialized.contains(" set ") {
        return Err(CoreError::Security(
            "dangerous pattern 'update/set' detected".to_string(),
        ));
    }

    Ok(())
}

/// Wraps every data-access intent with the mandatory tenant filter. The
/// super-admin pass-through is the single bypass branch in the crate and is
/// always audited.
pub struct QueryGuard<S: AuditStore> {
    audit: Arc<AuditLogger<S>>,
}

impl<S: AuditStore> QueryGuard<S> {
    pub fn new(audit: Arc<AuditLogger<S>>) -> Self {
        Self { audit }
    }

    pub async fn secure(
        &self,
        intent: QueryIntent,
        ctx: &SecurityContext,
        opts: GuardOptions,
    ) -> Result<GuardedQuery, CoreError> {
        validate_intent(&intent)?;

        if ctx.is_super_admin {
            self.audit
                .log_admin_override(
                    ctx.actor(),
                    ctx.organization_id,
                    "query executed without tenant filter injection",
                    json!({
                        "collection": intent.collection,
                        "filter": Value::Object(intent.filter.clone()),
                    }),
                )
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
            return Ok(GuardedQuery {
                intent,
                bypassed: true,
            });
        }

        let mut intent = intent;
        let tenant_value = json!(ctx.organization_id.to_string());

        match intent.filter.get(ORGANIZATION_FIELD) {
            None => {
                intent
                    .filter
                    .insert(ORGANIZATION_FIELD.to_string(), tenant_value);
            }
            Some(existing) if *existing == tenant_value => {
                // Already correctly scoped; injection is idempotent.
            }
            Some(existing) => {
                if let Err(e) = self
                    .audit
                    .log_query_rejected(
                        ctx.actor(),
                        Some(ctx.organization_id),
                        &format!(
                            "intent names foreign tenant {existing} on {}",
                            intent.collection
                        ),
                    )
                    .await
                {
                    warn!("audit write failed for rejected query: {e}");
                }
                return Err(CoreError::conflicting_tenant_filter());
            }
        }

        if !opts.include_inactive {
            intent
                .filter
                .insert(MEMBERSHIP_ACTIVE_FIELD.to_string(), json!(true));
        }

        if let Some(limit) = intent.limit {
            intent.limit = Some(limit.clamp(1, 1000));
        }
        if let Some(offset) = intent.offset {
            intent.offset = Some(offset.max(0));
        }

        if let Err(e) = self
            .audit
            .log_query_guarded(ctx.actor(), ctx.organization_id, &intent.collection)
            .await
        {
            warn!("audit write failed for guarded query: {e}");
        }

        Ok(GuardedQuery {
            intent,
            bypassed: false,
        })
    }
}
