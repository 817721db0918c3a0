pub mod audit;
pub mod context;
pub mod ownership;
pub mod query_guard;
pub mod rate_limit;
pub mod roles;

pub use audit::{
    create_audit_logger, ActorType, AuditActor, AuditConfig, AuditEvent, AuditEventCategory,
    AuditEventType, AuditLogger, AuditOutcome, AuditQuery, AuditQueryResult, AuditSeverity,
    AuditStore, InMemoryAuditStore,
};
pub use context::{HintSource, SecurityContext, SecurityContextResolver, TenantHints};
pub use ownership::OwnershipValidator;
pub use query_guard::{
    is_collection_allowed, sanitize_identifier, validate_intent, GuardOptions, GuardedQuery,
    QueryGuard, QueryIntent, MEMBERSHIP_ACTIVE_FIELD, ORGANIZATION_FIELD,
};
pub use rate_limit::{FixedWindowLimiter, RateLimitConfig};
pub use roles::{has_permission, role_level, OrgRole};
