use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use approvalcore::content::{InMemoryWorkItems, ResourceKind, WorkItem, WorkItemStore};
use approvalcore::directory::{Identity, InMemoryDirectory, Membership};
use approvalcore::error::CoreError;
use approvalcore::security::{
    create_audit_logger, AuditEventType, AuditQuery, FixedWindowLimiter, GuardOptions,
    OwnershipValidator, QueryGuard, QueryIntent, RateLimitConfig, SecurityContextResolver,
    TenantHints, ORGANIZATION_FIELD,
};
use approvalcore::workflow::{compute_progress, Stage, Status, WorkflowEngine};

#[tokio::test]
async fn manager_resolves_and_queries_within_own_tenant() {
    let directory = InMemoryDirectory::new();
    let audit = Arc::new(create_audit_logger());
    let user = Uuid::new_v4();
    let org_a = Uuid::new_v4();
    directory
        .add_membership(Membership::new(user, org_a, "manager"))
        .await;

    let resolver = SecurityContextResolver::new(directory, Arc::clone(&audit));
    let identity = Identity::user(user, "manager@acme.test");

    let ctx = resolver
        .resolve(&identity, &TenantHints::none())
        .await
        .expect("manager with one membership must resolve");
    assert_eq!(ctx.organization_id, org_a);

    let guard = QueryGuard::new(Arc::clone(&audit));
    let guarded = guard
        .secure(QueryIntent::read("work_items"), &ctx, GuardOptions::default())
        .await
        .expect("scoped query must pass the guard");
    assert_eq!(
        guarded.intent.filter.get(ORGANIZATION_FIELD),
        Some(&json!(org_a.to_string()))
    );
    assert!(!guarded.bypassed);
}

#[tokio::test]
async fn client_approves_at_content_review_creative_cannot() {
    let engine = WorkflowEngine::default();

    let outcome = engine
        .execute(
            Stage::ContentReview,
            Status::Review,
            Stage::Approved,
            Status::Approved,
            "client",
            "approve_content",
        )
        .expect("client approval at content review is legal");
    assert!(outcome.auto_follow_up.is_some(), "approval flags auto publish");

    let err = engine
        .execute(
            Stage::ContentReview,
            Status::Review,
            Stage::Approved,
            Status::Approved,
            "creative",
            "approve_content",
        )
        .unwrap_err();
    assert!(matches!(err, CoreError::IllegalTransition { .. }));
}

#[tokio::test]
async fn ownership_check_fails_across_tenants_even_when_resource_exists() {
    let directory = InMemoryDirectory::new();
    let items = InMemoryWorkItems::new();
    let audit = Arc::new(create_audit_logger());

    let user = Uuid::new_v4();
    let org_a = Uuid::new_v4();
    let org_b = Uuid::new_v4();
    directory
        .add_membership(Membership::new(user, org_a, "admin"))
        .await;

    let foreign = WorkItem::new(org_b, ResourceKind::ContentItem, "their campaign", Uuid::new_v4());
    let foreign_id = foreign.id;
    items.insert(foreign).await.unwrap();

    let resolver = SecurityContextResolver::new(directory.clone(), Arc::clone(&audit));
    let ctx = resolver
        .resolve(
            &Identity::user(user, "admin@acme.test"),
            &TenantHints::none(),
        )
        .await
        .unwrap();
    assert_eq!(ctx.organization_id, org_a);

    let validator = OwnershipValidator::new(directory, items, Arc::clone(&audit));
    let owned = validator
        .owns(foreign_id, ResourceKind::ContentItem, &ctx)
        .await
        .unwrap();
    assert!(!owned, "resource in org B must read as absent from org A");

    audit.flush().await.unwrap();
    let denials = audit
        .query(AuditQuery::new().with_event_types(vec![AuditEventType::OwnershipDenied]))
        .await
        .unwrap();
    assert_eq!(denials.total_count, 1);
}

#[tokio::test]
async fn full_pipeline_create_through_delivery() {
    let engine = WorkflowEngine::default();
    let org = Uuid::new_v4();
    let creative = Uuid::new_v4();
    let mut item = WorkItem::new(org, ResourceKind::ContentItem, "launch video", creative);

    // creative drafts and submits
    engine
        .execute(
            item.current_stage,
            item.current_status,
            Stage::Draft,
            Status::InProgress,
            "creative",
            "create_draft",
        )
        .unwrap();
    item.apply_transition(Stage::Draft, Status::InProgress);

    engine
        .execute(
            item.current_stage,
            item.current_status,
            Stage::ContentReview,
            Status::Review,
            "creative",
            "submit_for_review",
        )
        .unwrap();
    item.apply_transition(Stage::ContentReview, Status::Review);

    // client approves; the outcome carries the auto-publish row
    let approval = engine
        .execute(
            item.current_stage,
            item.current_status,
            Stage::Approved,
            Status::Approved,
            "client",
            "approve_content",
        )
        .unwrap();
    item.apply_transition(Stage::Approved, Status::Approved);

    let auto = approval.auto_follow_up.expect("auto publish flagged");
    assert_eq!(auto.action, "publish_content");
    item.apply_transition(Stage::Published, Status::Published);

    // manager wraps up delivery
    engine
        .execute(
            item.current_stage,
            item.current_status,
            Stage::Delivered,
            Status::Delivered,
            "manager",
            "deliver_content",
        )
        .unwrap();
    item.apply_transition(Stage::Delivered, Status::Delivered);
    assert!(item.is_terminal());

    let progress = compute_progress(&[item]);
    assert_eq!(progress.total, 1);
    assert_eq!(progress.percent_complete, 100);
}

#[tokio::test]
async fn super_admin_bypass_is_never_silent() {
    let directory = InMemoryDirectory::new();
    let audit = Arc::new(create_audit_logger());
    let resolver = SecurityContextResolver::new(directory, Arc::clone(&audit));

    let admin = Identity::super_admin(Uuid::new_v4(), "root@platform.test");
    let target_org = Uuid::new_v4();

    let ctx = resolver
        .resolve(&admin, &TenantHints::none().with_explicit(target_org))
        .await
        .expect("super admin may select a tenant explicitly");

    let guard = QueryGuard::new(Arc::clone(&audit));
    let guarded = guard
        .secure(QueryIntent::read("work_items"), &ctx, GuardOptions::default())
        .await
        .unwrap();
    assert!(guarded.bypassed);

    audit.flush().await.unwrap();
    let overrides = audit
        .query(AuditQuery::new().with_event_types(vec![AuditEventType::AdminOverride]))
        .await
        .unwrap();
    // one for the membership-less tenant selection, one for the unguarded query
    assert_eq!(overrides.total_count, 2);
    assert!(audit
        .query(AuditQuery::new())
        .await
        .unwrap()
        .events
        .iter()
        .all(|e| e.verify_hash()));
}

#[tokio::test]
async fn rate_limiter_caps_resolution_attempts() {
    let limiter = FixedWindowLimiter::new(RateLimitConfig {
        window_secs: 60,
        max_requests: 2,
        enabled: true,
    });

    let caller = "203.0.113.7";
    assert!(limiter.allow(caller).await);
    assert!(limiter.allow(caller).await);
    assert!(!limiter.allow(caller).await, "third call in window is refused");
    assert!(limiter.allow("198.51.100.2").await, "other callers unaffected");
}
