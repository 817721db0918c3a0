use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventCategory {
    Authorization,
    DataAccess,
    Workflow,
    Security,
}

impl AuditEventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorization => "authorization",
            Self::DataAccess => "data_access",
            Self::Workflow => "workflow",
            Self::Security => "security",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    TenantResolved,
    TenantResolutionFailed,
    AdminOverride,
    QueryGuarded,
    QueryRejected,
    OwnershipDenied,
    PermissionDenied,
    TransitionExecuted,
    TransitionRefused,
    RateLimitExceeded,
}

impl AuditEventType {
    pub fn category(&self) -> AuditEventCategory {
        match self {
            Self::TenantResolved
            | Self::TenantResolutionFailed
            | Self::OwnershipDenied
            | Self::PermissionDenied => AuditEventCategory::Authorization,

            Self::QueryGuarded => AuditEventCategory::DataAccess,

            Self::TransitionExecuted | Self::TransitionRefused => AuditEventCategory::Workflow,

            Self::AdminOverride | Self::QueryRejected | Self::RateLimitExceeded => {
                AuditEventCategory::Security
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TenantResolved => "TENANT_RESOLVED",
            Self::TenantResolutionFailed => "TENANT_RESOLUTION_FAILED",
            Self::AdminOverride => "ADMIN_OVERRIDE",
            Self::QueryGuarded => "QUERY_GUARDED",
            Self::QueryRejected => "QUERY_REJECTED",
            Self::OwnershipDenied => "OWNERSHIP_DENIED",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::TransitionExecuted => "TRANSITION_EXECUTED",
            Self::TransitionRefused => "TRANSITION_REFUSED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
        }
    }

    pub fn severity(&self) -> AuditSeverity {
        match self {
            Self::AdminOverride => AuditSeverity::Critical,

            Self::TenantResolutionFailed
            | Self::QueryRejected
            | Self::OwnershipDenied
            | Self::PermissionDenied
            | Self::TransitionRefused
            | Self::RateLimitExceeded => AuditSeverity::Warning,

            Self::TenantResolved | Self::QueryGuarded | Self::TransitionExecuted => {
                AuditSeverity::Info
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum AuditSeverity {
    Debug,
    Info,
    Warning,
    Critical,
}

impl AuditSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActorType {
    User,
    Service,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditActor {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub actor_type: ActorType,
}

impl AuditActor {
    pub fn user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            email: None,
            actor_type: ActorType::User,
        }
    }

    pub fn service(name: &str) -> Self {
        Self {
            user_id: None,
            email: Some(name.to_string()),
            actor_type: ActorType::Service,
        }
    }

    pub fn system() -> Self {
        Self {
            user_id: None,
            email: None,
            actor_type: ActorType::System,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub category: AuditEventCategory,
    pub severity: AuditSeverity,
    pub outcome: AuditOutcome,
    pub actor: AuditActor,
    pub organization_id: Option<Uuid>,
    pub action: String,
    pub description: String,
    pub metadata: HashMap<String, serde_json::Value>,
    pub previous_hash: Option<String>,
    pub hash: String,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, actor: AuditActor) -> Self {
        let mut event = Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            category: event_type.category(),
            severity: event_type.severity(),
            outcome: AuditOutcome::Allowed,
            actor,
            organization_id: None,
            action: event_type.as_str().to_string(),
            description: String::new(),
            metadata: HashMap::new(),
            previous_hash: None,
            hash: String::new(),
        };
        event.hash = event.compute_hash();
        event
    }

    pub fn denied(mut self) -> Self {
        self.outcome = AuditOutcome::Denied;
        self.hash = self.compute_hash();
        self
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self.hash = self.compute_hash();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self.hash = self.compute_hash();
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self.hash = self.compute_hash();
        self
    }

    pub fn with_previous_hash(mut self, hash: String) -> Self {
        self.previous_hash = Some(hash);
        self.hash = self.compute_hash();
        self
    }

    fn compute_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.id.as_bytes());
        hasher.update(self.timestamp.to_rfc3339().as_bytes());
        hasher.update(self.event_type.as_str().as_bytes());
        hasher.update(self.outcome.as_str().as_bytes());
        hasher.update(self.action.as_bytes());
        hasher.update(self.description.as_bytes());

        if let Some(ref prev) = self.previous_hash {
            hasher.update(prev.as_bytes());
        }
        if let Some(ref user_id) = self.actor.user_id {
            hasher.update(user_id.as_bytes());
        }
        if let Some(ref org_id) = self.organization_id {
            hasher.update(org_id.as_bytes());
        }

        hex::encode(hasher.finalize())
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn is_critical(&self) -> bool {
        self.severity == AuditSeverity::Critical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    pub enabled: bool,
    pub async_logging: bool,
    pub buffer_size: usize,
    pub min_severity: AuditSeverity,
    pub tamper_evident: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            async_logging: true,
            buffer_size: 64,
            min_severity: AuditSeverity::Info,
            tamper_evident: true,
        }
    }
}

impl AuditConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: std::env::var("AUDIT_ENABLED")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enabled),
            async_logging: std::env::var("AUDIT_ASYNC")
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.async_logging),
            buffer_size: std::env::var("AUDIT_BUFFER_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.buffer_size),
            min_severity: defaults.min_severity,
            tamper_evident: defaults.tamper_evident,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditQuery {
    pub organization_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub event_types: Option<Vec<AuditEventType>>,
    pub categories: Option<Vec<AuditEventCategory>>,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_organization(mut self, organization_id: Uuid) -> Self {
        self.organization_id = Some(organization_id);
        self
    }

    pub fn with_actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn with_event_types(mut self, types: Vec<AuditEventType>) -> Self {
        self.event_types = Some(types);
        self
    }

    pub fn with_categories(mut self, categories: Vec<AuditEventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditQueryResult {
    pub events: Vec<AuditEvent>,
    pub total_count: usize,
}

pub trait AuditStore: Send + Sync {
    fn store(&self, event: AuditEvent) -> impl Future<Output = Result<()>> + Send;
    fn store_batch(&self, events: Vec<AuditEvent>) -> impl Future<Output = Result<()>> + Send;
    fn query(&self, query: AuditQuery) -> impl Future<Output = Result<AuditQueryResult>> + Send;
    fn get_by_id(&self, id: Uuid) -> impl Future<Output = Result<Option<AuditEvent>>> + Send;
    fn verify_chain(&self) -> impl Future<Output = Result<bool>> + Send;
}

#[derive(Debug, Clone)]
pub struct InMemoryAuditStore {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    max_events: usize,
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl InMemoryAuditStore {
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            max_events,
        }
    }
}

impl AuditStore for InMemoryAuditStore {
    async fn store(&self, event: AuditEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }

    async fn store_batch(&self, new_events: Vec<AuditEvent>) -> Result<()> {
        let mut events = self.events.write().await;
        for event in new_events {
            if events.len() >= self.max_events {
                events.remove(0);
            }
            events.push(event);
        }
        Ok(())
    }

    async fn query(&self, query: AuditQuery) -> Result<AuditQueryResult> {
        let events = self.events.read().await;
        let filtered: Vec<AuditEvent> = events
            .iter()
            .filter(|e| {
                if let Some(org_id) = query.organization_id {
                    if e.organization_id != Some(org_id) {
                        return false;
                    }
                }
                if let Some(actor_id) = query.actor_id {
                    if e.actor.user_id != Some(actor_id) {
                        return false;
                    }
                }
                if let Some(ref types) = query.event_types {
                    if !types.contains(&e.event_type) {
                        return false;
                    }
                }
                if let Some(ref categories) = query.categories {
                    if !categories.contains(&e.category) {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        let total_count = filtered.len();
        let page: Vec<AuditEvent> = filtered
            .into_iter()
            .rev()
            .skip(query.offset)
            .take(query.limit.unwrap_or(100))
            .collect();

        Ok(AuditQueryResult {
            events: page,
            total_count,
        })
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<AuditEvent>> {
        let events = self.events.read().await;
        Ok(events.iter().find(|e| e.id == id).cloned())
    }

    async fn verify_chain(&self) -> Result<bool> {
        let events = self.events.read().await;
        for i in 0..events.len() {
            if !events[i].verify_hash() {
                return Ok(false);
            }
            if i > 0 && events[i].previous_hash.as_ref() != Some(&events[i - 1].hash) {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Records every authorization decision the core makes. Buffered when
/// `async_logging` is on; `flush` drains the buffer to the store. The
/// super-admin override path does not go through the config filters at all.
pub struct AuditLogger<S: AuditStore> {
    config: AuditConfig,
    store: S,
    buffer: Arc<RwLock<Vec<AuditEvent>>>,
    last_hash: Arc<RwLock<Option<String>>>,
}

impl<S: AuditStore> AuditLogger<S> {
    pub fn new(config: AuditConfig, store: S) -> Self {
        Self {
            config,
            store,
            buffer: Arc::new(RwLock::new(Vec::new())),
            last_hash: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn log(&self, event: AuditEvent) -> Result<()> {
        if !self.config.enabled {
            return Ok(());
        }
        if event.severity < self.config.min_severity {
            return Ok(());
        }
        self.record(event).await
    }

    /// Super-admin bypass record. Skips the enabled/severity filters: the
    /// bypass is never silent.
    pub async fn log_admin_override(
        &self,
        actor: AuditActor,
        organization_id: Uuid,
        description: &str,
        query_shape: serde_json::Value,
    ) -> Result<()> {
        warn!(
            target_organization = %organization_id,
            actor = ?actor.user_id,
            "super-admin override: {description}"
        );
        let event = AuditEvent::new(AuditEventType::AdminOverride, actor)
            .with_organization(organization_id)
            .with_description(description)
            .with_metadata("query_shape", query_shape);
        self.record(event).await
    }

    async fn record(&self, mut event: AuditEvent) -> Result<()> {
        if self.config.tamper_evident {
            let mut last_hash = self.last_hash.write().await;
            if let Some(ref hash) = *last_hash {
                event = event.with_previous_hash(hash.clone());
            }
            *last_hash = Some(event.hash.clone());
        }

        if event.is_critical() {
            info!(
                "CRITICAL AUDIT: {} - {}",
                event.event_type.as_str(),
                event.description
            );
        }

        if self.config.async_logging {
            let mut buffer = self.buffer.write().await;
            buffer.push(event);
            if buffer.len() >= self.config.buffer_size {
                let events: Vec<AuditEvent> = buffer.drain(..).collect();
                drop(buffer);
                self.store.store_batch(events).await?;
            }
        } else {
            self.store.store(event).await?;
        }
        Ok(())
    }

    pub async fn log_tenant_resolved(
        &self,
        actor: AuditActor,
        organization_id: Uuid,
        source: &str,
    ) -> Result<()> {
        let event = AuditEvent::new(AuditEventType::TenantResolved, actor)
            .with_organization(organization_id)
            .with_description(&format!("Tenant resolved via {source}"))
            .with_metadata("source", serde_json::json!(source));
        self.log(event).await
    }

    pub async fn log_resolution_failed(&self, actor: AuditActor, reason: &str) -> Result<()> {
        let event = AuditEvent::new(AuditEventType::TenantResolutionFailed, actor)
            .denied()
            .with_description(reason);
        self.log(event).await
    }

    pub async fn log_query_guarded(
        &self,
        actor: AuditActor,
        organization_id: Uuid,
        collection: &str,
    ) -> Result<()> {
        let event = AuditEvent::new(AuditEventType::QueryGuarded, actor)
            .with_organization(organization_id)
            .with_description(&format!("Tenant filter applied to {collection}"));
        self.log(event).await
    }

    pub async fn log_query_rejected(
        &self,
        actor: AuditActor,
        organization_id: Option<Uuid>,
        reason: &str,
    ) -> Result<()> {
        let mut event = AuditEvent::new(AuditEventType::QueryRejected, actor)
            .denied()
            .with_description(reason);
        if let Some(org_id) = organization_id {
            event = event.with_organization(org_id);
        }
        self.log(event).await
    }

    pub async fn log_ownership_denied(
        &self,
        actor: AuditActor,
        organization_id: Uuid,
        resource: &str,
    ) -> Result<()> {
        let event = AuditEvent::new(AuditEventType::OwnershipDenied, actor)
            .denied()
            .with_organization(organization_id)
            .with_description(&format!("Ownership check failed for {resource}"));
        self.log(event).await
    }

    pub async fn log_transition(
        &self,
        actor: AuditActor,
        organization_id: Uuid,
        action: &str,
        allowed: bool,
    ) -> Result<()> {
        let event_type = if allowed {
            AuditEventType::TransitionExecuted
        } else {
            AuditEventType::TransitionRefused
        };
        let mut event = AuditEvent::new(event_type, actor)
            .with_organization(organization_id)
            .with_description(&format!("Workflow action {action}"));
        if !allowed {
            event = event.denied();
        }
        self.log(event).await
    }

    pub async fn log_rate_limited(&self, actor: AuditActor, key: &str) -> Result<()> {
        let event = AuditEvent::new(AuditEventType::RateLimitExceeded, actor)
            .denied()
            .with_description(&format!("Rate limit exceeded for {key}"));
        self.log(event).await
    }

    pub async fn flush(&self) -> Result<()> {
        let events: Vec<AuditEvent> = {
            let mut buffer = self.buffer.write().await;
            buffer.drain(..).collect()
        };
        if !events.is_empty() {
            self.store.store_batch(events).await?;
        }
        Ok(())
    }

    pub async fn query(&self, query: AuditQuery) -> Result<AuditQueryResult> {
        self.store.query(query).await
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }
}

pub fn create_audit_logger() -> AuditLogger<InMemoryAuditStore> {
    AuditLogger::new(AuditConfig::default(), InMemoryAuditStore::default())
}
