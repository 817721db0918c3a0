use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::workflow::{Stage, Status};

/// The closed set of tenant-owned content entities. Dispatch is by pattern
/// match; there is no open-ended payload type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Idea,
    Draft,
    ContentItem,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Draft => "draft",
            Self::ContentItem => "content_item",
        }
    }

    /// Storage collection backing this kind.
    pub fn collection(&self) -> &'static str {
        match self {
            Self::Idea => "ideas",
            Self::Draft => "drafts",
            Self::ContentItem => "content_items",
        }
    }
}

/// A tenant-owned content entity moving through the approval pipeline.
/// `organization_id` is set at creation and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub kind: ResourceKind,
    pub title: String,
    pub current_stage: Stage,
    pub current_status: Status,
    pub created_by: Uuid,
    pub assigned_to: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    pub fn new(organization_id: Uuid, kind: ResourceKind, title: &str, created_by: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            organization_id,
            kind,
            title: title.to_string(),
            current_stage: Stage::Idea,
            current_status: Status::Pending,
            created_by,
            assigned_to: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_assignee(mut self, user_id: Uuid) -> Self {
        self.assigned_to = Some(user_id);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.current_stage == Stage::Delivered || self.current_status.is_terminal()
    }

    /// Record an engine-validated state change. Deletion is not a workflow
    /// operation and does not come through here.
    pub fn apply_transition(&mut self, stage: Stage, status: Status) {
        self.current_stage = stage;
        self.current_status = status;
        self.updated_at = Utc::now();
    }
}

/// Work-item persistence as seen by the core. Every read is scoped to one
/// organization; there is no unscoped lookup on this trait.
pub trait WorkItemStore: Send + Sync {
    fn find_scoped(
        &self,
        kind: ResourceKind,
        id: Uuid,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Option<WorkItem>>> + Send;

    fn list_scoped(
        &self,
        organization_id: Uuid,
    ) -> impl Future<Output = Result<Vec<WorkItem>>> + Send;

    fn insert(&self, item: WorkItem) -> impl Future<Output = Result<()>> + Send;

    fn update(&self, item: WorkItem) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkItems {
    items: Arc<RwLock<Vec<WorkItem>>>,
}

impl InMemoryWorkItems {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorkItemStore for InMemoryWorkItems {
    async fn find_scoped(
        &self,
        kind: ResourceKind,
        id: Uuid,
        organization_id: Uuid,
    ) -> Result<Option<WorkItem>> {
        let items = self.items.read().await;
        Ok(items
            .iter()
            .find(|i| i.id == id && i.kind == kind && i.organization_id == organization_id)
            .cloned())
    }

    async fn list_scoped(&self, organization_id: Uuid) -> Result<Vec<WorkItem>> {
        let items = self.items.read().await;
        Ok(items
            .iter()
            .filter(|i| i.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn insert(&self, item: WorkItem) -> Result<()> {
        let mut items = self.items.write().await;
        items.push(item);
        Ok(())
    }

    async fn update(&self, item: WorkItem) -> Result<()> {
        let mut items = self.items.write().await;
        match items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                *existing = item;
                Ok(())
            }
            None => anyhow::bail!("work item {} not found", item.id),
        }
    }
}
