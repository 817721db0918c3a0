//! Content Workflow Engine
//!
//! Table-driven state machine over the `(Stage, Status)` pair of a work
//! item. Transitions are authored against either dimension: a row's `from`
//! matches when it equals the item's current stage or its current status.
//! The engine validates legality only; persisting the new state is the
//! caller's job.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::content::WorkItem;
use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idea,
    Draft,
    ContentReview,
    Approved,
    Published,
    Delivered,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Draft => "draft",
            Self::ContentReview => "content_review",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Delivered => "delivered",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Review,
    Approved,
    Published,
    Delivered,
    Rejected,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Published => "published",
            Self::Delivered => "delivered",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Rejected | Self::Cancelled)
    }
}

/// One endpoint of a transition, authored against a single dimension.
///
/// Matching is deliberately loose: a status-authored `from` fires whatever
/// the item's stage is, and vice versa. This mirrors the platform's
/// long-standing transition table and must not be tightened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dimension", content = "value", rename_all = "snake_case")]
pub enum StateRef {
    Stage(Stage),
    Status(Status),
}

impl StateRef {
    pub fn matches(&self, stage: Stage, status: Status) -> bool {
        match self {
            Self::Stage(s) => *s == stage,
            Self::Status(s) => *s == status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTransition {
    pub action: String,
    pub from: StateRef,
    pub to: StateRef,
    pub required_roles: Vec<String>,
    pub auto_transition: bool,
}

impl WorkflowTransition {
    pub fn new(action: &str, from: StateRef, to: StateRef, required_roles: &[&str]) -> Self {
        Self {
            action: action.to_string(),
            from,
            to,
            required_roles: required_roles.iter().map(|r| r.to_string()).collect(),
            auto_transition: false,
        }
    }

    pub fn auto(mut self) -> Self {
        self.auto_transition = true;
        self
    }

    /// Empty `required_roles` means any role may take the transition.
    pub fn permits(&self, role: &str) -> bool {
        self.required_roles.is_empty()
            || self
                .required_roles
                .iter()
                .any(|r| r.eq_ignore_ascii_case(role))
    }
}

/// Outcome of a validated transition. `auto_follow_up` is set when the new
/// state is eligible for an automatic follow-on row; the caller decides when
/// (and whether) to apply it. The engine never schedules work itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub action: String,
    pub to_stage: Stage,
    pub to_status: Status,
    pub auto_follow_up: Option<WorkflowTransition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProgress {
    pub total: usize,
    pub by_stage: HashMap<Stage, usize>,
    pub by_status: HashMap<Status, usize>,
    pub delivered: usize,
    pub percent_complete: u32,
}

/// The closed, hand-authored transition table. Every reachable state has an
/// outward row or is terminal (`Delivered`, `Rejected`, `Cancelled`).
pub fn default_transitions() -> Vec<WorkflowTransition> {
    vec![
        WorkflowTransition::new(
            "create_draft",
            StateRef::Stage(Stage::Idea),
            StateRef::Stage(Stage::Draft),
            &["creative", "member", "manager", "admin", "owner"],
        ),
        WorkflowTransition::new(
            "start_work",
            StateRef::Status(Status::Pending),
            StateRef::Status(Status::InProgress),
            &["creative"],
        ),
        WorkflowTransition::new(
            "submit_for_review",
            StateRef::Stage(Stage::Draft),
            StateRef::Stage(Stage::ContentReview),
            &["creative", "member", "manager"],
        ),
        WorkflowTransition::new(
            "request_changes",
            StateRef::Stage(Stage::ContentReview),
            StateRef::Stage(Stage::Draft),
            &["client", "manager", "admin"],
        ),
        WorkflowTransition::new(
            "approve_content",
            StateRef::Stage(Stage::ContentReview),
            StateRef::Stage(Stage::Approved),
            &["client", "admin", "owner"],
        ),
        WorkflowTransition::new(
            "reject_content",
            StateRef::Stage(Stage::ContentReview),
            StateRef::Status(Status::Rejected),
            &["client", "admin", "owner"],
        ),
        WorkflowTransition::new(
            "publish_content",
            StateRef::Stage(Stage::Approved),
            StateRef::Stage(Stage::Published),
            &["admin", "owner"],
        )
        .auto(),
        WorkflowTransition::new(
            "deliver_content",
            StateRef::Stage(Stage::Published),
            StateRef::Stage(Stage::Delivered),
            &["manager", "admin", "owner"],
        ),
        WorkflowTransition::new(
            "cancel_item",
            StateRef::Status(Status::InProgress),
            StateRef::Status(Status::Cancelled),
            &["manager", "admin", "owner"],
        ),
    ]
}

pub struct WorkflowEngine {
    transitions: Vec<WorkflowTransition>,
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new(default_transitions())
    }
}

impl WorkflowEngine {
    pub fn new(transitions: Vec<WorkflowTransition>) -> Self {
        Self { transitions }
    }

    pub fn transitions(&self) -> &[WorkflowTransition] {
        &self.transitions
    }

    /// True iff some row leaves the current state for `target` and the role
    /// is permitted. Unmatched input resolves to denial.
    pub fn can_transition(
        &self,
        current_stage: Stage,
        current_status: Status,
        target: StateRef,
        role: &str,
    ) -> bool {
        self.transitions.iter().any(|t| {
            t.from.matches(current_stage, current_status) && t.to == target && t.permits(role)
        })
    }

    /// All rows the given role may take from the current state. Used by the
    /// caller to render available actions.
    pub fn list_legal_transitions(
        &self,
        current_stage: Stage,
        current_status: Status,
        role: &str,
    ) -> Vec<&WorkflowTransition> {
        self.transitions
            .iter()
            .filter(|t| t.from.matches(current_stage, current_status) && t.permits(role))
            .collect()
    }

    /// Validate one transition. The caller persists the new `(stage, status)`
    /// pair on success; the same illegal call always yields the same error
    /// shape with the inputs echoed back.
    pub fn execute(
        &self,
        from_stage: Stage,
        from_status: Status,
        to_stage: Stage,
        to_status: Status,
        role: &str,
        action: &str,
    ) -> Result<TransitionOutcome, CoreError> {
        let matched = self.transitions.iter().find(|t| {
            t.action == action
                && t.from.matches(from_stage, from_status)
                && t.to.matches(to_stage, to_status)
                && t.permits(role)
        });

        let Some(transition) = matched else {
            return Err(CoreError::IllegalTransition {
                from: (from_stage, from_status),
                to: (to_stage, to_status),
                action: action.to_string(),
            });
        };

        let auto_follow_up = if to_stage == Stage::Approved || to_status == Status::Approved {
            self.transitions
                .iter()
                .find(|t| t.auto_transition && t.from.matches(to_stage, to_status))
                .cloned()
        } else {
            None
        };

        debug!(
            action = transition.action.as_str(),
            role,
            auto_eligible = auto_follow_up.is_some(),
            "workflow transition validated"
        );

        Ok(TransitionOutcome {
            action: transition.action.clone(),
            to_stage,
            to_status,
            auto_follow_up,
        })
    }
}

/// Aggregate pipeline position over a set of items. `percent_complete` is
/// delivered over total, rounded to the nearest integer, zero for no items.
pub fn compute_progress(items: &[WorkItem]) -> WorkflowProgress {
    let total = items.len();
    let mut by_stage: HashMap<Stage, usize> = HashMap::new();
    let mut by_status: HashMap<Status, usize> = HashMap::new();

    for item in items {
        *by_stage.entry(item.current_stage).or_insert(0) += 1;
        *by_status.entry(item.current_status).or_insert(0) += 1;
    }

    let delivered = by_stage.get(&Stage::Delivered).copied().unwrap_or(0);
    let percent_complete = if total == 0 {
        0
    } else {
        ((delivered as f64 / total as f64) * 100.0).round() as u32
    };

    WorkflowProgress {
        total,
        by_stage,
        by_status,
        delivered,
        percent_complete,
    }
}
