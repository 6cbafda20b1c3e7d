//! Shared types for routed-task scheduling
//!
//! These types are used by both:
//! - the scheduler core (`node::routing`)
//! - workflow collaborators (chain sync, peers, mining, wallet)
//!
//! Serializable with serde so receivers can report their state in logs
//! and health snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Globally unique identifier of a routed task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a task owner (one per workflow actor)
///
/// Owners are compared by this id for loop detection; tasks only ever hold
/// an `OwnerId`, never the owner itself.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub Uuid);

impl OwnerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Task State
// ============================================================================

/// Where a task is in its routing lifecycle
///
/// ```text
/// Dispatched → Queued → Executing → Returned → Disposed
///      ^                               |
///      └──────── self-redispatch ──────┘
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStatus {
    #[default]
    Dispatched,
    Queued,
    Executing,
    Returned,
    Disposed,
}

impl RoutingStatus {
    /// Statuses a task may legitimately hold when it arrives back at its caller.
    pub fn is_homebound(&self) -> bool {
        matches!(self, RoutingStatus::Returned | RoutingStatus::Disposed)
    }
}

impl fmt::Display for RoutingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoutingStatus::Dispatched => write!(f, "dispatched"),
            RoutingStatus::Queued => write!(f, "queued"),
            RoutingStatus::Executing => write!(f, "executing"),
            RoutingStatus::Returned => write!(f, "returned"),
            RoutingStatus::Disposed => write!(f, "disposed"),
        }
    }
}

/// Whether a task must run on the caller's own execution context
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    #[default]
    Async,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum StashStatus {
    #[default]
    None,
    Stashed,
}

/// What an observer does with a payload fault once it discovers completion
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum HandlingMode {
    Rethrow,
    #[default]
    Swallow,
}

/// Whether a receiver may emit work to other owners
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum RouteMode {
    ReceiverOnly,
    #[default]
    Emitter,
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Point-in-time view of a routed task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskSnapshot {
    pub task_id: TaskId,
    pub label: String,
    pub routing_status: RoutingStatus,
    pub execution_mode: ExecutionMode,
    pub stash_status: StashStatus,
    pub caller: Option<OwnerId>,
    pub destination: Option<OwnerId>,
    pub enable_self_loop: bool,
    pub error: bool,
    pub created_at: DateTime<Utc>,
}

/// Bookkeeping counters of one receiver
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReceiverStats {
    pub owner: Option<OwnerId>,
    pub queued: usize,
    pub executing: usize,
    pub stashed: usize,
    pub excluded: usize,
    pub awaiting: Option<TaskId>,
    pub max_parallel_tasks: usize,
}

impl ReceiverStats {
    /// Number of tasks the receiver is currently responsible for
    pub fn in_flight(&self) -> usize {
        self.queued + self.executing + self.stashed
    }
}
