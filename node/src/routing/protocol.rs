//! Routing protocol - error type and collaborator seams
//!
//! Defines the traits the scheduler core consumes (`TaskRouter`,
//! `DispatchGuard`), the base run-loop contract every receiver implements
//! (`TaskReceiver`), and the errors used throughout the routing system.

use std::sync::Arc;

use async_trait::async_trait;
use shared_types::{ExecutionMode, OwnerId, TaskId};

use super::task::{RoutedTask, TaskFault};

/// Errors raised by routing operations
#[derive(Debug, thiserror::Error, Clone)]
pub enum RoutingError {
    /// Task was handed back to its caller before leaving it
    #[error("routing loop: task {task_id} handed back to caller {owner} during dispatch")]
    RoutingLoop { task_id: TaskId, owner: OwnerId },
    /// Task is disposed and can no longer be routed
    #[error("task already disposed: {0}")]
    TaskDisposed(TaskId),
    /// Task is queued or executing somewhere already
    #[error("task already in flight: {0}")]
    AlreadyRouted(TaskId),
    #[error("stashing is disabled on receiver {0}")]
    StashingDisabled(OwnerId),
    /// Receiver only accepts work and cannot emit it
    #[error("receiver {0} is receiver-only and cannot dispatch")]
    ReceiverOnly(OwnerId),
    #[error("dispatch guard rejected task {0}")]
    GuardRejected(TaskId),
    /// Task has neither a destination nor a caller to return to
    #[error("no route for task {0}")]
    NoRoute(TaskId),
    #[error("unknown owner: {0}")]
    UnknownOwner(OwnerId),
    #[error("task has no payload: {0}")]
    MissingPayload(TaskId),
    /// Payload fault re-raised to the observer of a `Rethrow` task
    #[error("task {task_id} failed: {fault:#}")]
    TaskFailed { task_id: TaskId, fault: TaskFault },
}

/// Resolves a task's destination owner and forwards the task to its mailbox
pub trait TaskRouter: Send + Sync {
    fn route_task(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError>;
}

/// Predicate that can veto guarded (asynchronous) dispatch
///
/// Synchronous dispatch suppresses the guard for the duration of the call.
pub trait DispatchGuard: Send + Sync {
    fn rejects(&self, task: &RoutedTask) -> bool;
}

/// Base mailbox run loop
///
/// Receivers append in arrival order and hand tasks out strictly FIFO;
/// `process_task` decides how a dequeued task runs.
#[async_trait]
pub trait TaskReceiver: Send + Sync {
    fn owner_id(&self) -> OwnerId;

    /// Append a task to the mailbox tail
    fn receive_task(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError>;

    /// Same as [`TaskReceiver::receive_task`] but tags the task `Sync`
    fn receive_task_synchronous(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError> {
        task.set_execution_mode(ExecutionMode::Sync);
        self.receive_task(task)
    }

    /// Pop the next task eligible to run, if any
    fn get_next_queued_task(&self) -> Option<Arc<RoutedTask>>;

    fn queued_len(&self) -> usize;

    /// Run a dequeued task. Returns true iff the task ended disposed.
    async fn process_task(&self, task: Arc<RoutedTask>) -> Result<bool, RoutingError>;

    /// Process what is queued right now, in arrival order.
    ///
    /// Bounded by the queue length at entry so tasks re-enqueued during the
    /// pass wait for the next one.
    async fn drain(&self) -> Result<usize, RoutingError> {
        let budget = self.queued_len();
        let mut processed = 0;
        while processed < budget {
            let Some(task) = self.get_next_queued_task() else {
                break;
            };
            self.process_task(task).await?;
            processed += 1;
        }
        Ok(processed)
    }
}
