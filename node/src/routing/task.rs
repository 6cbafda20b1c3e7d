//! Routed task model
//!
//! A [`RoutedTask`] is the unit of work passed between workflow owners. It is
//! shared as `Arc<RoutedTask>` between the producer (who may wait on it) and
//! the receivers it travels through; its mutable routing state lives behind a
//! small per-task mutex so every party observes the same status and result.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use shared_types::{
    ExecutionMode, HandlingMode, OwnerId, RoutingStatus, StashStatus, TaskId, TaskSnapshot,
};

use super::protocol::RoutingError;
use super::receiver::RoutingReceiver;

/// Captured payload fault, shared by every observer of the task
pub type TaskFault = Arc<anyhow::Error>;

/// Outcome of one payload invocation
pub type PayloadResult = Result<serde_json::Value, PayloadError>;

/// Payload closure attached to a task
///
/// `Fn` rather than `FnOnce`: a payload that signals [`PayloadError::NotReady`]
/// is invoked again on a later retry.
pub type TaskPayload = Arc<dyn Fn(TaskContext) -> BoxFuture<'static, PayloadResult> + Send + Sync>;

/// Errors a payload can report
#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    /// The payload cannot make progress yet and should be retried later.
    /// Only meaningful on inline execution paths.
    #[error("task not ready")]
    NotReady,
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl PayloadError {
    pub fn failed<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::msg(message))
    }
}

/// Opaque scoped-resource token handed through to the payload
#[derive(Clone)]
pub struct LockHandle(Arc<dyn Any + Send + Sync>);

impl LockHandle {
    pub fn new<T: Any + Send + Sync>(token: T) -> Self {
        Self(Arc::new(token))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LockHandle(..)")
    }
}

/// Result attached to a task once its payload has run
#[derive(Debug, Clone)]
pub struct TaskExecutionResult {
    pub error: bool,
    pub fault: Option<TaskFault>,
    pub handling_mode: HandlingMode,
    pub value: Option<serde_json::Value>,
}

impl TaskExecutionResult {
    pub fn success(value: serde_json::Value) -> Self {
        Self {
            error: false,
            fault: None,
            handling_mode: HandlingMode::default(),
            value: Some(value),
        }
    }

    pub fn failure(fault: anyhow::Error, handling_mode: HandlingMode) -> Self {
        Self {
            error: true,
            fault: Some(Arc::new(fault)),
            handling_mode,
            value: None,
        }
    }

    /// Whether an observer must re-raise this result's fault
    pub fn should_rethrow(&self) -> bool {
        self.error && self.handling_mode == HandlingMode::Rethrow
    }
}

/// What a payload sees while it runs
#[derive(Clone)]
pub struct TaskContext {
    owner: Weak<RoutingReceiver>,
    owner_id: OwnerId,
    task: Arc<RoutedTask>,
}

impl TaskContext {
    pub(crate) fn new(owner: Weak<RoutingReceiver>, owner_id: OwnerId, task: Arc<RoutedTask>) -> Self {
        Self {
            owner,
            owner_id,
            task,
        }
    }

    /// Receiver of the owner executing the payload, if it is still alive
    pub fn owner(&self) -> Option<Arc<RoutingReceiver>> {
        self.owner.upgrade()
    }

    pub fn owner_id(&self) -> OwnerId {
        self.owner_id
    }

    /// The task being executed (the current routing context)
    pub fn task(&self) -> &Arc<RoutedTask> {
        &self.task
    }

    pub fn parent(&self) -> Option<Arc<RoutedTask>> {
        self.task.parent()
    }

    pub fn lock(&self) -> Option<LockHandle> {
        self.task.lock_handle()
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("owner_id", &self.owner_id)
            .field("task_id", &self.task.id())
            .finish()
    }
}

#[derive(Default)]
struct TaskState {
    routing_status: RoutingStatus,
    execution_mode: ExecutionMode,
    stash_status: StashStatus,
    caller: Option<OwnerId>,
    destination: Option<OwnerId>,
    parent: Option<Weak<RoutedTask>>,
    enable_self_loop: bool,
    handling_mode: HandlingMode,
    lock: Option<LockHandle>,
    result: Option<TaskExecutionResult>,
}

/// Unit of work routed between owners
pub struct RoutedTask {
    id: TaskId,
    label: String,
    created_at: DateTime<Utc>,
    payload: Option<TaskPayload>,
    state: Mutex<TaskState>,
}

impl RoutedTask {
    pub fn builder(label: impl Into<String>) -> RoutedTaskBuilder {
        RoutedTaskBuilder::new(label)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn routing_status(&self) -> RoutingStatus {
        self.lock_state().routing_status
    }

    pub fn is_disposed(&self) -> bool {
        self.routing_status() == RoutingStatus::Disposed
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.lock_state().execution_mode
    }

    pub fn stash_status(&self) -> StashStatus {
        self.lock_state().stash_status
    }

    /// Owner that dispatched this task and expects it back
    pub fn caller(&self) -> Option<OwnerId> {
        self.lock_state().caller
    }

    pub fn destination(&self) -> Option<OwnerId> {
        self.lock_state().destination
    }

    pub fn parent(&self) -> Option<Arc<RoutedTask>> {
        self.lock_state().parent.as_ref().and_then(Weak::upgrade)
    }

    pub fn enable_self_loop(&self) -> bool {
        self.lock_state().enable_self_loop
    }

    pub fn handling_mode(&self) -> HandlingMode {
        self.lock_state().handling_mode
    }

    pub fn lock_handle(&self) -> Option<LockHandle> {
        self.lock_state().lock.clone()
    }

    pub fn result(&self) -> Option<TaskExecutionResult> {
        self.lock_state().result.clone()
    }

    /// Value produced by a successful payload
    pub fn value(&self) -> Option<serde_json::Value> {
        self.lock_state()
            .result
            .as_ref()
            .and_then(|result| result.value.clone())
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Tag the execution mode. Ignored once the task is disposed.
    pub fn set_execution_mode(&self, mode: ExecutionMode) {
        self.update(|state| state.execution_mode = mode);
    }

    /// Flip the stash flag back without touching receiver bookkeeping.
    ///
    /// The owning receiver moves the task back into its executing set on its
    /// next cleanup pass.
    pub fn mark_unstashed(&self) {
        self.update(|state| state.stash_status = StashStatus::None);
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.lock_state();
        TaskSnapshot {
            task_id: self.id,
            label: self.label.clone(),
            routing_status: state.routing_status,
            execution_mode: state.execution_mode,
            stash_status: state.stash_status,
            caller: state.caller,
            destination: state.destination,
            enable_self_loop: state.enable_self_loop,
            error: state.result.as_ref().is_some_and(|result| result.error),
            created_at: self.created_at,
        }
    }

    // ------------------------------------------------------------------------
    // Receiver-side transitions
    // ------------------------------------------------------------------------

    pub(crate) fn payload(&self) -> Option<TaskPayload> {
        self.payload.clone()
    }

    pub(crate) fn set_routing_status(&self, status: RoutingStatus) {
        self.update(|state| state.routing_status = status);
    }

    pub(crate) fn set_stash_status(&self, status: StashStatus) {
        self.update(|state| state.stash_status = status);
    }

    /// Reset routing state so the owner can route the task to itself.
    pub(crate) fn prepare_self_dispatch(&self, lock: Option<LockHandle>) -> Result<(), RoutingError> {
        let id = self.id;
        self.update(|state| match state.routing_status {
            RoutingStatus::Queued | RoutingStatus::Executing => Err(RoutingError::AlreadyRouted(id)),
            _ => {
                state.enable_self_loop = true;
                state.caller = None;
                state.routing_status = RoutingStatus::Dispatched;
                state.parent = None;
                state.execution_mode = ExecutionMode::Sync;
                state.result = None;
                if lock.is_some() {
                    state.lock = lock;
                }
                Ok(())
            }
        })
        .unwrap_or(Err(RoutingError::TaskDisposed(id)))
    }

    /// Stamp the dispatching owner before the task leaves for its destination.
    pub(crate) fn prepare_outbound(
        &self,
        caller: Option<OwnerId>,
        lock: Option<LockHandle>,
    ) -> Result<(), RoutingError> {
        let id = self.id;
        self.update(|state| {
            if state.routing_status != RoutingStatus::Dispatched {
                return Err(RoutingError::AlreadyRouted(id));
            }
            state.caller = caller;
            if lock.is_some() {
                state.lock = lock;
            }
            Ok(())
        })
        .unwrap_or(Err(RoutingError::TaskDisposed(id)))
    }

    /// Attach the payload outcome and move to `status` in one step.
    pub(crate) fn finish(&self, result: TaskExecutionResult, status: RoutingStatus) {
        self.update(|state| {
            state.result = Some(result);
            state.routing_status = status;
        });
    }

    fn update<R>(&self, f: impl FnOnce(&mut TaskState) -> R) -> Option<R> {
        let mut state = self.lock_state();
        if state.routing_status == RoutingStatus::Disposed {
            tracing::trace!(task_id = %self.id, "Ignoring mutation of disposed task");
            return None;
        }
        Some(f(&mut state))
    }

    fn lock_state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for RoutedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock_state();
        f.debug_struct("RoutedTask")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("routing_status", &state.routing_status)
            .field("execution_mode", &state.execution_mode)
            .field("stash_status", &state.stash_status)
            .field("caller", &state.caller)
            .finish()
    }
}

/// Builder for [`RoutedTask`]
pub struct RoutedTaskBuilder {
    label: String,
    payload: Option<TaskPayload>,
    destination: Option<OwnerId>,
    parent: Option<Weak<RoutedTask>>,
    enable_self_loop: bool,
    execution_mode: ExecutionMode,
    handling_mode: HandlingMode,
    lock: Option<LockHandle>,
}

impl RoutedTaskBuilder {
    fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            payload: None,
            destination: None,
            parent: None,
            enable_self_loop: false,
            execution_mode: ExecutionMode::default(),
            handling_mode: HandlingMode::default(),
            lock: None,
        }
    }

    pub fn payload<F, Fut>(mut self, payload: F) -> Self
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = PayloadResult> + Send + 'static,
    {
        let erased: TaskPayload = Arc::new(move |ctx: TaskContext| payload(ctx).boxed());
        self.payload = Some(erased);
        self
    }

    /// Owner the router forwards this task to
    pub fn to(mut self, destination: OwnerId) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn parent(mut self, parent: &Arc<RoutedTask>) -> Self {
        self.parent = Some(Arc::downgrade(parent));
        self
    }

    pub fn self_loop(mut self, enabled: bool) -> Self {
        self.enable_self_loop = enabled;
        self
    }

    pub fn sync(mut self) -> Self {
        self.execution_mode = ExecutionMode::Sync;
        self
    }

    pub fn rethrow(mut self) -> Self {
        self.handling_mode = HandlingMode::Rethrow;
        self
    }

    pub fn handling_mode(mut self, mode: HandlingMode) -> Self {
        self.handling_mode = mode;
        self
    }

    pub fn lock(mut self, lock: LockHandle) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn build(self) -> Arc<RoutedTask> {
        Arc::new(RoutedTask {
            id: TaskId::new(),
            label: self.label,
            created_at: Utc::now(),
            payload: self.payload,
            state: Mutex::new(TaskState {
                destination: self.destination,
                parent: self.parent,
                enable_self_loop: self.enable_self_loop,
                execution_mode: self.execution_mode,
                handling_mode: self.handling_mode,
                lock: self.lock,
                ..TaskState::default()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(label: &str) -> Arc<RoutedTask> {
        RoutedTask::builder(label)
            .payload(|_ctx| async { Ok(json!(null)) })
            .build()
    }

    #[test]
    fn test_builder_defaults() {
        let task = noop("defaults");
        assert_eq!(task.routing_status(), RoutingStatus::Dispatched);
        assert_eq!(task.execution_mode(), ExecutionMode::Async);
        assert_eq!(task.stash_status(), StashStatus::None);
        assert_eq!(task.handling_mode(), HandlingMode::Swallow);
        assert!(task.caller().is_none());
        assert!(!task.enable_self_loop());
        assert!(task.has_payload());
        assert!(task.result().is_none());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(noop("a").id(), noop("b").id());
    }

    #[test]
    fn test_disposed_task_is_immutable() {
        let task = noop("immutable");
        task.finish(TaskExecutionResult::success(json!(1)), RoutingStatus::Disposed);

        task.set_execution_mode(ExecutionMode::Sync);
        task.set_routing_status(RoutingStatus::Queued);
        task.set_stash_status(StashStatus::Stashed);

        assert_eq!(task.routing_status(), RoutingStatus::Disposed);
        assert_eq!(task.execution_mode(), ExecutionMode::Async);
        assert_eq!(task.stash_status(), StashStatus::None);
        assert_eq!(task.value(), Some(json!(1)));
    }

    #[test]
    fn test_self_dispatch_resets_routing_links() {
        let parent = noop("parent");
        let task = RoutedTask::builder("child")
            .parent(&parent)
            .payload(|_ctx| async { Ok(json!(null)) })
            .build();
        task.prepare_outbound(Some(OwnerId::new()), None)
            .expect("fresh task can leave");
        task.finish(TaskExecutionResult::success(json!(2)), RoutingStatus::Returned);
        assert!(task.parent().is_some());

        task.prepare_self_dispatch(None).expect("returned task can be self-dispatched");

        assert_eq!(task.routing_status(), RoutingStatus::Dispatched);
        assert_eq!(task.execution_mode(), ExecutionMode::Sync);
        assert!(task.enable_self_loop());
        assert!(task.caller().is_none());
        assert!(task.parent().is_none());
        assert!(task.result().is_none());
    }

    #[test]
    fn test_self_dispatch_of_disposed_task_fails() {
        let task = noop("done");
        task.finish(TaskExecutionResult::success(json!(null)), RoutingStatus::Disposed);
        let err = task.prepare_self_dispatch(None).unwrap_err();
        assert!(matches!(err, RoutingError::TaskDisposed(id) if id == task.id()));
    }

    #[test]
    fn test_outbound_requires_fresh_task() {
        let task = noop("in-flight");
        task.set_routing_status(RoutingStatus::Queued);
        let err = task.prepare_outbound(None, None).unwrap_err();
        assert!(matches!(err, RoutingError::AlreadyRouted(_)));
    }

    #[test]
    fn test_failure_result_rethrow_flag() {
        let swallowed = TaskExecutionResult::failure(anyhow::anyhow!("boom"), HandlingMode::Swallow);
        let rethrown = TaskExecutionResult::failure(anyhow::anyhow!("boom"), HandlingMode::Rethrow);
        assert!(swallowed.error);
        assert!(!swallowed.should_rethrow());
        assert!(rethrown.should_rethrow());
        assert!(!TaskExecutionResult::success(json!(1)).should_rethrow());
    }

    #[test]
    fn test_lock_handle_downcast() {
        let task = RoutedTask::builder("locked")
            .lock(LockHandle::new(42u32))
            .build();
        let lock = task.lock_handle().expect("lock attached");
        assert_eq!(lock.downcast_ref::<u32>(), Some(&42));
        assert!(lock.downcast_ref::<String>().is_none());
    }

    #[test]
    fn test_snapshot_reports_error_flag() {
        let task = noop("snap");
        task.finish(
            TaskExecutionResult::failure(anyhow::anyhow!("bad block"), HandlingMode::Swallow),
            RoutingStatus::Disposed,
        );
        let snapshot = task.snapshot();
        assert_eq!(snapshot.task_id, task.id());
        assert_eq!(snapshot.label, "snap");
        assert!(snapshot.error);
        assert_eq!(snapshot.routing_status, RoutingStatus::Disposed);
    }
}
