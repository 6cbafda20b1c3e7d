//! RoutingReceiver - the scheduler core
//!
//! Every workflow owner holds one `RoutingReceiver`. On top of the FIFO
//! mailbox it adds:
//! - bounded parallelism (`max_parallel_tasks`) with inline or pooled execution
//! - stashing of long-running tasks outside the parallelism accounting
//! - a polling wait protocol (`check_single_task` / `wait_single_task`)
//! - synchronous and asynchronous dispatch through an injected [`TaskRouter`]
//! - loop prevention on receive
//!
//! ## Execution topology
//!
//! ```text
//! inlined := synchronous || task is Sync || max_parallel_tasks == 1
//!
//! inlined: payload awaited on the caller's context, nothing tracked
//! pooled:  payload spawned, (handle, task) kept in `executing` until reaped
//! ```
//!
//! All bookkeeping (mailbox, executing, stashed, exclusions) sits behind one
//! mutex that is never held across an `.await` or a payload body.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use shared_types::{
    ExecutionMode, HandlingMode, OwnerId, ReceiverStats, RouteMode, RoutingStatus, StashStatus,
    TaskId,
};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::config::ReceiverConfig;
use super::mailbox::Mailbox;
use super::protocol::{DispatchGuard, RoutingError, TaskReceiver, TaskRouter};
use super::signal::WakeSignal;
use super::task::{LockHandle, PayloadError, RoutedTask, TaskContext, TaskExecutionResult};

/// Execution handle and task tracked by id
///
/// `handle` is `None` for inline tasks that were stashed while running.
#[derive(Debug)]
struct TaskSlot {
    handle: Option<JoinHandle<()>>,
    task: Arc<RoutedTask>,
}

impl TaskSlot {
    fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

#[derive(Debug, Default)]
struct ReceiverState {
    mailbox: Mailbox,
    executing: HashMap<TaskId, TaskSlot>,
    stashed: HashMap<TaskId, TaskSlot>,
    /// Ids a caller is actively waiting on; never handed out by the run loop
    excluded: HashSet<TaskId>,
    awaiting: Option<TaskId>,
}

impl ReceiverState {
    fn find(&self, id: TaskId) -> Option<Arc<RoutedTask>> {
        self.mailbox
            .get(id)
            .or_else(|| self.executing.get(&id).map(|slot| &slot.task))
            .or_else(|| self.stashed.get(&id).map(|slot| &slot.task))
            .cloned()
    }

    fn contains(&self, id: TaskId) -> bool {
        self.mailbox.contains(id) || self.executing.contains_key(&id) || self.stashed.contains_key(&id)
    }
}

/// Shared completion path for inline and pooled payloads
#[derive(Clone)]
struct Completion {
    owner: OwnerId,
    router: Arc<dyn TaskRouter>,
    signal: Arc<WakeSignal>,
}

impl Completion {
    /// Attach the outcome, then either hand the task back to a foreign caller
    /// or dispose it here.
    fn settle(&self, task: &Arc<RoutedTask>, outcome: Result<serde_json::Value, anyhow::Error>) {
        let result = match outcome {
            Ok(value) => TaskExecutionResult::success(value),
            Err(fault) => {
                tracing::warn!(
                    owner = %self.owner,
                    task_id = %task.id(),
                    label = %task.label(),
                    error = %fault,
                    "Task payload failed"
                );
                TaskExecutionResult::failure(fault, task.handling_mode())
            }
        };

        match task.caller() {
            Some(caller) if caller != self.owner => {
                task.finish(result, RoutingStatus::Returned);
                if let Err(e) = self.router.route_task(task.clone()) {
                    tracing::warn!(
                        owner = %self.owner,
                        task_id = %task.id(),
                        caller = %caller,
                        error = %e,
                        "Route back to caller failed; disposing task"
                    );
                    task.set_routing_status(RoutingStatus::Disposed);
                }
            }
            _ => task.finish(result, RoutingStatus::Disposed),
        }
        self.signal.raise();
    }

    /// Dispose a task whose payload misbehaved, without honouring `Rethrow`.
    fn drop_task(&self, task: &Arc<RoutedTask>, reason: anyhow::Error) {
        task.finish(
            TaskExecutionResult::failure(reason, HandlingMode::Swallow),
            RoutingStatus::Disposed,
        );
        self.signal.raise();
    }
}

/// Arguments for constructing a [`RoutingReceiver`]
pub struct ReceiverArguments {
    pub owner: OwnerId,
    pub name: String,
    pub config: ReceiverConfig,
    pub router: Arc<dyn TaskRouter>,
    pub guard: Option<Arc<dyn DispatchGuard>>,
}

impl ReceiverArguments {
    pub fn new(name: impl Into<String>, config: ReceiverConfig, router: Arc<dyn TaskRouter>) -> Self {
        Self {
            owner: OwnerId::new(),
            name: name.into(),
            config,
            router,
            guard: None,
        }
    }

    pub fn with_guard(mut self, guard: Arc<dyn DispatchGuard>) -> Self {
        self.guard = Some(guard);
        self
    }
}

/// Per-owner scheduler: mailbox, bounded worker pool, stash and waits
pub struct RoutingReceiver {
    owner: OwnerId,
    name: String,
    config: ReceiverConfig,
    router: Arc<dyn TaskRouter>,
    guard: Option<Arc<dyn DispatchGuard>>,
    signal: Arc<WakeSignal>,
    state: Mutex<ReceiverState>,
    this: Weak<RoutingReceiver>,
}

impl RoutingReceiver {
    pub fn new(args: ReceiverArguments) -> Arc<Self> {
        let ReceiverArguments {
            owner,
            name,
            mut config,
            router,
            guard,
        } = args;

        if config.max_parallel_tasks == 0 {
            tracing::warn!(owner = %owner, name = %name, "max_parallel_tasks of 0 raised to 1");
            config.max_parallel_tasks = 1;
        }

        Arc::new_cyclic(|this| Self {
            owner,
            name,
            config,
            router,
            guard,
            signal: Arc::new(WakeSignal::new()),
            state: Mutex::new(ReceiverState::default()),
            this: this.clone(),
        })
    }

    pub fn owner(&self) -> OwnerId {
        self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn is_pooled(&self) -> bool {
        self.config.is_pooled()
    }

    pub fn stats(&self) -> ReceiverStats {
        let state = self.lock_state();
        ReceiverStats {
            owner: Some(self.owner),
            queued: state.mailbox.len(),
            executing: state.executing.len(),
            stashed: state.stashed.len(),
            excluded: state.excluded.len(),
            awaiting: state.awaiting,
            max_parallel_tasks: self.config.max_parallel_tasks,
        }
    }

    pub fn is_queued(&self, id: TaskId) -> bool {
        self.lock_state().mailbox.contains(id)
    }

    pub fn is_executing(&self, id: TaskId) -> bool {
        self.lock_state().executing.contains_key(&id)
    }

    pub fn is_stashed(&self, id: TaskId) -> bool {
        self.lock_state().stashed.contains_key(&id)
    }

    // ========================================================================
    // Owner-level wait
    // ========================================================================

    /// Wait for "something arrived", bounded by the default wait timeout
    pub async fn wait(&self) -> bool {
        self.wait_timeout(self.config.default_wait_timeout).await
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        self.signal.wait(Some(timeout)).await
    }

    // ========================================================================
    // Stashing
    // ========================================================================

    /// Park a running task outside the parallelism accounting.
    pub fn stash_task(&self, task: &Arc<RoutedTask>) -> Result<(), RoutingError> {
        if !self.config.enable_stashing {
            return Err(RoutingError::StashingDisabled(self.owner));
        }
        if task.stash_status() == StashStatus::Stashed {
            return Ok(());
        }
        if task.is_disposed() {
            return Err(RoutingError::TaskDisposed(task.id()));
        }

        let id = task.id();
        {
            let mut state = self.lock_state();
            if state.mailbox.contains(id) {
                tracing::debug!(owner = %self.owner, task_id = %id, "Queued task holds no slot; stash ignored");
                return Ok(());
            }
            let slot = match state.executing.remove(&id) {
                Some(slot) => slot,
                // Inline tasks run on the caller's context and hold no handle.
                None if task.routing_status() == RoutingStatus::Executing => TaskSlot {
                    handle: None,
                    task: task.clone(),
                },
                None => {
                    tracing::debug!(owner = %self.owner, task_id = %id, "Task not running here; stash ignored");
                    return Ok(());
                }
            };
            state.stashed.insert(id, slot);
            task.set_stash_status(StashStatus::Stashed);
        }

        tracing::debug!(owner = %self.owner, task_id = %id, "Task stashed");
        // A slot just freed up.
        self.signal.raise();
        Ok(())
    }

    /// Move a stashed task back into the executing set. No-op unless stashed.
    pub fn restore_stashed_task(&self, task: &Arc<RoutedTask>) {
        if task.stash_status() != StashStatus::Stashed {
            return;
        }

        let id = task.id();
        let mut state = self.lock_state();
        if let Some(slot) = state.stashed.remove(&id) {
            if slot.handle.is_some() {
                state.executing.insert(id, slot);
            }
        }
        task.set_stash_status(StashStatus::None);
        tracing::debug!(owner = %self.owner, task_id = %id, "Stashed task restored");
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    pub fn clean_buffers(&self) {
        let mut state = self.lock_state();
        self.clean_locked(&mut state);
    }

    fn clean_locked(&self, state: &mut ReceiverState) {
        let finished: Vec<TaskId> = state
            .stashed
            .iter()
            .filter(|(_, slot)| slot.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in finished {
            if let Some(slot) = state.stashed.remove(&id) {
                self.reap(slot);
            }
        }

        let reverted: Vec<TaskId> = state
            .stashed
            .iter()
            .filter(|(_, slot)| slot.task.stash_status() == StashStatus::None)
            .map(|(id, _)| *id)
            .collect();
        for id in reverted {
            if let Some(slot) = state.stashed.remove(&id) {
                tracing::debug!(owner = %self.owner, task_id = %id, "Reconciling unstashed task");
                state.executing.insert(id, slot);
            }
        }

        if self.is_pooled() {
            let awaiting = state.awaiting;
            let finished: Vec<TaskId> = state
                .executing
                .iter()
                .filter(|(id, slot)| Some(**id) != awaiting && slot.is_finished())
                .map(|(id, _)| *id)
                .collect();
            for id in finished {
                if let Some(slot) = state.executing.remove(&id) {
                    self.reap(slot);
                }
            }
        }
    }

    /// Observe a finished handle; a faulted one disposes its task.
    fn reap(&self, mut slot: TaskSlot) {
        let Some(handle) = slot.handle.as_mut() else {
            return;
        };
        if let Some(Err(join_error)) = handle.now_or_never() {
            tracing::error!(
                owner = %self.owner,
                task_id = %slot.task.id(),
                label = %slot.task.label(),
                error = %join_error,
                "Pooled task aborted"
            );
            if !slot.task.is_disposed() {
                self.completion()
                    .drop_task(&slot.task, anyhow::anyhow!("pooled payload aborted: {join_error}"));
            }
        }
    }

    // ========================================================================
    // Single-task polling protocol
    // ========================================================================

    /// Pull one task forward by id and process it if it can be.
    ///
    /// Returns true iff the task ended disposed. Unknown ids return false
    /// without touching any state.
    pub async fn check_single_task(&self, id: TaskId) -> Result<bool, RoutingError> {
        let known = self.lock_state().find(id);
        let Some(known) = known else {
            return Ok(false);
        };

        self.clean_buffers();
        if self.is_pooled() {
            self.admit_ready().await?;
        }

        let located = {
            let mut state = self.lock_state();
            self.locate_locked(&mut state, id)
        };

        match located {
            Some(task) => {
                self.process(task.clone()).await?;
                self.observe(&task)
            }
            None => self.observe(&known),
        }
    }

    /// Launch queued tasks into free pooled slots.
    async fn admit_ready(&self) -> Result<(), RoutingError> {
        let budget = self.queued_len();
        for _ in 0..budget {
            let Some(task) = self.next_queued() else {
                break;
            };
            self.process(task).await?;
        }
        Ok(())
    }

    fn locate_locked(&self, state: &mut ReceiverState, id: TaskId) -> Option<Arc<RoutedTask>> {
        let unstashed_done = state
            .stashed
            .get(&id)
            .is_some_and(|slot| slot.task.stash_status() == StashStatus::None && slot.is_finished());
        if unstashed_done {
            if let Some(slot) = state.stashed.remove(&id) {
                let task = slot.task.clone();
                self.reap(slot);
                return Some(task);
            }
        }

        let match_done = state.executing.get(&id).is_some_and(TaskSlot::is_finished);
        if match_done {
            if let Some(slot) = state.executing.remove(&id) {
                let task = slot.task.clone();
                self.reap(slot);
                return Some(task);
            }
        }
        // Opportunistically reap one other ready slot.
        let awaiting = state.awaiting;
        let other = state
            .executing
            .iter()
            .find(|(other, slot)| **other != id && Some(**other) != awaiting && slot.is_finished())
            .map(|(other, _)| *other);
        if let Some(other) = other {
            if let Some(slot) = state.executing.remove(&other) {
                self.reap(slot);
            }
        }

        state.mailbox.remove(id)
    }

    /// Report whether a task is disposed, re-raising a `Rethrow` fault.
    fn observe(&self, task: &RoutedTask) -> Result<bool, RoutingError> {
        if !task.is_disposed() {
            return Ok(false);
        }
        match task.result() {
            Some(result) if result.should_rethrow() => Err(RoutingError::TaskFailed {
                task_id: task.id(),
                fault: result
                    .fault
                    .unwrap_or_else(|| Arc::new(anyhow::anyhow!("task failed without a fault"))),
            }),
            _ => Ok(true),
        }
    }

    /// Block until `task` is disposed or `timeout` elapses.
    ///
    /// Uses the default wait timeout when `timeout` is `None`. Returns true
    /// immediately when the receiver is synchronous, the task is `Sync`, or it
    /// is already disposed.
    pub async fn wait_single_task(
        &self,
        task: &Arc<RoutedTask>,
        timeout: Option<Duration>,
    ) -> Result<bool, RoutingError> {
        if self.config.synchronous || task.execution_mode() == ExecutionMode::Sync {
            self.observe(task)?;
            return Ok(true);
        }
        self.poll_until_disposed(task, timeout).await
    }

    /// Polling half of `wait_single_task`, without the inline shortcuts.
    ///
    /// Tasks that left through the router run elsewhere whatever their mode,
    /// so sync dispatch always waits here.
    async fn poll_until_disposed(
        &self,
        task: &Arc<RoutedTask>,
        timeout: Option<Duration>,
    ) -> Result<bool, RoutingError> {
        if task.is_disposed() {
            return self.observe(task);
        }

        let timeout = timeout.unwrap_or(self.config.default_wait_timeout);
        let deadline = Instant::now().checked_add(timeout);
        let id = task.id();
        let _exclusion = Exclusion::new(self, id);

        let drain_every = self.config.drain_every.max(1);
        let mut rounds: u32 = 0;
        loop {
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                tracing::debug!(owner = %self.owner, task_id = %id, "Wait for task timed out");
                return Ok(false);
            }

            if self.check_single_task(id).await? || self.observe(task)? {
                return Ok(true);
            }

            rounds = rounds.wrapping_add(1);
            if rounds % drain_every == 0 {
                if let Err(e) = self.drain().await {
                    tracing::warn!(owner = %self.owner, error = %e, "Draining sibling tasks failed");
                }
            }

            let interval = if self.handle_pending(id) {
                self.config.busy_poll_interval
            } else {
                self.config.idle_poll_interval
            };
            let nap = match deadline {
                Some(deadline) => interval.min(deadline.saturating_duration_since(Instant::now())),
                None => interval,
            };
            self.signal.wait(Some(nap)).await;
        }
    }

    fn handle_pending(&self, id: TaskId) -> bool {
        let state = self.lock_state();
        let pending = |slot: &TaskSlot| slot.handle.is_some() && !slot.is_finished();
        state.executing.get(&id).is_some_and(pending) || state.stashed.get(&id).is_some_and(pending)
    }

    // ========================================================================
    // Dispatch family
    // ========================================================================

    /// Route a task to this owner and run it inline right away.
    ///
    /// Returns true iff the task ended disposed.
    pub async fn dispatch_self_task(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
    ) -> Result<bool, RoutingError> {
        task.prepare_self_dispatch(lock)?;
        self.enqueue(task.clone())?;
        self.drain().await?;

        // Admission deferral may have stopped the drain before reaching it.
        let pending = self.lock_state().mailbox.remove(task.id());
        if let Some(pending) = pending {
            self.process(pending).await?;
        }
        self.observe(&task)
    }

    /// Send a task to its destination; it comes back here when done.
    pub fn dispatch_task_async(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
    ) -> Result<(), RoutingError> {
        self.dispatch_outbound(task, lock, true, true)
    }

    /// Send a task to its destination, which disposes it when done.
    pub fn dispatch_task_no_return_async(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
    ) -> Result<(), RoutingError> {
        self.dispatch_outbound(task, lock, false, true)
    }

    /// Unguarded async dispatch, then block until the task is disposed.
    pub async fn dispatch_task_sync(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
    ) -> Result<bool, RoutingError> {
        self.dispatch_outbound(task.clone(), lock, true, false)?;
        self.poll_until_disposed(&task, None).await
    }

    pub async fn dispatch_task_no_return_sync(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
    ) -> Result<bool, RoutingError> {
        self.dispatch_outbound(task.clone(), lock, false, false)?;
        self.poll_until_disposed(&task, None).await
    }

    fn dispatch_outbound(
        &self,
        task: Arc<RoutedTask>,
        lock: Option<LockHandle>,
        expect_return: bool,
        guarded: bool,
    ) -> Result<(), RoutingError> {
        if self.config.route_mode == RouteMode::ReceiverOnly {
            return Err(RoutingError::ReceiverOnly(self.owner));
        }
        if task.is_disposed() {
            return Err(RoutingError::TaskDisposed(task.id()));
        }
        if guarded {
            if let Some(guard) = &self.guard {
                if guard.rejects(&task) {
                    return Err(RoutingError::GuardRejected(task.id()));
                }
            }
        }

        let caller = expect_return.then_some(self.owner);
        task.prepare_outbound(caller, lock)?;
        tracing::debug!(
            owner = %self.owner,
            task_id = %task.id(),
            label = %task.label(),
            destination = ?task.destination(),
            expect_return,
            "Dispatching task"
        );
        self.router.route_task(task)
    }

    // ========================================================================
    // Run-loop internals
    // ========================================================================

    fn enqueue(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError> {
        let id = task.id();
        let status = task.routing_status();
        if status == RoutingStatus::Disposed {
            tracing::debug!(owner = %self.owner, task_id = %id, "Disposed task received; ignoring");
            return Ok(());
        }
        if !task.enable_self_loop() && !status.is_homebound() && task.caller() == Some(self.owner) {
            tracing::warn!(owner = %self.owner, task_id = %id, "Rejected self-routing loop");
            return Err(RoutingError::RoutingLoop {
                task_id: id,
                owner: self.owner,
            });
        }

        {
            let mut state = self.lock_state();
            if state.contains(id) {
                tracing::warn!(owner = %self.owner, task_id = %id, "Duplicate receive ignored");
                return Ok(());
            }
            if status == RoutingStatus::Dispatched {
                task.set_routing_status(RoutingStatus::Queued);
            }
            state.mailbox.push_back(task);
        }

        tracing::trace!(owner = %self.owner, task_id = %id, status = %status, "Task received");
        self.signal.raise();
        Ok(())
    }

    /// Put a not-ready task back at the tail for a later retry.
    fn requeue(&self, task: Arc<RoutedTask>) {
        tracing::trace!(owner = %self.owner, task_id = %task.id(), "Task not ready; re-enqueued");
        task.set_routing_status(RoutingStatus::Queued);
        self.lock_state().mailbox.push_back(task);
    }

    fn next_queued(&self) -> Option<Arc<RoutedTask>> {
        let mut state = self.lock_state();
        self.clean_locked(&mut state);
        if state.mailbox.is_empty() {
            return None;
        }
        if self.is_pooled() && state.executing.len() >= self.config.max_parallel_tasks {
            tracing::trace!(owner = %self.owner, "Parallelism cap reached; deferring admission");
            return None;
        }
        let ReceiverState {
            mailbox, excluded, ..
        } = &mut *state;
        mailbox.pop_next(excluded)
    }

    fn is_inlined(&self, task: &RoutedTask) -> bool {
        self.config.synchronous
            || task.execution_mode() == ExecutionMode::Sync
            || self.config.max_parallel_tasks == 1
    }

    async fn process(&self, task: Arc<RoutedTask>) -> Result<bool, RoutingError> {
        match task.routing_status() {
            RoutingStatus::Disposed => return Ok(true),
            RoutingStatus::Returned if task.caller() == Some(self.owner) => {
                task.set_routing_status(RoutingStatus::Disposed);
                tracing::debug!(owner = %self.owner, task_id = %task.id(), "Returned task disposed at caller");
                self.signal.raise();
                return Ok(true);
            }
            RoutingStatus::Returned => {
                tracing::warn!(owner = %self.owner, task_id = %task.id(), caller = ?task.caller(), "Returned task reached a foreign owner; dropped");
                return Ok(false);
            }
            // Already running further up this stack or on a pooled unit.
            RoutingStatus::Executing => return Ok(false),
            RoutingStatus::Dispatched | RoutingStatus::Queued => {}
        }

        let payload = task.payload().ok_or(RoutingError::MissingPayload(task.id()))?;
        let ctx = TaskContext::new(self.this.clone(), self.owner, task.clone());
        let completion = self.completion();
        task.set_routing_status(RoutingStatus::Executing);

        if self.is_inlined(&task) {
            tracing::trace!(owner = %self.owner, task_id = %task.id(), "Executing task inline");
            match (*payload)(ctx).await {
                Err(PayloadError::NotReady) => {
                    self.requeue(task);
                    return Ok(false);
                }
                Ok(value) => completion.settle(&task, Ok(value)),
                Err(PayloadError::Failed(fault)) => completion.settle(&task, Err(fault)),
            }
            return Ok(task.is_disposed());
        }

        let mut state = self.lock_state();
        let worker_task = task.clone();
        let handle = tokio::spawn(async move {
            match (*payload)(ctx).await {
                Ok(value) => completion.settle(&worker_task, Ok(value)),
                Err(PayloadError::Failed(fault)) => completion.settle(&worker_task, Err(fault)),
                Err(PayloadError::NotReady) => {
                    tracing::error!(
                        owner = %completion.owner,
                        task_id = %worker_task.id(),
                        "Pooled payload signalled not-ready; pooled payloads cannot be retried"
                    );
                    completion.drop_task(
                        &worker_task,
                        anyhow::anyhow!("payload signalled not-ready on a pooled execution path"),
                    );
                }
            }
        });
        tracing::trace!(owner = %self.owner, task_id = %task.id(), "Executing task on pooled unit");
        state.executing.insert(
            task.id(),
            TaskSlot {
                handle: Some(handle),
                task,
            },
        );
        Ok(false)
    }

    fn completion(&self) -> Completion {
        Completion {
            owner: self.owner,
            router: self.router.clone(),
            signal: self.signal.clone(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ReceiverState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TaskReceiver for RoutingReceiver {
    fn owner_id(&self) -> OwnerId {
        self.owner
    }

    fn receive_task(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError> {
        self.enqueue(task)
    }

    fn get_next_queued_task(&self) -> Option<Arc<RoutedTask>> {
        self.next_queued()
    }

    fn queued_len(&self) -> usize {
        self.lock_state().mailbox.len()
    }

    async fn process_task(&self, task: Arc<RoutedTask>) -> Result<bool, RoutingError> {
        self.process(task).await
    }
}

impl std::fmt::Debug for RoutingReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingReceiver")
            .field("owner", &self.owner)
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

/// Marks a task as awaited for the lifetime of a wait
struct Exclusion<'a> {
    receiver: &'a RoutingReceiver,
    id: TaskId,
    previous: Option<TaskId>,
}

impl<'a> Exclusion<'a> {
    fn new(receiver: &'a RoutingReceiver, id: TaskId) -> Self {
        let mut state = receiver.lock_state();
        state.excluded.insert(id);
        let previous = state.awaiting.replace(id);
        drop(state);
        Self {
            receiver,
            id,
            previous,
        }
    }
}

impl Drop for Exclusion<'_> {
    fn drop(&mut self) {
        let mut state = self.receiver.lock_state();
        state.excluded.remove(&self.id);
        if state.awaiting == Some(self.id) {
            state.awaiting = self.previous;
        }
    }
}
