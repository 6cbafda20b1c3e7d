//! Receiver configuration

use std::time::Duration;

use shared_types::RouteMode;

/// Tuning knobs of one [`RoutingReceiver`](super::RoutingReceiver)
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverConfig {
    /// Cap on concurrently executing pooled tasks; 1 means every task runs inline
    pub max_parallel_tasks: usize,
    pub enable_stashing: bool,
    pub route_mode: RouteMode,
    /// Run every task inline and treat every wait as already satisfied
    pub synchronous: bool,
    /// Poll interval while an awaited task has a pending handle
    pub busy_poll_interval: Duration,
    /// Poll interval while nothing known is running
    pub idle_poll_interval: Duration,
    /// Drain unrelated ready tasks every this many poll rounds of a wait
    pub drain_every: u32,
    /// Bound used by `wait` and `wait_single_task` when no timeout is given
    pub default_wait_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 1,
            enable_stashing: false,
            route_mode: RouteMode::Emitter,
            synchronous: false,
            busy_poll_interval: Duration::from_millis(1),
            idle_poll_interval: Duration::from_millis(20),
            drain_every: 4,
            default_wait_timeout: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl ReceiverConfig {
    pub fn pooled(max_parallel_tasks: usize) -> Self {
        Self::default().with_max_parallel_tasks(max_parallel_tasks)
    }

    pub fn with_max_parallel_tasks(mut self, max_parallel_tasks: usize) -> Self {
        self.max_parallel_tasks = max_parallel_tasks;
        self
    }

    pub fn with_stashing(mut self, enabled: bool) -> Self {
        self.enable_stashing = enabled;
        self
    }

    pub fn receiver_only(mut self) -> Self {
        self.route_mode = RouteMode::ReceiverOnly;
        self
    }

    pub fn synchronous(mut self) -> Self {
        self.synchronous = true;
        self
    }

    pub fn with_poll_intervals(mut self, busy: Duration, idle: Duration) -> Self {
        self.busy_poll_interval = busy;
        self.idle_poll_interval = idle;
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }

    /// Whether tasks without a `Sync` tag run on tracked background units
    pub fn is_pooled(&self) -> bool {
        !self.synchronous && self.max_parallel_tasks > 1
    }
}
