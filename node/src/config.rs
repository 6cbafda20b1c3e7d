use std::time::Duration;

use crate::routing::ReceiverConfig;

/// Node settings read from the environment (and `.env`)
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Height the chain sync workflow stops at
    pub sync_target_height: u64,
    /// Parallelism cap of the peer service receiver
    pub peer_parallel_tasks: usize,
    /// Whether receivers accept stash requests
    pub enable_stashing: bool,
    /// Poll interval while an awaited task is known to be running
    pub busy_poll: Duration,
    /// Poll interval while nothing known is running
    pub idle_poll: Duration,
    /// How long an idle owner loop sleeps before doing work again
    pub idle_wait: Duration,
    /// Bound for waits that do not pass one explicitly
    pub wait_timeout: Duration,
    /// Stop the node after this long; run until Ctrl-C when unset
    pub run_for: Option<Duration>,
}

impl NodeConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let run_for_secs: u64 = env_parse("NODE_RUN_FOR_SECS", 0)?;

        Ok(Self {
            sync_target_height: env_parse("NODE_SYNC_TARGET_HEIGHT", 32)?,
            peer_parallel_tasks: env_parse("NODE_PEER_PARALLEL_TASKS", 4)?,
            enable_stashing: env_parse("NODE_ENABLE_STASHING", true)?,
            busy_poll: Duration::from_millis(env_parse("NODE_BUSY_POLL_MS", 1)?),
            idle_poll: Duration::from_millis(env_parse("NODE_IDLE_POLL_MS", 20)?),
            idle_wait: Duration::from_millis(env_parse("NODE_IDLE_WAIT_MS", 100)?),
            wait_timeout: Duration::from_secs(env_parse("NODE_WAIT_TIMEOUT_SECS", 30)?),
            run_for: (run_for_secs > 0).then(|| Duration::from_secs(run_for_secs)),
        })
    }

    /// Receiver settings shared by every owner, with a per-owner cap
    pub fn receiver_config(&self, max_parallel_tasks: usize) -> ReceiverConfig {
        ReceiverConfig::pooled(max_parallel_tasks)
            .with_stashing(self.enable_stashing)
            .with_poll_intervals(self.busy_poll, self.idle_poll)
            .with_default_wait_timeout(self.wait_timeout)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(val) => val
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse env var {key}={val}: {e}")),
        Err(_) => Ok(default),
    }
}
