//! Workflow owners and their run loop
//!
//! A [`Workflow`] is the business side of an owner (chain sync, peers,
//! mining, wallet). [`WorkflowHost`] gives it a [`RoutingReceiver`], registers
//! it with the [`TaskRegistry`] and runs the owner loop:
//!
//! ```text
//! loop {
//!     do_work            (directly, or routed through dispatch_self_task)
//!     drain mailbox
//!     wait_timeout(idle) (or shutdown)
//! }
//! ```

pub mod chain;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::routing::{
    PayloadError, ReceiverArguments, ReceiverConfig, RoutedTask, RoutingReceiver, TaskReceiver,
    TaskRegistry,
};

pub use chain::{ChainSyncWorkflow, PeerWorkflow};

#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Route `do_work` through the scheduler as a self-dispatched task, so
    /// the work itself can be stashed and waited on like any other task.
    fn routes_through_scheduler(&self) -> bool {
        false
    }

    /// One increment of the workflow's own work
    async fn do_work(&self, receiver: Arc<RoutingReceiver>) -> anyhow::Result<()>;
}

/// Owns one workflow and its receiver
pub struct WorkflowHost<W: Workflow> {
    workflow: Arc<W>,
    receiver: Arc<RoutingReceiver>,
    registry: Arc<TaskRegistry>,
    idle_wait: Duration,
}

impl<W: Workflow> WorkflowHost<W> {
    pub fn new(workflow: W, config: ReceiverConfig, registry: Arc<TaskRegistry>) -> Self {
        let receiver = RoutingReceiver::new(ReceiverArguments::new(
            workflow.name(),
            config,
            registry.clone(),
        ));
        registry.register(&receiver);
        Self {
            workflow: Arc::new(workflow),
            receiver,
            registry,
            idle_wait: Duration::from_millis(100),
        }
    }

    pub fn with_idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn receiver(&self) -> &Arc<RoutingReceiver> {
        &self.receiver
    }

    pub fn workflow(&self) -> &Arc<W> {
        &self.workflow
    }

    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let owner = self.receiver.owner();
        tracing::info!(workflow = %self.workflow.name(), owner = %owner, "Workflow host starting");

        while !shutdown.is_cancelled() {
            if let Err(e) = self.work_once().await {
                tracing::warn!(workflow = %self.workflow.name(), error = %e, "Workflow work step failed");
            }
            if let Err(e) = self.receiver.drain().await {
                tracing::warn!(workflow = %self.workflow.name(), error = %e, "Mailbox drain failed");
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = self.receiver.wait_timeout(self.idle_wait) => {}
            }
        }

        self.registry.deregister(owner);
        tracing::info!(workflow = %self.workflow.name(), owner = %owner, "Workflow host stopped");
        Ok(())
    }

    async fn work_once(&self) -> anyhow::Result<()> {
        if !self.workflow.routes_through_scheduler() {
            return self.workflow.do_work(self.receiver.clone()).await;
        }

        let workflow = self.workflow.clone();
        let task = RoutedTask::builder(format!("{}.do_work", self.workflow.name()))
            .rethrow()
            .payload(move |ctx| {
                let workflow = workflow.clone();
                async move {
                    let receiver = ctx.owner().context("owner receiver dropped")?;
                    workflow.do_work(receiver).await?;
                    Ok::<_, PayloadError>(serde_json::Value::Null)
                }
            })
            .build();
        self.receiver
            .dispatch_self_task(task, None)
            .await
            .context("self-dispatched work failed")?;
        Ok(())
    }
}
