//! Node runtime - routed-task scheduling between workflow actors
//!
//! This crate provides the in-process concurrency primitive every workflow
//! owner of the node (chain sync, peers, mining, wallet) uses to hand work to
//! the others: per-owner mailboxes, a bounded worker pool, stashing of long
//! operations, and blocking wait-with-timeout.

pub mod config;
pub mod routing;
pub mod workflow;

pub use config::NodeConfig;
pub use routing::{
    ReceiverArguments, ReceiverConfig, RoutedTask, RoutingError, RoutingReceiver, TaskReceiver,
    TaskRegistry, TaskRouter,
};
pub use workflow::{Workflow, WorkflowHost};
