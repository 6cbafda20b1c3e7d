//! Routed-task scheduling and dispatch
//!
//! Workflow owners pass units of work to each other as [`RoutedTask`]s. Each
//! owner holds one [`RoutingReceiver`], and owners find each other through a
//! [`TaskRouter`] (in-process: [`TaskRegistry`]).
//!
//! ## Data flow
//!
//! ```text
//! producer ── dispatch_* ──▶ TaskRouter ──▶ destination mailbox
//!                                              │ drain (cap-bounded)
//!                                              ▼
//!                                         process_task ── inline | pooled
//!                                              │
//!            caller mailbox ◀── Returned ──────┘ (or Disposed in place)
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = TaskRegistry::new();
//! let peer = RoutingReceiver::new(ReceiverArguments::new(
//!     "peer",
//!     ReceiverConfig::pooled(4),
//!     registry.clone(),
//! ));
//! registry.register(&peer);
//!
//! let task = RoutedTask::builder("headers")
//!     .to(peer.owner())
//!     .payload(|_ctx| async { Ok(serde_json::json!({ "height": 1 })) })
//!     .build();
//! sync.dispatch_task_sync(task.clone(), None).await?;
//! ```

pub mod config;
pub mod mailbox;
pub mod protocol;
pub mod receiver;
pub mod registry;
pub mod signal;
pub mod task;

pub use config::ReceiverConfig;
pub use mailbox::Mailbox;
pub use protocol::{DispatchGuard, RoutingError, TaskReceiver, TaskRouter};
pub use receiver::{ReceiverArguments, RoutingReceiver};
pub use registry::TaskRegistry;
pub use signal::WakeSignal;
pub use task::{
    LockHandle, PayloadError, PayloadResult, RoutedTask, RoutedTaskBuilder, TaskContext,
    TaskExecutionResult, TaskFault, TaskPayload,
};
