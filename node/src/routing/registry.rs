//! In-process task router
//!
//! Maps owner ids to their receivers. Entries are weak so the registry never
//! keeps a dropped owner alive; stale entries are pruned on lookup.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use shared_types::{OwnerId, RoutingStatus};

use super::protocol::{RoutingError, TaskReceiver, TaskRouter};
use super::task::RoutedTask;

#[derive(Default)]
pub struct TaskRegistry {
    receivers: DashMap<OwnerId, Weak<dyn TaskReceiver>>,
}

impl TaskRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register<R: TaskReceiver + 'static>(&self, receiver: &Arc<R>) {
        let owner = receiver.owner_id();
        let receiver: Arc<dyn TaskReceiver> = receiver.clone();
        self.receivers.insert(owner, Arc::downgrade(&receiver));
        tracing::debug!(owner = %owner, "Receiver registered");
    }

    pub fn deregister(&self, owner: OwnerId) -> bool {
        let removed = self.receivers.remove(&owner).is_some();
        if removed {
            tracing::debug!(owner = %owner, "Receiver deregistered");
        }
        removed
    }

    pub fn resolve(&self, owner: OwnerId) -> Option<Arc<dyn TaskReceiver>> {
        let upgraded = self.receivers.get(&owner).map(|entry| entry.value().upgrade());
        match upgraded {
            Some(Some(receiver)) => Some(receiver),
            Some(None) => {
                self.receivers.remove(&owner);
                tracing::debug!(owner = %owner, "Pruned dropped receiver");
                None
            }
            None => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}

impl TaskRouter for TaskRegistry {
    fn route_task(&self, task: Arc<RoutedTask>) -> Result<(), RoutingError> {
        let target = if task.routing_status() == RoutingStatus::Returned {
            task.caller()
        } else {
            task.destination()
        };
        let owner = target.ok_or(RoutingError::NoRoute(task.id()))?;
        let receiver = self
            .resolve(owner)
            .ok_or(RoutingError::UnknownOwner(owner))?;

        tracing::trace!(task_id = %task.id(), owner = %owner, "Routing task");
        receiver.receive_task(task)
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("receivers", &self.receivers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::{ReceiverArguments, ReceiverConfig, RoutingReceiver};
    use serde_json::json;

    fn receiver(registry: &Arc<TaskRegistry>, name: &str) -> Arc<RoutingReceiver> {
        let receiver = RoutingReceiver::new(ReceiverArguments::new(
            name,
            ReceiverConfig::default(),
            registry.clone(),
        ));
        registry.register(&receiver);
        receiver
    }

    #[test]
    fn test_routes_to_destination_mailbox() {
        let registry = TaskRegistry::new();
        let peer = receiver(&registry, "peer");
        let task = RoutedTask::builder("ping")
            .to(peer.owner())
            .payload(|_ctx| async { Ok(json!("pong")) })
            .build();

        registry.route_task(task.clone()).expect("route");
        assert!(peer.is_queued(task.id()));
        assert_eq!(task.routing_status(), RoutingStatus::Queued);
    }

    #[test]
    fn test_task_without_destination_has_no_route() {
        let registry = TaskRegistry::new();
        let task = RoutedTask::builder("nowhere").build();
        let err = registry.route_task(task).unwrap_err();
        assert!(matches!(err, RoutingError::NoRoute(_)));
    }

    #[test]
    fn test_dropped_receiver_is_pruned() {
        let registry = TaskRegistry::new();
        let owner = {
            let peer = receiver(&registry, "ephemeral");
            peer.owner()
        };
        assert_eq!(registry.len(), 1);

        let task = RoutedTask::builder("late").to(owner).build();
        let err = registry.route_task(task).unwrap_err();
        assert!(matches!(err, RoutingError::UnknownOwner(o) if o == owner));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deregister() {
        let registry = TaskRegistry::new();
        let peer = receiver(&registry, "peer");
        assert!(registry.deregister(peer.owner()));
        assert!(!registry.deregister(peer.owner()));
        assert!(registry.resolve(peer.owner()).is_none());
    }
}
