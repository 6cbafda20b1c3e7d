//! Per-owner inbound FIFO

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use shared_types::TaskId;

use super::task::RoutedTask;

#[derive(Debug, Default)]
pub struct Mailbox {
    queue: VecDeque<Arc<RoutedTask>>,
}

impl Mailbox {
    pub fn push_back(&mut self, task: Arc<RoutedTask>) {
        self.queue.push_back(task);
    }

    /// Pop the oldest task whose id is not excluded
    pub fn pop_next(&mut self, excluded: &HashSet<TaskId>) -> Option<Arc<RoutedTask>> {
        let position = self
            .queue
            .iter()
            .position(|task| !excluded.contains(&task.id()))?;
        self.queue.remove(position)
    }

    /// Pull a task out of order by id
    pub fn remove(&mut self, id: TaskId) -> Option<Arc<RoutedTask>> {
        let position = self.queue.iter().position(|task| task.id() == id)?;
        self.queue.remove(position)
    }

    pub fn get(&self, id: TaskId) -> Option<&Arc<RoutedTask>> {
        self.queue.iter().find(|task| task.id() == id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
