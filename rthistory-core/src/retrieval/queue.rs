use std::collections::VecDeque;

use super::task::TaskItem;

/// FIFO of pending tasks, exclusively owned by one scheduler run.
///
/// There is no "already enqueued" bookkeeping here. Duplicates are filtered
/// by the existence cache when they are handled.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: VecDeque<TaskItem>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, task: TaskItem) {
        self.items.push_back(task);
    }

    pub fn pop(&mut self) -> Option<TaskItem> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaskItem> {
        self.items.iter()
    }
}

impl Extend<TaskItem> for WorkQueue {
    fn extend<I: IntoIterator<Item = TaskItem>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl FromIterator<TaskItem> for WorkQueue {
    fn from_iter<I: IntoIterator<Item = TaskItem>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}
