//! Per-task serialization of read-modify-write cycles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// In-process async mutex per task id.
///
/// Entries are dropped once no caller holds or waits on them, so the map
/// only grows with the number of tasks being worked on concurrently.
#[derive(Default)]
pub struct TaskLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

/// Held for the duration of one engine operation.
pub struct TaskLockGuard<'a> {
    owner: &'a TaskLocks,
    task_id: Uuid,
    guard: Option<OwnedMutexGuard<()>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, task_id: Uuid) -> TaskLockGuard<'_> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            locks.entry(task_id).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        TaskLockGuard {
            owner: self,
            task_id,
            guard: Some(guard),
        }
    }

    /// Number of tasks with a live lock entry.
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for TaskLockGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut locks = self
            .owner
            .locks
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        // Only the map holds a reference once nobody is waiting.
        if locks
            .get(&self.task_id)
            .is_some_and(|l| Arc::strong_count(l) == 1)
        {
            locks.remove(&self.task_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = TaskLocks::new();
        let id = Uuid::new_v4();
        {
            let _guard = locks.acquire(id).await;
            assert_eq!(locks.len(), 1);
        }
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_same_task_is_serialized() {
        let locks = Arc::new(TaskLocks::new());
        let id = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(id).await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_different_tasks_do_not_block() {
        let locks = TaskLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4())).await;
        assert!(b.is_ok());
    }
}
