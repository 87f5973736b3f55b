//! Concurrency lanes
//!
//! The queue is partitioned by [`SourceClass`]. Each lane has:
//! - its own ordered list of task ids (queue order is preserved)
//! - a semaphore sized to the lane's legal parallelism
//! - a cool-down applied between tasks of serial lanes

use super::task::{DownloadTask, SourceClass};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use uuid::Uuid;

#[derive(Clone)]
pub struct Lane {
    class: SourceClass,
    task_ids: Vec<Uuid>,
    semaphore: Arc<Semaphore>,
    cooldown: Duration,
}

impl Lane {
    pub fn new(class: SourceClass, parallelism: usize, serial_cooldown: Duration) -> Self {
        let (permits, cooldown) = match class {
            SourceClass::DirectParallel => (parallelism.max(1), Duration::ZERO),
            SourceClass::RateLimitedSerial | SourceClass::CacheThenFetchSerial => (1, serial_cooldown),
        };
        Self {
            class,
            task_ids: Vec::new(),
            semaphore: Arc::new(Semaphore::new(permits)),
            cooldown,
        }
    }

    pub fn class(&self) -> SourceClass {
        self.class
    }

    pub fn task_ids(&self) -> &[Uuid] {
        &self.task_ids
    }

    pub fn is_serial(&self) -> bool {
        self.class != SourceClass::DirectParallel
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn semaphore(&self) -> Arc<Semaphore> {
        Arc::clone(&self.semaphore)
    }

    /// Legal concurrency of this lane
    pub fn permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    fn push(&mut self, id: Uuid) {
        self.task_ids.push(id);
    }
}

/// Split runnable tasks into lanes in queue order.
///
/// Only selected tasks that are not terminal are included. Lanes come back
/// in a fixed order (parallel, rate-limited, cache-then-fetch) and empty
/// lanes are dropped.
pub fn partition(tasks: &[DownloadTask], parallelism: usize, serial_cooldown: Duration) -> Vec<Lane> {
    let mut lanes = [
        Lane::new(SourceClass::DirectParallel, parallelism, serial_cooldown),
        Lane::new(SourceClass::RateLimitedSerial, parallelism, serial_cooldown),
        Lane::new(SourceClass::CacheThenFetchSerial, parallelism, serial_cooldown),
    ];

    for task in tasks.iter().filter(|t| t.selected && !t.status.is_terminal()) {
        let lane = match task.source_class {
            SourceClass::DirectParallel => &mut lanes[0],
            SourceClass::RateLimitedSerial => &mut lanes[1],
            SourceClass::CacheThenFetchSerial => &mut lanes[2],
        };
        lane.push(task.id);
    }

    lanes.into_iter().filter(|l| !l.task_ids.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::task::TaskStatus;
    use crate::resolve::source::SourceKind;

    fn task(source: SourceKind) -> DownloadTask {
        DownloadTask::new("x", source, "x.mkv")
    }

    #[test]
    fn test_partition_by_class_in_queue_order() {
        let tasks = vec![
            task(SourceKind::Direct),
            task(SourceKind::Video),
            task(SourceKind::Magnet),
            task(SourceKind::Gofile),
            task(SourceKind::Mega),
        ];
        let lanes = partition(&tasks, 4, Duration::from_secs(3));

        assert_eq!(lanes.len(), 3);
        assert_eq!(lanes[0].class(), SourceClass::DirectParallel);
        assert_eq!(lanes[0].task_ids(), &[tasks[0].id, tasks[3].id]);
        assert_eq!(lanes[1].task_ids(), &[tasks[1].id, tasks[4].id]);
        assert_eq!(lanes[2].task_ids(), &[tasks[2].id]);
    }

    #[test]
    fn test_lane_limits() {
        let tasks = vec![task(SourceKind::Direct), task(SourceKind::OneFichier)];
        let lanes = partition(&tasks, 5, Duration::from_secs(3));

        assert_eq!(lanes[0].permits(), 5);
        assert_eq!(lanes[0].cooldown(), Duration::ZERO);
        assert!(!lanes[0].is_serial());
        assert_eq!(lanes[1].permits(), 1);
        assert_eq!(lanes[1].cooldown(), Duration::from_secs(3));
    }

    #[test]
    fn test_partition_skips_terminal_and_deselected() {
        let mut placed = task(SourceKind::Direct);
        placed.status = TaskStatus::Placed;
        let mut deselected = task(SourceKind::Direct);
        deselected.selected = false;
        let mut failed = task(SourceKind::Direct);
        failed.status = TaskStatus::Failed;

        let lanes = partition(&[placed, deselected, failed], 3, Duration::ZERO);
        assert!(lanes.is_empty());
    }
}
