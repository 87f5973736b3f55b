//! Progress reporting
//!
//! Per-task byte counts come from the transfer callback and are throttled
//! without taking a lock. Aggregate counts are sampled from the queue by a
//! monitor task on a fixed interval.

use super::queue::{StatusCounts, TaskQueue};
use super::task::TaskStatus;
use super::transfer::ProgressCallback;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

/// Progress update for one task
#[derive(Debug, Clone, PartialEq)]
pub struct TaskProgress {
    pub task_id: Uuid,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub speed: f64, // bytes per second
}

impl TaskProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some(self.downloaded as f64 * 100.0 / total as f64),
            _ => None,
        }
    }
}

/// Batch-wide counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateProgress {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub active: usize,
    pub total: usize,
}

impl From<StatusCounts> for AggregateProgress {
    fn from(counts: StatusCounts) -> Self {
        Self {
            succeeded: counts.placed,
            failed: counts.failed,
            skipped: counts.skipped,
            active: counts.active,
            total: counts.total,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Task(TaskProgress),
    Status { task_id: Uuid, status: TaskStatus },
    Aggregate(AggregateProgress),
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Lock-free "at most once per interval" gate shared by concurrent callers
#[derive(Debug)]
pub struct Throttle {
    start: Instant,
    interval_ms: u64,
    // Milliseconds since `start` of the last accepted update
    last_update_ms: AtomicU64,
}

impl Throttle {
    pub fn new(interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            interval_ms: interval.as_millis() as u64,
            last_update_ms: AtomicU64::new(0),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// True for the single caller that wins this interval
    pub fn try_pass(&self) -> bool {
        let elapsed_ms = self.start.elapsed().as_millis() as u64;
        let last_ms = self.last_update_ms.load(Ordering::Relaxed);
        if elapsed_ms.saturating_sub(last_ms) < self.interval_ms {
            return false;
        }
        self.last_update_ms
            .compare_exchange(last_ms, elapsed_ms, Ordering::SeqCst, Ordering::Relaxed)
            .is_ok()
    }
}

/// Build the transfer callback for one task.
///
/// Throttled updates are written back to the queue and forwarded to `sender`.
pub fn task_callback(task_id: Uuid, queue: TaskQueue, sender: Option<ProgressSender>) -> ProgressCallback {
    let throttle = Arc::new(Throttle::new(PROGRESS_INTERVAL));

    Box::new(move |downloaded: u64, total: Option<u64>| {
        if !throttle.try_pass() {
            return;
        }

        let elapsed = throttle.elapsed().as_secs_f64();
        let speed = if elapsed > 0.0 { downloaded as f64 / elapsed } else { 0.0 };
        if let Some(tx) = &sender {
            let _ = tx.send(ProgressEvent::Task(TaskProgress {
                task_id,
                downloaded,
                total,
                speed,
            }));
        }

        // Only spawn once the throttle has been passed
        let queue = queue.clone();
        tokio::spawn(async move {
            queue
                .modify(task_id, |task| {
                    task.downloaded = downloaded;
                    task.size_hint = total.or(task.size_hint);
                })
                .await;
        });
    })
}

/// Emit an aggregate snapshot every [`PROGRESS_INTERVAL`] until `stop` fires,
/// then one final snapshot
pub fn spawn_aggregate_monitor(queue: TaskQueue, sender: ProgressSender, stop: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let aggregate = AggregateProgress::from(queue.counts().await);
                    if sender.send(ProgressEvent::Aggregate(aggregate)).is_err() {
                        return;
                    }
                }
            }
        }
        let aggregate = AggregateProgress::from(queue.counts().await);
        let _ = sender.send(ProgressEvent::Aggregate(aggregate));
    })
}
