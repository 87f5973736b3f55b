use super::task::{DownloadTask, TaskStatus};
use crate::util::range::PlaylistRange;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Counts by outcome, used for the batch summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub placed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pending: usize,
    pub active: usize,
    /// Selected tasks only
    pub total: usize,
}

impl StatusCounts {
    pub fn tally<'a>(tasks: impl IntoIterator<Item = &'a DownloadTask>) -> Self {
        let mut counts = Self::default();
        for task in tasks.into_iter().filter(|t| t.selected) {
            counts.total += 1;
            match task.status {
                TaskStatus::Placed => counts.placed += 1,
                TaskStatus::SkippedDuplicate => counts.skipped += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Pending => counts.pending += 1,
                _ => counts.active += 1,
            }
        }
        counts
    }

    /// Placed or skipped
    pub fn succeeded(&self) -> usize {
        self.placed + self.skipped
    }
}

/// Ordered task list shared between the editor and the scheduler
#[derive(Clone, Default)]
pub struct TaskQueue {
    pub(crate) tasks: Arc<RwLock<VecDeque<DownloadTask>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tasks(tasks: Vec<DownloadTask>) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(tasks.into())),
        }
    }

    pub async fn add(&self, task: DownloadTask) {
        let mut tasks = self.tasks.write().await;
        tasks.push_back(task);
    }

    pub async fn get_all(&self) -> Vec<DownloadTask> {
        let tasks = self.tasks.read().await;
        tasks.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    pub async fn remove(&self, id: Uuid) -> Option<DownloadTask> {
        let mut tasks = self.tasks.write().await;
        let pos = tasks.iter().position(|t| t.id == id)?;
        tasks.remove(pos)
    }

    pub async fn get_by_id(&self, id: Uuid) -> Option<DownloadTask> {
        let tasks = self.tasks.read().await;
        tasks.iter().find(|t| t.id == id).cloned()
    }

    pub async fn update(&self, task: DownloadTask) {
        let mut tasks = self.tasks.write().await;
        if let Some(pos) = tasks.iter().position(|t| t.id == task.id) {
            tasks[pos] = task;
        }
    }

    /// Apply `f` to the task in place; false when the id is unknown
    pub async fn modify(&self, id: Uuid, f: impl FnOnce(&mut DownloadTask)) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.iter_mut().find(|t| t.id == id) {
            Some(task) => {
                f(task);
                true
            }
            None => false,
        }
    }

    /// Insert `new_tasks` directly after `id`, keeping their order
    pub async fn insert_after(&self, id: Uuid, new_tasks: Vec<DownloadTask>) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(pos) = tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        for (offset, task) in new_tasks.into_iter().enumerate() {
            tasks.insert(pos + 1 + offset, task);
        }
        true
    }

    /// Id at a 1-based queue position
    pub async fn id_at(&self, position: usize) -> Option<Uuid> {
        let tasks = self.tasks.read().await;
        position.checked_sub(1).and_then(|i| tasks.get(i)).map(|t| t.id)
    }

    /// Set `selected` for every 1-based position in `range`; returns how many changed
    pub async fn set_selected(&self, range: &PlaylistRange, selected: bool) -> usize {
        let mut tasks = self.tasks.write().await;
        let mut changed = 0;
        for (i, task) in tasks.iter_mut().enumerate() {
            if range.contains(i as u32 + 1) && task.selected != selected {
                task.selected = selected;
                changed += 1;
            }
        }
        changed
    }

    pub async fn move_up(&self, id: Uuid) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.iter().position(|t| t.id == id) {
            Some(pos) => {
                if pos > 0 {
                    tasks.swap(pos, pos - 1);
                }
                true
            }
            None => false,
        }
    }

    pub async fn move_down(&self, id: Uuid) -> bool {
        let mut tasks = self.tasks.write().await;
        match tasks.iter().position(|t| t.id == id) {
            Some(pos) => {
                if pos + 1 < tasks.len() {
                    tasks.swap(pos, pos + 1);
                }
                true
            }
            None => false,
        }
    }

    /// Move task to the front of the queue
    pub async fn move_to_top(&self, id: Uuid) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(pos) = tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        if let Some(task) = tasks.remove(pos) {
            tasks.push_front(task);
        }
        true
    }

    /// Move task to the end of the queue
    pub async fn move_to_bottom(&self, id: Uuid) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(pos) = tasks.iter().position(|t| t.id == id) else {
            return false;
        };
        if let Some(task) = tasks.remove(pos) {
            tasks.push_back(task);
        }
        true
    }

    pub async fn counts(&self) -> StatusCounts {
        let tasks = self.tasks.read().await;
        StatusCounts::tally(tasks.iter())
    }
}
