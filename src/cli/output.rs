use crate::download::history::HistoryEntry;
use crate::download::progress::AggregateProgress;
use crate::download::scheduler::BatchReport;
use crate::download::task::{DownloadTask, TaskStatus};
use crate::file::classify::ClassificationResult;

/// Format bytes into human-readable string (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn status_icon(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => " ",
        TaskStatus::Resolving | TaskStatus::Downloading | TaskStatus::Extracting | TaskStatus::Classifying => ">",
        TaskStatus::Placed => "+",
        TaskStatus::Failed => "x",
        TaskStatus::SkippedDuplicate => "=",
    }
}

/// One queue row: `  3 [x] + Show - S01E02.mkv  (direct, 1.20 GB)`
pub fn format_task(position: usize, task: &DownloadTask) -> String {
    let mut line = format!(
        "{:>3} [{}] {} {}",
        position,
        if task.selected { "x" } else { " " },
        status_icon(task.status),
        task.suggested_name
    );

    let mut details = vec![task.source.label().to_string()];
    if let Some(index) = task.playlist_index {
        details.push(format!("#{}", index));
    }
    if let Some(size) = task.size_hint {
        details.push(format_bytes(size));
    }
    line.push_str(&format!("  ({})", details.join(", ")));

    if task.status == TaskStatus::Failed {
        if let Some(error) = &task.last_error {
            line.push_str(&format!("\n      {}", error));
        }
    }
    line
}

pub fn format_queue(tasks: &[DownloadTask], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(tasks).unwrap_or_else(|_| "[]".to_string());
    }
    if tasks.is_empty() {
        return "Queue is empty.".to_string();
    }

    let selected = tasks.iter().filter(|t| t.selected).count();
    let mut lines: Vec<String> = tasks.iter().enumerate().map(|(i, t)| format_task(i + 1, t)).collect();
    lines.push(format!("{} of {} selected", selected, tasks.len()));
    lines.join("\n")
}

pub fn format_history(entries: &[HistoryEntry], json: bool) -> String {
    if json {
        return serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string());
    }
    if entries.is_empty() {
        return "No history yet.".to_string();
    }

    entries
        .iter()
        .map(|e| {
            format!(
                "{}  {}  [{}]  {}\n    {}",
                e.timestamp.format("%Y-%m-%d %H:%M:%S"),
                e.filename,
                e.source_class.label(),
                format_bytes(e.size),
                e.destination_path.display()
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Single status line, redrawn in place while a batch runs
pub fn format_progress(progress: &AggregateProgress) -> String {
    let done = progress.succeeded + progress.failed + progress.skipped;
    format!(
        "[{}/{}] {} active, {} succeeded, {} failed, {} skipped",
        done, progress.total, progress.active, progress.succeeded, progress.failed, progress.skipped
    )
}

pub fn format_report(report: &BatchReport) -> String {
    let mut lines = Vec::new();
    for failure in report.failures() {
        lines.push(format!(
            "  x {}: {}",
            failure.name,
            failure.error.as_deref().unwrap_or("unknown error")
        ));
    }
    if report.cancelled {
        lines.push("Cancelled; run `reelhaul resume` to continue.".to_string());
    }
    lines.push(report.summary());
    lines.join("\n")
}

pub fn format_classification(result: &ClassificationResult) -> String {
    let mut lines = vec![format!("Category: {:?}", result.category), format!("Name:     {}", result.show_name)];
    if result.episode > 0 {
        lines.push(format!("Episode:  S{:02}E{:02}", result.season, result.episode));
    }
    if let Some(part) = &result.part_suffix {
        lines.push(format!("Part:     {}", part));
    }
    lines.push(format!("Path:     {}", result.relative_path().display()));
    lines.join("\n")
}
