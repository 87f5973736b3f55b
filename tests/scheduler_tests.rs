mod common;

use common::*;
use pretty_assertions::assert_eq;
use reelhaul::app::settings::{FetchMode, RunOptions};
use reelhaul::download::error::TransferError;
use reelhaul::download::history::HistoryEntry;
use reelhaul::download::progress::{self, ProgressEvent};
use reelhaul::download::scheduler::BatchOutcome;
use reelhaul::download::task::{SourceClass, TaskStatus};
use reelhaul::file::classify::CategoryHint;
use reelhaul::file::placement::PlacementHints;
use reelhaul::resolve::{ResolutionError, SourceKind};
use reelhaul::download::task::DownloadTask;
use std::sync::Arc;
use std::time::Duration;

fn options() -> RunOptions {
    RunOptions::default()
}

/// Highest number of calls in flight at the same moment
fn max_overlap(calls: &[TransferCall]) -> usize {
    calls
        .iter()
        .map(|c| {
            calls
                .iter()
                .filter(|o| o.started <= c.started && o.finished > c.started)
                .count()
        })
        .max()
        .unwrap_or(0)
}

// ========================================
// Batch reporting
// ========================================

#[tokio::test]
async fn test_batch_of_43_with_8_failures() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::new());
    let names = episode_names("Show", 43);
    let tasks: Vec<_> = names.iter().map(|n| direct_task(n)).collect();

    for task in tasks.iter().skip(4).step_by(5).take(8) {
        transfer.fail_always(&task.original_input, TransferError::Permanent("HTTP 404".to_string()));
    }

    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;

    assert_eq!(report.summary(), "35 succeeded, 8 failed, 43 total");
    assert_eq!(report.outcome(), BatchOutcome::PartialSuccess);
    assert_eq!(report.failures().count(), 8);
    assert_eq!(transfer.calls().len(), 43);

    let root = env.library().root().to_path_buf();
    assert!(root.join("TV Shows/Show/Season 01/Show - S01E01.mkv").exists());
    assert!(!root.join("TV Shows/Show/Season 01/Show - S01E05.mkv").exists());
    assert_eq!(env.history.len().await, 35);
}

#[tokio::test]
async fn test_progress_reports_final_aggregate() {
    let env = TestEnv::new();
    let tasks = episode_names("Show", 4).iter().map(|n| direct_task(n)).collect();
    let (tx, mut rx) = progress::channel();
    let scheduler = env
        .scheduler(tasks, Arc::new(ScriptedTransfer::new()), Arc::new(FakeUrls::default()))
        .with_progress(tx);

    scheduler.run(&options()).await;
    drop(scheduler);

    let mut last_aggregate = None;
    let mut placed_events = 0;
    while let Ok(event) = rx.try_recv() {
        match event {
            ProgressEvent::Aggregate(aggregate) => last_aggregate = Some(aggregate),
            ProgressEvent::Status {
                status: TaskStatus::Placed,
                ..
            } => placed_events += 1,
            _ => {}
        }
    }

    let aggregate = last_aggregate.expect("monitor sends a final snapshot");
    assert_eq!(aggregate.succeeded, 4);
    assert_eq!(aggregate.total, 4);
    assert_eq!(aggregate.active, 0);
    assert_eq!(placed_events, 4);
}

// ========================================
// Lanes
// ========================================

#[tokio::test]
async fn test_serial_lane_never_overlaps() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::with_delay(Duration::from_millis(20)));
    let tasks: Vec<_> = episode_names("Slow", 4).iter().map(|n| serial_task(n)).collect();
    assert_eq!(tasks[0].source_class, SourceClass::RateLimitedSerial);

    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options().with_parallelism(5).unwrap()).await;
    assert_eq!(report.succeeded, 4);

    let mut calls = transfer.calls();
    calls.sort_by_key(|c| c.started);
    assert_eq!(max_overlap(&calls), 1);
    for pair in calls.windows(2) {
        let gap = pair[1].started.duration_since(pair[0].finished);
        assert!(gap >= Duration::from_millis(30), "cool-down not honoured: {:?}", gap);
    }
}

#[tokio::test]
async fn test_parallel_lane_respects_limit() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::with_delay(Duration::from_millis(50)));
    let tasks = episode_names("Fast", 8).iter().map(|n| direct_task(n)).collect();

    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options().with_parallelism(3).unwrap()).await;

    assert_eq!(report.succeeded, 8);
    let overlap = max_overlap(&transfer.calls());
    assert!(overlap <= 3, "{} transfers at once", overlap);
    assert!(overlap > 1);
}

#[tokio::test]
async fn test_serial_failure_does_not_block_other_lanes() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::new());
    let broken = serial_task("Show.S02E01.mkv");
    transfer.fail_always(&broken.original_input, TransferError::Permanent("file removed".to_string()));

    let tasks = vec![
        broken.clone(),
        serial_task("Show.S02E02.mkv"),
        direct_task("Show.S02E03.mkv"),
        direct_task("Show.S02E04.mkv"),
    ];
    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;

    assert_eq!(report.summary(), "3 succeeded, 1 failed, 4 total");
    let failure = report.failures().next().unwrap();
    assert_eq!(failure.id, broken.id);
    assert!(failure.error.as_deref().unwrap().contains("file removed"));
    assert_eq!(transfer.calls_for(&broken.original_input), 1);
}

// ========================================
// Retry
// ========================================

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::new());
    let task = direct_task("Show.S01E01.mkv");
    transfer.script(
        &task.original_input,
        vec![
            Step::Fail(TransferError::Transient("connection reset".to_string())),
            Step::Fail(TransferError::RateLimited("429".to_string())),
            Step::Write(vec![1u8; 32]),
        ],
    );
    let id = task.id;

    let scheduler = env.scheduler(vec![task], Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;

    assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
    let task = scheduler.queue().get_by_id(id).await.unwrap();
    assert_eq!(task.status, TaskStatus::Placed);
    assert_eq!(task.attempt_count, 3);
    assert_eq!(transfer.calls().len(), 3);
}

#[tokio::test]
async fn test_retries_stop_after_max_attempts() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::new());
    let flaky = direct_task("Show.S01E01.mkv");
    let gone = direct_task("Show.S01E02.mkv");
    transfer.fail_always(&flaky.original_input, TransferError::Transient("timeout".to_string()));
    transfer.fail_always(&gone.original_input, TransferError::Permanent("HTTP 410".to_string()));

    let scheduler = env.scheduler(
        vec![flaky.clone(), gone.clone()],
        Arc::clone(&transfer),
        Arc::new(FakeUrls::default()),
    );
    let report = scheduler.run(&options()).await;

    assert_eq!(report.outcome(), BatchOutcome::TotalFailure);
    assert_eq!(transfer.calls_for(&flaky.original_input), 3);
    assert_eq!(transfer.calls_for(&gone.original_input), 1);

    let flaky = scheduler.queue().get_by_id(flaky.id).await.unwrap();
    assert_eq!(flaky.status, TaskStatus::Failed);
    assert!(flaky.last_error.unwrap().contains("timeout"));
}

// ========================================
// Duplicates
// ========================================

#[tokio::test]
async fn test_existing_destination_is_skipped_without_transfer() {
    let env = TestEnv::new();
    let planned = env.library().plan("Show.S01E01.mkv", &PlacementHints::default());
    std::fs::create_dir_all(planned.destination.parent().unwrap()).unwrap();
    std::fs::write(&planned.destination, b"already here").unwrap();

    let transfer = Arc::new(ScriptedTransfer::new());
    let scheduler = env.scheduler(
        vec![direct_task("Show.S01E01.mkv")],
        Arc::clone(&transfer),
        Arc::new(FakeUrls::default()),
    );
    let report = scheduler.run(&options()).await;

    assert_eq!(report.summary(), "0 succeeded, 0 failed, 1 skipped, 1 total");
    assert_eq!(report.outcome(), BatchOutcome::AllSucceeded);
    assert!(transfer.calls().is_empty());
    assert_eq!(std::fs::read(&planned.destination).unwrap(), b"already here");
}

#[tokio::test]
async fn test_history_match_is_skipped() {
    let env = TestEnv::new();
    env.history
        .append(HistoryEntry {
            timestamp: chrono::Utc::now(),
            filename: "Show - S01E02.mkv".to_string(),
            source_class: SourceClass::DirectParallel,
            size: 100,
            destination_path: env.library_root.join("elsewhere/Show - S01E02.mkv"),
            source_name: None,
        })
        .await
        .unwrap();

    let transfer = Arc::new(ScriptedTransfer::new());
    let scheduler = env.scheduler(
        vec![direct_task("Show.S01E02.mkv")],
        Arc::clone(&transfer),
        Arc::new(FakeUrls::default()),
    );
    let report = scheduler.run(&options()).await;

    assert_eq!(report.skipped, 1);
    assert!(transfer.calls().is_empty());
}

#[tokio::test]
async fn test_second_run_of_same_file_is_skipped() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::new());

    let first = env
        .scheduler(vec![direct_task("Show.S04E01.mkv")], Arc::clone(&transfer), Arc::new(FakeUrls::default()))
        .run(&options())
        .await;
    assert_eq!(first.succeeded, 1);

    let second = env
        .scheduler(vec![direct_task("Show.S04E01.mkv")], Arc::clone(&transfer), Arc::new(FakeUrls::default()))
        .run(&options())
        .await;
    assert_eq!(second.skipped, 1);
    assert_eq!(transfer.calls().len(), 1);
}

#[tokio::test]
async fn test_placed_video_is_skipped_by_destination() {
    let env = TestEnv::new();
    let hints = PlacementHints {
        category_hint: CategoryHint::StreamingVideo,
        ..Default::default()
    };
    let planned = env.library().plan("Drama Ep 2.mkv", &hints);
    assert!(planned.destination.ends_with("TV Shows/Drama/Season 01/Drama - S01E02.mkv"));
    std::fs::create_dir_all(planned.destination.parent().unwrap()).unwrap();
    std::fs::write(&planned.destination, b"merged video").unwrap();

    let task = DownloadTask::new("https://www.youtube.com/watch?v=d2", SourceKind::Video, "Drama Ep 2");
    let transfer = Arc::new(ScriptedTransfer::new());
    let report = env
        .scheduler(vec![task], Arc::clone(&transfer), Arc::new(FakeUrls::default()))
        .run(&options())
        .await;

    assert_eq!(report.skipped, 1);
    assert!(transfer.calls().is_empty());
}

#[tokio::test]
async fn test_subtitles_fetched_for_video_already_placed() {
    let env = TestEnv::new();
    env.history
        .append(HistoryEntry {
            timestamp: chrono::Utc::now(),
            filename: "Drama - S01E02.mkv".to_string(),
            source_class: SourceClass::RateLimitedSerial,
            size: 100,
            destination_path: env.library_root.join("TV Shows/Drama/Season 01/Drama - S01E02.mkv"),
            source_name: Some("Drama Ep 2".to_string()),
        })
        .await
        .unwrap();

    let task = DownloadTask::new("https://www.youtube.com/watch?v=d2", SourceKind::Video, "Drama Ep 2");
    let url = task.original_input.clone();
    let transfer = Arc::new(ScriptedTransfer::new());
    let mut subs_only = options();
    subs_only.mode = FetchMode::SubtitlesOnly;
    let report = env
        .scheduler(vec![task.clone()], Arc::clone(&transfer), Arc::new(FakeUrls::default()))
        .run(&subs_only)
        .await;
    assert_eq!(report.skipped, 0);
    assert_eq!(transfer.calls_for(&url), 1);

    // The same video in video mode is still a duplicate
    let report = env
        .scheduler(vec![task], Arc::clone(&transfer), Arc::new(FakeUrls::default()))
        .run(&options())
        .await;
    assert_eq!(report.skipped, 1);
    assert_eq!(transfer.calls_for(&url), 1);
}

#[tokio::test]
async fn test_same_destination_fetched_once_per_batch() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::with_delay(Duration::from_millis(30)));
    let tasks = vec![direct_task("Show.S01E03.mkv"), direct_task("Show.S01E03.720p.mkv")];

    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(transfer.calls().len(), 1);
}

// ========================================
// Resolution and expansion
// ========================================

#[tokio::test]
async fn test_magnet_expands_into_sibling_tasks() {
    let env = TestEnv::new();
    let magnet = DownloadTask::new("magnet:?xt=urn:btih:abc&dn=Pack", SourceKind::Magnet, "Pack");
    let urls = Arc::new(FakeUrls::default());
    urls.expand(&magnet.original_input, &["Show.S03E01.mkv", "Show.S03E02.mkv", "Show.S03E03.mkv"]);
    let first_id = magnet.id;

    let transfer = Arc::new(ScriptedTransfer::new());
    let scheduler = env.scheduler(vec![magnet, direct_task("Other.S01E01.mkv")], Arc::clone(&transfer), urls);
    let report = scheduler.run(&options()).await;

    assert_eq!(report.summary(), "4 succeeded, 0 failed, 4 total");
    let tasks = scheduler.queue().get_all().await;
    assert_eq!(tasks[0].id, first_id);
    let names: Vec<_> = tasks.iter().take(3).map(|t| t.suggested_name.as_str()).collect();
    assert_eq!(names, vec!["Show.S03E01.mkv", "Show.S03E02.mkv", "Show.S03E03.mkv"]);
    let indices: Vec<_> = tasks.iter().take(3).map(|t| t.playlist_index).collect();
    assert_eq!(indices, vec![Some(1), Some(2), Some(3)]);
    assert!(tasks.iter().all(|t| t.status == TaskStatus::Placed));
}

#[tokio::test]
async fn test_playlist_expanded_at_run_keeps_source_indices() {
    let env = TestEnv::new();
    let line = DownloadTask::new("https://www.youtube.com/playlist?list=PL", SourceKind::Video, "playlist");
    let urls = Arc::new(FakeUrls::default());
    urls.expand_playlist(
        &line.original_input,
        &[
            (3, "Drama Tập 3", None),
            (4, "Drama Tập 4", None),
            (2, "Item 2", Some("Unavailable")),
        ],
    );

    let transfer = Arc::new(ScriptedTransfer::new());
    let scheduler = env.scheduler(vec![line], Arc::clone(&transfer), urls);
    let report = scheduler.run(&options()).await;

    assert_eq!(report.summary(), "2 succeeded, 1 failed, 3 total");
    assert_eq!(transfer.calls().len(), 2);
    let tasks = scheduler.queue().get_all().await;
    let indices: Vec<_> = tasks.iter().map(|t| t.playlist_index).collect();
    assert_eq!(indices, vec![Some(3), Some(4), Some(2)]);
    assert!(tasks[2].unavailable);
    assert_eq!(tasks[2].status, TaskStatus::Failed);
    assert!(
        env.library()
            .root()
            .join("TV Shows/Drama/Season 01/Drama - S01E04")
            .exists()
    );
}

#[tokio::test]
async fn test_resolution_failure_fails_task() {
    let env = TestEnv::new();
    let task = direct_task("Gone.mkv");
    let urls = Arc::new(FakeUrls::default());
    urls.fail(&task.original_input, ResolutionError::NotFound("deleted".to_string()));

    let transfer = Arc::new(ScriptedTransfer::new());
    let scheduler = env.scheduler(vec![task.clone()], Arc::clone(&transfer), urls);
    let report = scheduler.run(&options()).await;

    assert_eq!(report.failed, 1);
    assert!(transfer.calls().is_empty());
    let task = scheduler.queue().get_by_id(task.id).await.unwrap();
    assert!(task.unavailable);
    assert!(task.last_error.unwrap().contains("deleted"));
}

#[tokio::test]
async fn test_tool_transfer_without_output_counts_as_duplicate() {
    let env = TestEnv::new();
    let task = DownloadTask::new("https://www.youtube.com/watch?v=x", SourceKind::Video, "Clip");
    let transfer = Arc::new(ScriptedTransfer::new());
    transfer.script(&task.original_input, vec![Step::Nothing]);

    let scheduler = env.scheduler(vec![task], Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(transfer.calls().len(), 1);
}

// ========================================
// Archives
// ========================================

#[tokio::test]
async fn test_archive_is_extracted_and_placed() {
    let env = TestEnv::new();
    let task = direct_task("Show.S01.Pack.zip");
    let transfer = Arc::new(ScriptedTransfer::new());
    let video = vec![9u8; 64];
    transfer.script(
        &task.original_input,
        vec![Step::Write(zip_bytes(&[
            ("Show.S01E01.mkv", &video),
            ("Show.S01E01.en.srt", b"1\n"),
            ("sample.txt", b"tiny"),
            ("__MACOSX/._Show.S01E01.mkv", b"junk"),
        ]))],
    );

    let scheduler = env.scheduler(vec![task.clone()], Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let report = scheduler.run(&options()).await;
    assert_eq!(report.succeeded, 1);

    let root = env.library().root().to_path_buf();
    let season = root.join("TV Shows/Show/Season 01");
    assert_eq!(std::fs::read(season.join("Show - S01E01.mkv")).unwrap(), video);
    assert!(season.join("Show - S01E01.en.srt").exists());
    assert!(!root.join("Generic/sample.txt").exists());

    let task = scheduler.queue().get_by_id(task.id).await.unwrap();
    assert_eq!(task.placed_paths.len(), 2);
    assert_eq!(env.history.len().await, 2);
    assert!(!env.settings().staging_dir.join(task.id.to_string()).exists());
}

// ========================================
// Cancellation
// ========================================

#[tokio::test]
async fn test_cancel_returns_tasks_to_pending() {
    let env = TestEnv::new();
    let transfer = Arc::new(ScriptedTransfer::with_delay(Duration::from_secs(5)));
    let tasks = vec![direct_task("Show.S01E01.mkv"), serial_task("Show.S01E02.mkv")];

    let scheduler = env.scheduler(tasks, Arc::clone(&transfer), Arc::new(FakeUrls::default()));
    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let report = tokio::time::timeout(Duration::from_secs(3), scheduler.run(&options()))
        .await
        .expect("run stops promptly after cancel");

    assert!(report.cancelled);
    assert_eq!(report.summary(), "0 succeeded, 0 failed, 2 not run, 2 total");
    let snapshot = env.session.try_load().await.unwrap().expect("session kept");
    assert!(snapshot.tasks.iter().all(|t| t.status == TaskStatus::Pending));
}
