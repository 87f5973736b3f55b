use super::error;
use super::output;
use super::{ClearTarget, Commands, MoveDirection, QueueAction};
use crate::app::config::Config;
use crate::app::settings::{FetchMode, RunOptions};
use crate::download::history::HistoryLog;
use crate::download::http_client::HttpClient;
use crate::download::progress::{self, ProgressEvent};
use crate::download::queue::TaskQueue;
use crate::download::scheduler::{BatchReport, Scheduler, SchedulerSettings};
use crate::download::session::{SessionConfig, SessionSnapshot, SessionStore};
use crate::download::transfer::{ToolTransfer, TransferRouter};
use crate::file::classify::{CategoryHint, classify_with_hint};
use crate::file::placement::Library;
use crate::resolve::LinkResolver;
use crate::util::paths;
use crate::util::range::PlaylistRange;
use anyhow::{Context, Result};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Handle a CLI command and return exit code
pub async fn handle_command(command: Commands, config: Config) -> i32 {
    let result = match command {
        Commands::Fetch {
            input,
            show,
            range,
            parallel,
            subs_only,
            preview,
        } => handle_fetch(&config, input, show, range, parallel, subs_only, preview).await,
        Commands::Resume => handle_resume(&config).await,
        Commands::Queue { action } => handle_queue(action).await,
        Commands::History { count, json } => handle_history(count, json).await,
        Commands::Clear { target } => handle_clear(target).await,
        Commands::Classify { name, show, index } => handle_classify(&config, name, show, index),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("Command failed: {:#}", e);
            eprintln!("Error: {:#}", e);
            error::ERROR
        }
    }
}

fn session_store() -> Result<SessionStore> {
    Ok(SessionStore::new(paths::get_session_path()?))
}

fn history_log() -> Result<HistoryLog> {
    Ok(HistoryLog::open(paths::get_history_path()?))
}

fn link_resolver(config: &Config) -> Result<LinkResolver> {
    Ok(LinkResolver::new(&config.download.user_agent)?.with_cache_timing(
        Duration::from_secs(config.download.cache_timeout_secs),
        Duration::from_secs(config.download.cache_poll_interval_secs),
    ))
}

async fn read_lines(input: &str) -> Result<Vec<String>> {
    let content = if input == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("Failed to read links from stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input))?
    };
    Ok(content.lines().map(str::to_string).collect())
}

#[allow(clippy::too_many_arguments)]
async fn handle_fetch(
    config: &Config,
    input: String,
    show: Option<String>,
    range: Option<String>,
    parallel: Option<usize>,
    subs_only: bool,
    preview: bool,
) -> Result<i32> {
    let mut options = RunOptions::from_config(config).with_show_name(show);
    if let Some(spec) = range {
        options = match options.with_range(&spec) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(error::INVALID_INPUT);
            }
        };
    }
    if let Some(n) = parallel {
        options = match options.with_parallelism(n) {
            Ok(options) => options,
            Err(e) => {
                eprintln!("Error: {}", e);
                return Ok(error::INVALID_INPUT);
            }
        };
    }
    if subs_only {
        options = options.with_mode(FetchMode::SubtitlesOnly);
    }

    let lines = read_lines(&input).await?;
    let store = session_store()?;
    if let Some(previous) = store.load().await {
        if previous.remaining() > 0 {
            println!(
                "Replacing unfinished session ({} task(s) left) started {}",
                previous.remaining(),
                previous.started_at.format("%Y-%m-%d %H:%M")
            );
        }
    }

    let resolver = Arc::new(link_resolver(config)?);
    println!("Resolving {} line(s)...", lines.len());
    let tasks = resolver.resolve_all(&lines, &options).await;
    if tasks.is_empty() {
        eprintln!("No links found in {}", input);
        return Ok(error::INVALID_INPUT);
    }
    println!("{}", output::format_queue(&tasks, false));

    if preview {
        let snapshot = SessionSnapshot::new(SessionConfig::from_options(&options), tasks);
        store.save(&snapshot).await?;
        println!("Queue saved. Edit it with `reelhaul queue`, then run `reelhaul resume`.");
        return Ok(error::SUCCESS);
    }

    let report = run_batch(config, TaskQueue::from_tasks(tasks), &options, resolver, store).await?;
    Ok(error::for_outcome(report.outcome()))
}

async fn handle_resume(config: &Config) -> Result<i32> {
    let store = session_store()?;
    // `load` has already re-armed the snapshot for resuming
    let Some(snapshot) = store.load().await else {
        println!("Nothing to resume.");
        return Ok(error::NOTHING_TO_RESUME);
    };

    if snapshot.remaining() == 0 {
        println!("Saved session is already complete.");
        store.clear().await?;
        return Ok(error::NOTHING_TO_RESUME);
    }

    let options = snapshot.config.to_options(RunOptions::from_config(config).credentials);
    println!(
        "Resuming session from {}: {} of {} task(s) left",
        snapshot.started_at.format("%Y-%m-%d %H:%M"),
        snapshot.remaining(),
        snapshot.tasks.len()
    );

    let resolver = Arc::new(link_resolver(config)?);
    let report = run_batch(config, TaskQueue::from_tasks(snapshot.tasks), &options, resolver, store).await?;
    Ok(error::for_outcome(report.outcome()))
}

/// Wire the engine together and run one batch with live progress
async fn run_batch(
    config: &Config,
    queue: TaskQueue,
    options: &RunOptions,
    resolver: Arc<LinkResolver>,
    store: SessionStore,
) -> Result<BatchReport> {
    let http = HttpClient::with_user_agent(&config.download.user_agent)?;
    let transfer = Arc::new(TransferRouter::new(http, ToolTransfer::default()));
    let library = Library::open(&config.general.library_root)
        .with_context(|| format!("Cannot use library root {}", config.general.library_root.display()))?;
    let settings = SchedulerSettings::from_config(config)?;

    let (tx, mut rx) = progress::channel();
    let scheduler = Scheduler::new(
        queue,
        transfer,
        resolver,
        library,
        Arc::new(history_log()?),
        Arc::new(store),
        settings,
    )
    .with_progress(tx);

    let cancel = scheduler.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCancelling, finishing up...");
            cancel.cancel();
        }
    });

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let ProgressEvent::Aggregate(aggregate) = event {
                print!("\r{}", output::format_progress(&aggregate));
                let _ = std::io::stdout().flush();
            }
        }
    });

    let report = scheduler.run(options).await;
    drop(scheduler);
    ctrl_c.abort();
    printer.abort();

    println!();
    println!("{}", output::format_report(&report));
    Ok(report)
}

/// Load the saved queue, apply `action`, save it back
async fn handle_queue(action: QueueAction) -> Result<i32> {
    let store = session_store()?;
    let Some(mut snapshot) = store.load().await else {
        println!("No saved queue.");
        return Ok(error::NOTHING_TO_RESUME);
    };
    let queue = TaskQueue::from_tasks(std::mem::take(&mut snapshot.tasks));

    let code = match action {
        QueueAction::List { json } => {
            let tasks = queue.get_all().await;
            println!("{}", output::format_queue(&tasks, json));
            return Ok(error::SUCCESS);
        }
        QueueAction::Select { positions } => set_selection(&queue, &positions, true).await,
        QueueAction::Deselect { positions } => set_selection(&queue, &positions, false).await,
        QueueAction::Move { position, direction } => match queue.id_at(position).await {
            Some(id) => {
                match direction {
                    MoveDirection::Up => queue.move_up(id).await,
                    MoveDirection::Down => queue.move_down(id).await,
                    MoveDirection::Top => queue.move_to_top(id).await,
                    MoveDirection::Bottom => queue.move_to_bottom(id).await,
                };
                println!("Moved item {} {:?}", position, direction);
                error::SUCCESS
            }
            None => invalid_position(position),
        },
        QueueAction::Remove { position } => match queue.id_at(position).await {
            Some(id) => {
                if let Some(task) = queue.remove(id).await {
                    println!("Removed {}", task.suggested_name);
                }
                error::SUCCESS
            }
            None => invalid_position(position),
        },
    };

    if code == error::SUCCESS {
        snapshot.tasks = queue.get_all().await;
        store.save(&snapshot).await?;
    }
    Ok(code)
}

async fn set_selection(queue: &TaskQueue, positions: &str, selected: bool) -> i32 {
    let range: PlaylistRange = match positions.parse() {
        Ok(range) => range,
        Err(e) => {
            eprintln!("Error: {}", e);
            return error::INVALID_INPUT;
        }
    };
    let changed = queue.set_selected(&range, selected).await;
    println!("{} {} item(s)", if selected { "Selected" } else { "Deselected" }, changed);
    error::SUCCESS
}

fn invalid_position(position: usize) -> i32 {
    eprintln!("Error: no queue item at position {}", position);
    error::INVALID_INPUT
}

async fn handle_history(count: usize, json: bool) -> Result<i32> {
    let entries = history_log()?.recent(count).await;
    println!("{}", output::format_history(&entries, json));
    Ok(error::SUCCESS)
}

async fn handle_clear(target: ClearTarget) -> Result<i32> {
    match target {
        ClearTarget::History => {
            history_log()?.clear().await?;
            println!("History cleared.");
        }
        ClearTarget::Session => {
            session_store()?.clear().await?;
            println!("Session cleared.");
        }
        ClearTarget::Archive => {
            let path = paths::get_download_archive_path()?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => println!("Download archive cleared."),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => println!("No download archive."),
                Err(e) => return Err(e).with_context(|| format!("Failed to delete {}", path.display())),
            }
        }
    }
    Ok(error::SUCCESS)
}

fn handle_classify(config: &Config, name: String, show: Option<String>, index: Option<u32>) -> Result<i32> {
    let result = classify_with_hint(&name, show.as_deref(), index, CategoryHint::None);
    println!("{}", output::format_classification(&result));
    println!(
        "Target:   {}",
        config.general.library_root.join(result.relative_path()).display()
    );
    Ok(error::SUCCESS)
}

