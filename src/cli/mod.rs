use clap::{Parser, Subcommand, ValueEnum};

pub mod error;
pub mod handler;
pub mod output;

/// reelhaul - batch media fetcher that files everything into a Plex-style library
#[derive(Parser, Debug)]
#[command(name = "reelhaul")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Override config directory path
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<std::path::PathBuf>,

    /// Enable verbose logging (TRACE level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve a list of links and download everything
    Fetch {
        /// File with one link per line, or `-` for stdin
        input: String,

        /// Show name used for every item (forces TV placement)
        #[arg(long, value_name = "NAME")]
        show: Option<String>,

        /// Playlist items to keep, e.g. `1-5,8,10-`
        #[arg(long, value_name = "SPEC")]
        range: Option<String>,

        /// Concurrent transfers in the direct lane (1-5)
        #[arg(long, short = 'p', value_name = "N")]
        parallel: Option<usize>,

        /// Fetch subtitles only
        #[arg(long)]
        subs_only: bool,

        /// Resolve and save the queue without downloading
        #[arg(long)]
        preview: bool,
    },

    /// Continue the saved session
    Resume,

    /// Inspect or edit the saved queue
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },

    /// Show recently placed files
    History {
        /// Number of entries to show
        #[arg(short = 'n', default_value_t = 20)]
        count: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete persisted state
    Clear {
        #[arg(value_enum)]
        target: ClearTarget,
    },

    /// Show where a file name would be placed
    Classify {
        name: String,

        #[arg(long, value_name = "NAME")]
        show: Option<String>,

        /// Playlist index used when the name carries no episode number
        #[arg(long, value_name = "N")]
        index: Option<u32>,
    },
}

/// Queue editing actions; positions are 1-based as printed by `queue list`
#[derive(Subcommand, Debug)]
pub enum QueueAction {
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Select positions for the next run
    Select {
        /// Positions, e.g. `1-3,7`
        positions: String,
    },

    /// Exclude positions from the next run
    Deselect { positions: String },

    Move {
        position: usize,

        #[arg(value_enum)]
        direction: MoveDirection,
    },

    Remove { position: usize },
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum MoveDirection {
    Up,
    Down,
    Top,
    Bottom,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClearTarget {
    History,
    Session,
    /// The video extractor's download archive
    Archive,
}
