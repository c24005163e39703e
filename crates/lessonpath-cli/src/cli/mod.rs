//! CLI command definitions and handlers.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use lessonpath_core::entitlement::SubscriptionStatus;

pub mod commands;

/// Track progress through bite-sized lessons
#[derive(Parser, Debug)]
#[command(name = "lessonpath")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format: text (default) or JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Data directory (default: $LESSONPATH_DATA_DIR or ~/.lessonpath)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Lesson catalog file (default: <data-dir>/catalog.json)
    #[arg(long, global = true)]
    pub catalog: Option<PathBuf>,

    /// Remote progress database (default: <data-dir>/remote.db)
    #[arg(long, global = true)]
    pub remote: Option<PathBuf>,

    /// Signed-in user (default: $LESSONPATH_USER; anonymous if unset)
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// Subscription status (default: $LESSONPATH_SUBSCRIPTION or none)
    #[arg(long, global = true, value_enum)]
    pub subscription: Option<SubscriptionStatus>,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// List lessons with completion and lock state
    Lessons,

    /// Show XP, streak, badges and completion percentage
    Stats,

    /// Mark a lesson completed
    Complete {
        /// Lesson ID
        lesson_id: String,

        /// XP earned (default: the lesson's catalog XP)
        #[arg(long)]
        xp: Option<u32>,
    },

    /// Award a badge
    Badge {
        /// Badge name
        name: String,
    },

    /// Show whether a lesson can be opened
    Access {
        /// Lesson ID
        lesson_id: String,
    },

    /// Show the next lesson (default: where to resume)
    Next {
        /// Show the lesson after this one instead
        #[arg(long)]
        after: Option<String>,
    },

    /// Show the lesson before another
    Prev {
        /// Lesson ID
        lesson_id: String,
    },

    /// Play through a lesson non-interactively
    Play {
        /// Lesson ID
        lesson_id: String,

        /// Comma-separated answers, one per quiz (option index) or
        /// interactive screen (pass/fail)
        #[arg(long, value_delimiter = ',')]
        answers: Vec<String>,
    },

    /// Reconcile local progress with the remote record
    Sync,

    /// Erase all progress
    Reset,
}

impl Commands {
    /// Whether the command changes progress, so sign-in must happen first.
    #[must_use]
    pub const fn mutates(&self) -> bool {
        matches!(
            self,
            Self::Complete { .. } | Self::Badge { .. } | Self::Play { .. } | Self::Reset
        )
    }
}
