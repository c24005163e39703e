//! CLI command handlers.

pub mod helpers;
pub mod lessons;
pub mod play;
pub mod progress;
pub mod sync;

pub use helpers::{Session, SessionOptions};
pub use lessons::{run_access, run_lessons, run_next, run_prev};
pub use play::run_play;
pub use progress::{run_badge, run_complete, run_reset, run_stats};
pub use sync::run_sync;

use anyhow::Result;

use crate::cli::Commands;
use crate::output::OutputFormat;

/// Run one command against an open session.
///
/// Mutating commands sign in first so local changes are merged with, and
/// pushed to, the remote record. Background pushes are flushed before
/// returning, whatever the outcome.
pub async fn dispatch(session: &Session, command: &Commands, format: OutputFormat) -> Result<()> {
    let result = run_command(session, command, format).await;
    session.finish().await;
    result
}

async fn run_command(session: &Session, command: &Commands, format: OutputFormat) -> Result<()> {
    if command.mutates() {
        session.sign_in().await?;
    }

    match command {
        Commands::Lessons => run_lessons(session, format),
        Commands::Stats => run_stats(session, format),
        Commands::Complete { lesson_id, xp } => run_complete(session, lesson_id, *xp, format),
        Commands::Badge { name } => run_badge(session, name, format),
        Commands::Access { lesson_id } => run_access(session, lesson_id, format),
        Commands::Next { after } => run_next(session, after.as_deref(), format),
        Commands::Prev { lesson_id } => run_prev(session, lesson_id, format),
        Commands::Play { lesson_id, answers } => run_play(session, lesson_id, answers, format),
        Commands::Sync => run_sync(session, format).await,
        Commands::Reset => run_reset(session, format),
    }
}
