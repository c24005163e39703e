//! Implementation of `lessonpath sync`.

use anyhow::{bail, Result};
use lessonpath_core::core::{IdentityState, SyncOutcome};
use serde::Serialize;

use crate::cli::commands::helpers::Session;
use crate::output::{Formatter, OutputFormat};

#[derive(Debug, Serialize)]
struct SyncOutput {
    user_id: String,
    #[serde(flatten)]
    outcome: SyncOutcome,
    identity: IdentityState,
    total_xp: u32,
}

/// Run the sync command.
///
/// Remote failures are reported as an `unavailable` outcome, not an error.
#[tracing::instrument(skip(session, format))]
pub async fn run_sync(session: &Session, format: OutputFormat) -> Result<()> {
    let Some(user_id) = session.user_id() else {
        bail!("No user to sync for.\n  To fix: pass --user <id> or set LESSONPATH_USER");
    };

    let Some(outcome) = session.sign_in().await? else {
        bail!("No user to sync for.");
    };
    let tracker = session.tracker();

    Formatter::new(format).print(&SyncOutput {
        user_id: user_id.to_string(),
        outcome,
        identity: tracker.identity_state(),
        total_xp: tracker.progress().total_xp,
    })
}
