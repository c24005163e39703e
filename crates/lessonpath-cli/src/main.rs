//! lessonpath - track progress through bite-sized lessons

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lessonpath_cli::cli::commands::{dispatch, Session, SessionOptions};
use lessonpath_cli::cli::Cli;
use lessonpath_cli::output::OutputFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let format = OutputFormat::from_json_flag(cli.json);
    let options = SessionOptions::from_cli(&cli)?;
    let session = Session::open(&options)?;

    dispatch(&session, &cli.command, format).await
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_tracing(verbose: bool, json: bool) {
    let default_directive = if verbose {
        "lessonpath=debug"
    } else {
        "lessonpath=warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
