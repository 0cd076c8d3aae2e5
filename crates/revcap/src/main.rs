//! revcap: checkpointed code-review capture over git
//!
//! Runs one command against the workspace repository and prints its result
//! as JSON on stdout. Logs go to stderr.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use revcap::config::{Command, Config};
use revcap::handlers::App;
use tracing::{debug, error};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_level().into()),
        )
        .init();

    config.validate().context("invalid configuration")?;
    debug!(database = %config.database_path().display(), "opening review store");

    let app = App::from_config(&config).context("failed to start")?;
    let command = config.command.clone().unwrap_or(Command::List);

    match app.run(&command).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            error!("{err}");
            println!("{}", serde_json::to_string_pretty(&err.to_result())?);
            Ok(ExitCode::FAILURE)
        }
    }
}
