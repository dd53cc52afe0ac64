use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use sprunner::config::LogConfig;

/// Run two commands side by side, each in its own half of the terminal.
///
/// Press Ctrl-C to interrupt both.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Command lines to run, e.g. 'tail -f app.log'. Quote each one.
    #[arg(value_name = "COMMAND")]
    commands: Vec<String>,
}

async fn main_impl(args: Args) -> Result<()> {
    LogConfig::from_env().init()?;
    sprunner::run(args.commands.as_slice()).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match main_impl(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sprunner: {err:#}");
            ExitCode::FAILURE
        }
    }
}
