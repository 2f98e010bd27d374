mod app;
mod cache;
mod commands;
mod config;
mod db;
mod favorites;
mod logging;
mod sync;
mod tasks;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "blocos")]
#[command(about = "Offline-first carnival favorites, sync and resource cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/blocos/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Also log to stderr
  #[arg(short, long)]
  verbose: bool,

  #[command(subcommand)]
  command: commands::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = logging::init(args.verbose)?;

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Initialize and run the app
  let mut app = app::App::new(config)?;
  app
    .start(matches!(args.command, commands::Command::Watch))
    .await?;

  let mut stdout = std::io::stdout();
  let result = app.run(args.command, &mut stdout).await;
  app.shutdown().await;

  result
}
