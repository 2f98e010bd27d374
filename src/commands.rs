//! Command-line subcommands.

use clap::Subcommand;
use std::path::PathBuf;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
  /// Manage favorite events
  #[command(subcommand)]
  Favorites(FavoritesCommand),

  /// Manage check-ins (local only)
  #[command(subcommand)]
  Checkins(CheckinsCommand),

  /// Print a shareable route link for the current favorites
  Share {
    /// Base URL of the app (defaults to cache.origin)
    #[arg(long)]
    base: Option<String>,
  },

  /// Import favorites from a shared route link
  OpenLink {
    url: String,
    /// Only import these event IDs (comma-separated)
    #[arg(long, value_delimiter = ',')]
    known: Vec<String>,
  },

  /// Sign in as the configured user and merge favorites with the remote
  Login,

  /// Push queued favorites now
  Sync,

  /// Show connectivity, sync state and local counts
  Status,

  /// Fetch a URL through the resource cache
  Fetch {
    url: String,
    /// Write the body to this file instead of printing a summary only
    #[arg(short, long)]
    output: Option<PathBuf>,
  },

  /// Manage cache stores
  #[command(subcommand)]
  Cache(CacheCommand),

  /// Run in the foreground: probe connectivity, drain after the startup
  /// delay and on every reconnect, and print state changes. Other commands
  /// drain once before running.
  Watch,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FavoritesCommand {
  /// List favorite event IDs
  #[command(alias = "ls")]
  List,
  /// Print whether an event is a favorite
  Has { id: String },
  /// Add or remove an event
  Toggle { id: String },
  /// Add several events at once
  Import {
    #[arg(required = true)]
    ids: Vec<String>,
  },
  /// Remove all favorites
  Clear,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CheckinsCommand {
  #[command(alias = "ls")]
  List,
  /// Print whether an event is checked in
  Has { id: String },
  Toggle { id: String },
  Count,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum CacheCommand {
  /// Pre-fetch the shell manifest into the current shell store
  Install,
  /// Delete stores from previous shell versions
  Activate,
  /// List stores and their entry counts
  #[command(alias = "ls")]
  List,
}
