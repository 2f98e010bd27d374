use crate::cache::{CacheLayer, Fetcher, HttpFetcher, Request, Rules, SqliteStorage};
use crate::commands::{CacheCommand, CheckinsCommand, Command, FavoritesCommand};
use crate::config::Config;
use crate::db::Database;
use crate::favorites::{share, FavoritesStore, IdSet};
use crate::sync::{
  HttpProbe, HttpRemoteStore, NetworkMonitor, NetworkStatus, Reconciler, RemoteStore, Session,
  SyncEngine, SyncQueue, SyncStatus, UnconfiguredRemote,
};
use chrono::DateTime;
use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Main application context
pub struct App {
  config: Config,

  /// Favorites, queue and remote reconciliation
  engine: SyncEngine,

  /// Connectivity state shared with the engine
  monitor: Arc<NetworkMonitor>,

  /// Resource cache for outbound fetches
  cache: CacheLayer<SqliteStorage>,

  /// Worker, startup trigger and probe loops
  tasks: Vec<JoinHandle<()>>,
}

impl App {
  pub fn new(config: Config) -> Result<Self> {
    let db = Database::open()?;
    let remote: Arc<dyn RemoteStore> = match config.remote_url()? {
      Some(url) => Arc::new(HttpRemoteStore::new(url, Config::get_remote_token())),
      None => Arc::new(UnconfiguredRemote),
    };
    Ok(Self::build(config, db, remote, Arc::new(HttpFetcher::new())))
  }

  fn build(
    config: Config,
    db: Database,
    remote: Arc<dyn RemoteStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    let record = Arc::new(db.clone());
    let store = FavoritesStore::new(record.clone());
    let monitor = Arc::new(NetworkMonitor::new(NetworkStatus::Unknown));

    // The configured identity is the persisted session of the auth flow
    let session = Session::new();
    if let (Some(user), Some(_)) = (&config.user, &config.remote.base_url) {
      session.sign_in(user.profile());
    }

    let engine = SyncEngine::new(
      store.clone(),
      SyncQueue::new(record),
      Reconciler::new(remote, store),
      session,
      monitor.clone(),
    );

    let cache = CacheLayer::new(
      SqliteStorage::new(db),
      fetcher,
      Rules::new(config.cache.data_patterns.clone()),
      config.cache.store_names(),
    );

    Self {
      config,
      engine,
      monitor,
      cache,
      tasks: Vec::new(),
    }
  }

  /// Prepare to run a command.
  ///
  /// In the foreground this starts the drain worker, the delayed startup
  /// trigger and the connectivity probe. A one-shot command exits long
  /// before the startup delay, so it drains once right here instead.
  pub async fn start(&mut self, foreground: bool) -> Result<()> {
    if !foreground {
      let outcome = self.engine.drain_if_possible().await;
      debug!(?outcome, "Startup drain");
      return Ok(());
    }

    self.tasks.push(self.engine.spawn_worker());
    self
      .tasks
      .push(self.monitor.announce_startup(self.config.sync.startup_delay()));

    if let Some(url) = self.config.probe_url()? {
      debug!(%url, "Starting connectivity probe");
      let probe = Arc::new(HttpProbe::new(url));
      self
        .tasks
        .push(self.monitor.spawn_probe(probe, self.config.sync.probe_interval()));
    }
    Ok(())
  }

  /// Stop background loops and wait for in-flight pushes and revalidations.
  pub async fn shutdown(self) {
    for task in &self.tasks {
      task.abort();
    }
    self.engine.settle().await;
    self.cache.settle().await;
  }

  pub async fn run<W: Write>(&self, command: Command, out: &mut W) -> Result<()> {
    match command {
      Command::Favorites(cmd) => self.favorites(cmd, out),
      Command::Checkins(cmd) => self.checkins(cmd, out),
      Command::Share { base } => self.share(base, out),
      Command::OpenLink { url, known } => self.open_link(&url, known, out),
      Command::Login => self.login(out).await,
      Command::Sync => self.sync(out).await,
      Command::Status => self.status(out),
      Command::Fetch { url, output } => self.fetch(&url, output.as_deref(), out).await,
      Command::Cache(cmd) => self.cache_command(cmd, out).await,
      Command::Watch => self.watch(out).await,
    }
  }

  fn favorites<W: Write>(&self, cmd: FavoritesCommand, out: &mut W) -> Result<()> {
    match cmd {
      FavoritesCommand::List => print_ids(out, self.engine.store().get_favorites().iter())?,
      FavoritesCommand::Has { id } => print_flag(out, self.engine.store().is_favorite(&id))?,
      FavoritesCommand::Toggle { id } => {
        let state = if self.engine.toggle_favorite(&id) {
          "added"
        } else {
          "removed"
        };
        writeln!(out, "{} {}", state, id)?;
      }
      FavoritesCommand::Import { ids } => {
        let added = self.engine.import_favorites(ids);
        writeln!(out, "imported {}", added)?;
      }
      FavoritesCommand::Clear => {
        self.engine.clear_favorites();
        writeln!(out, "cleared")?;
      }
    }
    Ok(())
  }

  fn checkins<W: Write>(&self, cmd: CheckinsCommand, out: &mut W) -> Result<()> {
    let store = self.engine.store();
    match cmd {
      CheckinsCommand::List => print_ids(out, store.get_checkins().iter())?,
      CheckinsCommand::Has { id } => print_flag(out, store.is_checked_in(&id))?,
      CheckinsCommand::Toggle { id } => {
        let state = if store.toggle_checkin(&id) {
          "checked in"
        } else {
          "unchecked"
        };
        writeln!(out, "{} {}", state, id)?;
      }
      CheckinsCommand::Count => writeln!(out, "{}", store.checkin_count())?,
    }
    Ok(())
  }

  fn share<W: Write>(&self, base: Option<String>, out: &mut W) -> Result<()> {
    let base = base
      .or_else(|| self.config.cache.origin.clone())
      .ok_or_else(|| eyre!("No base URL: pass --base or set cache.origin"))?;

    match share::share_link(&base, &self.engine.store().get_favorites())? {
      Some(link) => writeln!(out, "{}", link)?,
      None => writeln!(out, "No favorites to share")?,
    }
    Ok(())
  }

  fn open_link<W: Write>(&self, link: &str, known: Vec<String>, out: &mut W) -> Result<()> {
    let mut ids = share::parse_shared_link(link)?;
    if !known.is_empty() {
      ids = share::retain_known(ids, &known.into_iter().collect::<IdSet>());
    }

    if ids.is_empty() {
      writeln!(out, "Link has no route to import")?;
      return Ok(());
    }

    let added = self.engine.import_favorites(ids);
    info!(added, "Imported shared route");
    writeln!(out, "imported {}", added)?;
    Ok(())
  }

  async fn login<W: Write>(&self, out: &mut W) -> Result<()> {
    let user = self
      .config
      .user
      .as_ref()
      .ok_or_else(|| eyre!("No user configured: set user.id in the config file"))?;

    let merged = self.engine.login(user.profile()).await?;
    writeln!(out, "signed in as {}, {} favorites", user.id, merged.len())?;
    Ok(())
  }

  async fn sync<W: Write>(&self, out: &mut W) -> Result<()> {
    let outcome = self.engine.drain_if_possible().await;
    writeln!(out, "{:?}", outcome)?;
    Ok(())
  }

  fn status<W: Write>(&self, out: &mut W) -> Result<()> {
    let store = self.engine.store();
    let user = self.engine.session().current_user();

    writeln!(
      out,
      "user:      {}",
      user.map(|u| u.id).unwrap_or_else(|| "(signed out)".to_string())
    )?;
    writeln!(out, "network:   {:?}", self.monitor.current_status())?;
    writeln!(out, "sync:      {:?}", self.engine.status())?;
    match self.engine.queue().pending() {
      Some(pending) => {
        let at = DateTime::from_timestamp_millis(pending.enqueued_at)
          .map(|t| t.to_rfc3339())
          .unwrap_or_default();
        writeln!(
          out,
          "queued:    {} favorites since {}",
          pending.payload.len(),
          at
        )?;
      }
      None => writeln!(out, "queued:    nothing")?,
    }
    writeln!(out, "favorites: {}", store.get_favorites().len())?;
    writeln!(out, "checkins:  {}", store.checkin_count())?;
    Ok(())
  }

  async fn fetch<W: Write>(
    &self,
    url: &str,
    output: Option<&std::path::Path>,
    out: &mut W,
  ) -> Result<()> {
    let result = self.cache.fetch(&Request::get(url)?).await?;
    let response = &result.data;

    writeln!(
      out,
      "{} {:?} {} bytes{}",
      response.status,
      result.source,
      response.body.len(),
      result
        .cached_at
        .map(|t| format!(" (cached {})", t.to_rfc3339()))
        .unwrap_or_default()
    )?;

    if let Some(path) = output {
      std::fs::write(path, &response.body)
        .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
    }
    Ok(())
  }

  async fn cache_command<W: Write>(&self, cmd: CacheCommand, out: &mut W) -> Result<()> {
    match cmd {
      CacheCommand::Install => {
        let manifest = self.config.cache.manifest_requests()?;
        let count = self.cache.install(&manifest).await?;
        writeln!(out, "installed {} assets into {}", count, self.cache.names().shell)?;
      }
      CacheCommand::Activate => {
        let deleted = self.cache.activate()?;
        if deleted.is_empty() {
          writeln!(out, "nothing to remove")?;
        }
        for name in deleted {
          writeln!(out, "removed {}", name)?;
        }
      }
      CacheCommand::List => {
        for store in self.cache.stores()? {
          writeln!(out, "{}\t{}", store.name, store.entries)?;
        }
      }
    }
    Ok(())
  }

  async fn watch<W: Write>(&self, out: &mut W) -> Result<()> {
    let mut network = self.monitor.subscribe_status();
    let mut sync = self.engine.subscribe_status();
    writeln!(out, "network {:?}, sync {:?}", *network.borrow(), *sync.borrow())?;

    loop {
      tokio::select! {
        _ = tokio::signal::ctrl_c() => break,
        changed = network.changed() => {
          if changed.is_err() {
            break;
          }
          let status = *network.borrow_and_update();
          writeln!(out, "network {:?}", status)?;
        }
        changed = sync.changed() => {
          if changed.is_err() {
            break;
          }
          let status: SyncStatus = *sync.borrow_and_update();
          writeln!(out, "sync {:?}", status)?;
        }
      }
      out.flush()?;
    }
    Ok(())
  }
}

fn print_flag<W: Write>(out: &mut W, flag: bool) -> Result<()> {
  writeln!(out, "{}", if flag { "yes" } else { "no" })?;
  Ok(())
}

fn print_ids<'a, W: Write>(out: &mut W, ids: impl Iterator<Item = &'a str>) -> Result<()> {
  for id in ids {
    writeln!(out, "{}", id)?;
  }
  Ok(())
}
