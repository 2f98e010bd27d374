//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::db::Database;

use super::traits::{Request, Response};

/// A response held in a named cache store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was captured
  pub cached_at: DateTime<Utc>,
}

/// Summary of one named store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreInfo {
  pub name: String,
  pub entries: usize,
}

/// Trait for cache storage backends.
///
/// Storage is partitioned into named stores; a request key lives in at most
/// one store, so writing it into one store evicts it from any other.
pub trait CacheStorage: Send + Sync {
  /// Look up `request` in the named store.
  fn lookup(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>>;

  /// Store a response for `request`, replacing any previous entry.
  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()>;

  /// Replace the whole content of `store` with `entries` atomically.
  fn replace_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()>;

  /// All store names, sorted.
  fn store_names(&self) -> Result<Vec<String>>;

  /// Delete a store and its entries. Returns false if it did not exist.
  fn delete_store(&self, store: &str) -> Result<bool>;

  /// Store names with their entry counts.
  fn stores(&self) -> Result<Vec<StoreInfo>>;
}

/// SQLite-based cache storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
  db: Database,
}

impl SqliteStorage {
  pub fn new(db: Database) -> Self {
    Self { db }
  }
}

fn ensure_store(tx: &Transaction<'_>, store: &str) -> Result<()> {
  tx.execute(
    "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
    params![store],
  )
  .map_err(|e| eyre!("Failed to create cache store {}: {}", store, e))?;
  Ok(())
}

fn insert_entry(
  tx: &Transaction<'_>,
  store: &str,
  request: &Request,
  response: &Response,
  cached_at: &DateTime<Utc>,
) -> Result<()> {
  let key = request.cache_key();

  // Enforce single-store residency before inserting
  tx.execute(
    "DELETE FROM cache_entries WHERE request_key = ?",
    params![key],
  )
  .map_err(|e| eyre!("Failed to evict cache entry: {}", e))?;

  tx.execute(
    "INSERT INTO cache_entries (store_name, request_key, url, status, content_type, body, cached_at)
     VALUES (?, ?, ?, ?, ?, ?, ?)",
    params![
      store,
      key,
      request.url.as_str(),
      response.status,
      response.content_type,
      response.body,
      cached_at.to_rfc3339()
    ],
  )
  .map_err(|e| eyre!("Failed to store cache entry: {}", e))?;

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn lookup(&self, store: &str, request: &Request) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;

    let row: Option<(u16, Option<String>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, content_type, body, cached_at FROM cache_entries
         WHERE store_name = ? AND request_key = ?",
        params![store, request.cache_key()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to query cache store {}: {}", store, e))?;

    match row {
      Some((status, content_type, body, cached_at)) => Ok(Some(CachedResponse {
        response: Response {
          status,
          content_type,
          body,
        },
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_store(&tx, store)?;
    insert_entry(&tx, store, request, response, &Utc::now())?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn replace_all(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    ensure_store(&tx, store)?;
    tx.execute(
      "DELETE FROM cache_entries WHERE store_name = ?",
      params![store],
    )
    .map_err(|e| eyre!("Failed to empty cache store {}: {}", store, e))?;

    let now = Utc::now();
    for (request, response) in entries {
      insert_entry(&tx, store, request, response, &now)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
    Ok(())
  }

  fn store_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT name FROM cache_stores ORDER BY name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list cache stores: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read cache store name: {}", e))?;

    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    let deleted = conn
      .execute("DELETE FROM cache_stores WHERE name = ?", params![store])
      .map_err(|e| eyre!("Failed to delete cache store {}: {}", store, e))?;
    Ok(deleted > 0)
  }

  fn stores(&self) -> Result<Vec<StoreInfo>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT s.name, COUNT(e.request_key) FROM cache_stores s
         LEFT JOIN cache_entries e ON e.store_name = s.name
         GROUP BY s.name ORDER BY s.name",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let stores = stmt
      .query_map([], |row| {
        Ok(StoreInfo {
          name: row.get(0)?,
          entries: row.get(1)?,
        })
      })
      .map_err(|e| eyre!("Failed to list cache stores: {}", e))?
      .collect::<rusqlite::Result<Vec<_>>>()
      .map_err(|e| eyre!("Failed to read cache store: {}", e))?;

    Ok(stores)
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
