//! Origin-scoped key-value record.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};

use super::Database;

/// Durable string-valued key-value record.
///
/// Values are opaque to the record; callers store JSON.
pub trait LocalRecord: Send + Sync {
  /// Read the value stored under `key`.
  fn read(&self, key: &str) -> Result<Option<String>>;

  /// Store `value` under `key`, replacing any previous value.
  fn write(&self, key: &str, value: &str) -> Result<()>;

  /// Remove `key`. Removing an absent key is not an error.
  fn remove(&self, key: &str) -> Result<()>;
}

impl LocalRecord for Database {
  fn read(&self, key: &str) -> Result<Option<String>> {
    let conn = self.conn()?;
    conn
      .query_row(
        "SELECT value FROM kv_record WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read record '{}': {}", key, e))
  }

  fn write(&self, key: &str, value: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute(
        "INSERT OR REPLACE INTO kv_record (key, value, updated_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| eyre!("Failed to write record '{}': {}", key, e))?;
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let conn = self.conn()?;
    conn
      .execute("DELETE FROM kv_record WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove record '{}': {}", key, e))?;
    Ok(())
  }
}
