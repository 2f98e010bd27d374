/// Schema for the local durable record and the cache stores.
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Origin-scoped key-value record (favorites, checkins, sync-queue)
CREATE TABLE IF NOT EXISTS kv_record (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named cache stores (one versioned shell store, one data store)
CREATE TABLE IF NOT EXISTS cache_stores (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Cached responses; a request key lives in at most one store
CREATE TABLE IF NOT EXISTS cache_entries (
    store_name TEXT NOT NULL,
    request_key TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL,
    PRIMARY KEY (store_name, request_key),
    FOREIGN KEY (store_name) REFERENCES cache_stores(name) ON DELETE CASCADE
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(request_key);
"#;
