//! Resource cache tiering for outbound fetches.
//!
//! Requests are classified into one of two tiers:
//! - shell: versioned, cache-first, populated only at install time
//! - data: stale-while-revalidate, populated at runtime
//!
//! Activating a new shell version garbage-collects every other store
//! except the data store.

pub mod fetch;
pub mod layer;
pub mod rules;
pub mod storage;
pub mod traits;

pub use fetch::HttpFetcher;
pub use layer::{CacheLayer, StoreNames};
pub use rules::Rules;
pub use storage::SqliteStorage;
pub use traits::{Fetcher, Request};
