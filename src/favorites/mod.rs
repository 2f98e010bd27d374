//! Local favorites store: favorites and check-ins kept in the durable record.

mod set;
pub mod share;
mod store;

pub use set::{FavoriteSet, IdSet};
pub use store::FavoritesStore;
