//! Client-side copy of the user's monitored sites.

mod collection;
mod filter;

pub use collection::SiteCollectionStore;
pub use filter::{visible_ids, FilterState};
