//! Trawler core: catalog data model and the pure cross-join accumulator.
mod catalog;
mod effect;
mod msg;
mod state;
mod summary;
mod update;

pub use catalog::{CatalogItem, CatalogTag, ItemError, ItemId, PairEvent, TaggedItem};
pub use effect::Effect;
pub use msg::Msg;
pub use state::{CatalogStatus, JoinState};
pub use summary::JoinSummary;
pub use update::update;
