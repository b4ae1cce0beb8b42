use crate::{CatalogTag, TaggedItem};

/// Input to the accumulator, in merged-stream order.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// An item arrived from one of the catalog producers.
    Item(TaggedItem),
    /// The catalog's producer reached the last page.
    CatalogCompleted(CatalogTag),
    /// The catalog's producer gave up after a fetch or decode failure.
    CatalogFailed(CatalogTag),
    /// The crawl run was cancelled; no further input is accepted.
    Cancelled,
}
