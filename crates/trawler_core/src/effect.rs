use crate::{CatalogTag, PairEvent, TaggedItem};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// First arrival of an item; hand the raw record to the sink.
    ForwardItem(TaggedItem),
    EmitPair(PairEvent),
    ReportFailure(CatalogTag),
    /// Both catalogs are done (or the run was cancelled); the output ends here.
    Close,
}
