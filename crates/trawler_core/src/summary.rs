use crate::CatalogStatus;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinSummary {
    pub projects_seen: usize,
    pub users_seen: usize,
    pub pairs_emitted: u64,
    pub duplicates_ignored: u64,
    pub projects: CatalogStatus,
    pub users: CatalogStatus,
    pub cancelled: bool,
}

impl JoinSummary {
    /// True when both catalogs were crawled to their last page.
    pub fn is_complete(&self) -> bool {
        !self.cancelled
            && self.projects == CatalogStatus::Completed
            && self.users == CatalogStatus::Completed
    }
}
