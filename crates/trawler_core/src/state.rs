use std::collections::BTreeSet;

use crate::{CatalogTag, ItemId, JoinSummary, PairEvent};

/// Stream status of one catalog as seen by the accumulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CatalogStatus {
    #[default]
    Streaming,
    Completed,
    Failed,
}

impl CatalogStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, CatalogStatus::Streaming)
    }
}

/// Running state of the cross-join: the ids seen so far in each catalog.
///
/// Sets only grow during a run. Ordered sets keep pair emission deterministic
/// for a given arrival sequence.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct JoinState {
    projects: BTreeSet<ItemId>,
    users: BTreeSet<ItemId>,
    projects_status: CatalogStatus,
    users_status: CatalogStatus,
    pairs_emitted: u64,
    duplicates_ignored: u64,
    cancelled: bool,
    closed: bool,
}

impl JoinState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen(&self, tag: CatalogTag) -> &BTreeSet<ItemId> {
        match tag {
            CatalogTag::Projects => &self.projects,
            CatalogTag::Users => &self.users,
        }
    }

    pub fn contains(&self, tag: CatalogTag, id: &ItemId) -> bool {
        self.seen(tag).contains(id)
    }

    pub fn status(&self, tag: CatalogTag) -> CatalogStatus {
        match tag {
            CatalogTag::Projects => self.projects_status,
            CatalogTag::Users => self.users_status,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn summary(&self) -> JoinSummary {
        JoinSummary {
            projects_seen: self.projects.len(),
            users_seen: self.users.len(),
            pairs_emitted: self.pairs_emitted,
            duplicates_ignored: self.duplicates_ignored,
            projects: self.projects_status,
            users: self.users_status,
            cancelled: self.cancelled,
        }
    }

    /// Records `id` for `tag` and returns the pairs it forms with the ids
    /// already known on the opposite side, or `None` if `id` was seen before.
    ///
    /// The id goes into its own set before the opposite set is read; the two
    /// sets are disjoint so the snapshot never contains the new id.
    pub fn observe(&mut self, tag: CatalogTag, id: &ItemId) -> Option<Vec<PairEvent>> {
        let inserted = match tag {
            CatalogTag::Projects => self.projects.insert(id.clone()),
            CatalogTag::Users => self.users.insert(id.clone()),
        };
        if !inserted {
            self.duplicates_ignored += 1;
            return None;
        }

        let pairs: Vec<PairEvent> = self
            .seen(tag.opposite())
            .iter()
            .map(|other| PairEvent::between(tag, id, other))
            .collect();
        self.pairs_emitted += pairs.len() as u64;
        Some(pairs)
    }

    pub(crate) fn set_status(&mut self, tag: CatalogTag, status: CatalogStatus) {
        match tag {
            CatalogTag::Projects => self.projects_status = status,
            CatalogTag::Users => self.users_status = status,
        }
    }

    pub(crate) fn all_terminal(&self) -> bool {
        self.projects_status.is_terminal() && self.users_status.is_terminal()
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub(crate) fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }
}
