//! Outputs already claimed within one batch or vending session.
//!
//! Claiming happens before any transaction using the output is built or
//! submitted, so a failed item can never hand its output to a later one.
//! Entries are never removed for the lifetime of the set.

use cnft_types::OutputRef;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    claimed: BTreeSet<OutputRef>,
}

impl ExclusionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, out_ref: &OutputRef) -> bool {
        self.claimed.contains(out_ref)
    }

    /// Claim `out_ref`; `false` if it was already claimed.
    pub fn claim(&mut self, out_ref: &OutputRef) -> bool {
        self.claimed.insert(out_ref.clone())
    }

    pub fn claim_all<'a>(&mut self, refs: impl IntoIterator<Item = &'a OutputRef>) {
        for r in refs {
            self.claim(r);
        }
    }

    pub fn len(&self) -> usize {
        self.claimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputRef> {
        self.claimed.iter()
    }
}
