//! Fingerprint tree
//!
//! The server-side shadow of what the client already holds: for each
//! nested template position, the fingerprint of the scaffolding last sent
//! there. The diff walk consults it to decide full versus incremental
//! emission, and rebuilds it wholesale on every render (structural
//! sharing through clones of unchanged subtrees).
//!
//! Statics are never compared directly; equality is by fingerprint only.

use std::collections::BTreeMap;

use crate::rendered::Fingerprint;

/// What a dynamic slot held the last time it was sent.
///
/// Slots that held a leaf string or nothing have no entry; absence means
/// the client has no structural knowledge at that position.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotMemory {
    /// The slot held a nested template instance
    Template(FingerprintTree),
    /// The slot held a comprehension; its inner statics are known but
    /// rows carry no memory
    Comprehension,
}

/// The shadow tree for one template instance
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintTree {
    /// Fingerprint of this template's scaffolding
    pub root: Fingerprint,
    /// Memory per dynamic slot index
    pub children: BTreeMap<usize, SlotMemory>,
}

impl FingerprintTree {
    /// A tree with no slot memory
    pub fn leaf(root: Fingerprint) -> Self {
        Self {
            root,
            children: BTreeMap::new(),
        }
    }

    /// Memory recorded for slot `index`, if any
    pub fn child(&self, index: usize) -> Option<&SlotMemory> {
        self.children.get(&index)
    }
}
