//! Diff engine
//!
//! Walks a rendered tree against the session's fingerprint tree and
//! produces the change map to ship:
//!
//! 1. At each template instance, compare fingerprints. Mismatch means the
//!    client lacks the scaffolding: emit the statics and every slot in
//!    full. Match means emit changed slots only.
//! 2. Comprehensions re-emit all rows every time (rows have no identity);
//!    only their inner statics are elided once known.
//! 3. Component references resolve through the registry to a bare cid in
//!    the slot; dirty components re-render into the root `components`
//!    map, diffed against their own memoized fingerprint tree.
//!
//! The walk is pure with respect to its inputs: it clones the registry,
//! builds a fresh fingerprint tree, and hands both back only on success.
//! A failed render leaves the caller's state exactly as it was.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::changes::{Changes, ComprehensionChanges, SlotChange};
use crate::components::{Cid, Registry};
use crate::error::DiffError;
use crate::fingerprint::{FingerprintTree, SlotMemory};
use crate::rendered::{Comprehension, Rendered, Template};

/// Per-session diff state: the scaffolding the client already holds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    /// Shadow of the client's knowledge; `None` until the first render
    /// completes
    pub fingerprints: Option<FingerprintTree>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Counters describing one render, for debugging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    /// Dynamic slots that produced output
    pub slots_emitted: usize,
    /// Dynamic slots skipped because the client is up to date
    pub slots_elided: usize,
    /// Template instances emitted with their full statics
    pub full_templates: usize,
}

/// Everything a successful render produces
#[derive(Clone)]
pub struct RenderResult {
    // `components` holds `Arc<dyn Component>` entries, which aren't
    // `Debug`; see the manual `impl Debug` below.
    /// The session state to retain for the next render
    pub session: Session,
    /// The change map to send
    pub changes: Changes,
    /// The component registry to retain for the next render
    pub components: Registry,
    /// Debugging counters for this render
    pub stats: DiffStats,
}

impl std::fmt::Debug for RenderResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderResult")
            .field("session", &self.session)
            .field("changes", &self.changes)
            .field("components", &format_args!("Registry {{ .. }}"))
            .field("stats", &self.stats)
            .finish()
    }
}

/// Diff a rendered tree against the session state.
///
/// Components referenced by the tree run their lifecycle callbacks in
/// document order; entries no longer referenced are collected. Any
/// structural violation or callback failure fails the whole render
/// without touching the inputs.
pub fn render(
    session: &Session,
    root: &Template,
    components: &Registry,
) -> Result<RenderResult, DiffError> {
    let mut walk = Walk {
        registry: components.clone(),
        visited: Vec::new(),
        component_changes: BTreeMap::new(),
        stats: DiffStats::default(),
    };

    let (mut changes, fingerprints) = walk.template(root, session.fingerprints.as_ref())?;
    changes.components = walk.component_changes;
    walk.registry.gc(&walk.visited);

    tracing::debug!(
        emitted = walk.stats.slots_emitted,
        elided = walk.stats.slots_elided,
        full = walk.stats.full_templates,
        components = changes.components.len(),
        "render diffed"
    );

    Ok(RenderResult {
        session: Session {
            fingerprints: Some(fingerprints),
        },
        changes,
        components: walk.registry,
        stats: walk.stats,
    })
}

/// One render's working state
struct Walk {
    registry: Registry,
    /// Cids referenced this render, in document order
    visited: Vec<Cid>,
    /// Dirty component renders, reported at the root
    component_changes: BTreeMap<Cid, Changes>,
    stats: DiffStats,
}

impl Walk {
    fn template(
        &mut self,
        template: &Template,
        prior: Option<&FingerprintTree>,
    ) -> Result<(Changes, FingerprintTree), DiffError> {
        if template.statics.len() != template.dynamics.len() + 1 {
            return Err(DiffError::StaticArity {
                fingerprint: template.fingerprint,
                statics: template.statics.len(),
                dynamics: template.dynamics.len(),
            });
        }

        let matched = prior.is_some_and(|p| p.root == template.fingerprint);
        let mut changes = Changes::default();
        if !matched {
            self.stats.full_templates += 1;
            changes.statics = Some(template.statics.clone());
        }

        let mut children = BTreeMap::new();
        for (index, value) in template.dynamics.iter().enumerate() {
            let memory = if matched {
                prior.and_then(|p| p.child(index))
            } else {
                None
            };
            let (change, new_memory) = self.slot(value, memory)?;
            match change {
                Some(change) => {
                    changes.slots.insert(index, change);
                    self.stats.slots_emitted += 1;
                }
                None => self.stats.slots_elided += 1,
            }
            if let Some(new_memory) = new_memory {
                children.insert(index, new_memory);
            }
        }

        Ok((
            changes,
            FingerprintTree {
                root: template.fingerprint,
                children,
            },
        ))
    }

    /// Diff one dynamic slot. Returns the change to emit (if any) and the
    /// slot memory to record in the new fingerprint tree.
    fn slot(
        &mut self,
        value: &Rendered,
        memory: Option<&SlotMemory>,
    ) -> Result<(Option<SlotChange>, Option<SlotMemory>), DiffError> {
        match value {
            Rendered::Text(text) => Ok((Some(SlotChange::Text(text.clone())), None)),

            // an unchanged slot keeps whatever the client knew there
            Rendered::Nothing => Ok((None, memory.cloned())),

            Rendered::Template(template) => {
                let prior = match memory {
                    Some(SlotMemory::Template(tree)) => Some(tree),
                    _ => None,
                };
                let (changes, tree) = self.template(template, prior)?;
                let change = if changes.is_empty() {
                    // statics known, nothing below changed
                    None
                } else {
                    Some(SlotChange::Nested(changes))
                };
                Ok((change, Some(SlotMemory::Template(tree))))
            }

            Rendered::Comprehension(comprehension) => {
                let known = matches!(memory, Some(SlotMemory::Comprehension));
                let changes = self.comprehension(comprehension, known)?;
                Ok((
                    Some(SlotChange::Comprehension(changes)),
                    Some(SlotMemory::Comprehension),
                ))
            }

            Rendered::Component(reference) => {
                let cid = self.registry.track(reference)?;
                self.visited.push(cid);
                if self.registry.entry(cid)?.dirty {
                    self.component(cid, &reference.id)?;
                } else {
                    self.keep_children(cid)?;
                }
                Ok((Some(SlotChange::Component(cid)), None))
            }
        }
    }

    fn comprehension(
        &mut self,
        comprehension: &Comprehension,
        known: bool,
    ) -> Result<ComprehensionChanges, DiffError> {
        let expected = comprehension.statics.len().saturating_sub(1);
        let mut rows = Vec::with_capacity(comprehension.rows.len());
        for (row_index, row) in comprehension.rows.iter().enumerate() {
            if row.len() != expected {
                return Err(DiffError::RowArity {
                    row: row_index,
                    cols: row.len(),
                    expected,
                });
            }
            let mut out = Vec::with_capacity(row.len());
            for element in row {
                // rows carry no memory: every element diffs from scratch
                let (change, _) = self.slot(element, None)?;
                out.push(change.unwrap_or_else(|| SlotChange::Text(String::new())));
            }
            rows.push(out);
        }
        Ok(ComprehensionChanges {
            statics: (!known).then(|| comprehension.statics.clone()),
            rows,
        })
    }

    /// Re-render a dirty component and diff it against its memoized
    /// fingerprint tree. The result lands under the root `components`
    /// map, never inside a slot.
    fn component(&mut self, cid: Cid, id: &str) -> Result<(), DiffError> {
        let (module, socket, prior) = {
            let entry = self.registry.entry(cid)?;
            (
                Arc::clone(&entry.module),
                entry.socket.clone(),
                entry.fingerprints.clone(),
            )
        };

        let rendered = module
            .render(&socket)
            .map_err(|source| DiffError::Component {
                id: id.to_string(),
                callback: "render",
                source,
            })?;
        tracing::debug!(cid, fingerprint = rendered.fingerprint, "component rendered");

        let (changes, tree) = self.template(&rendered, prior.as_ref())?;
        if !changes.is_empty() {
            self.component_changes.insert(cid, changes);
        }

        let entry = self.registry.entry_mut(cid)?;
        entry.fingerprints = Some(tree);
        entry.last_dynamics = Some(rendered.dynamics);
        entry.dirty = false;
        Ok(())
    }

    /// A clean component is not re-rendered, but the components nested in
    /// its retained output are still on the client's screen; mark them
    /// visited (transitively) so gc does not collect them.
    fn keep_children(&mut self, cid: Cid) -> Result<(), DiffError> {
        let mut ids = Vec::new();
        if let Some(last) = &self.registry.entry(cid)?.last_dynamics {
            for value in last {
                value.collect_component_ids(&mut ids);
            }
        }
        for id in ids {
            let Some(child) = self.registry.cid_of(&id) else {
                continue;
            };
            if !self.visited.contains(&child) {
                self.visited.push(child);
                self.keep_children(child)?;
            }
        }
        Ok(())
    }
}
