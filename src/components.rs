//! Stateful component registry
//!
//! Components are reusable UI fragments with a client-stable string
//! identity (the extern id) and a `{mount, update, render}` lifecycle.
//! The registry maps extern ids to session-local numeric cids, owns each
//! component's socket (its merged state), and memoizes the fingerprint
//! tree so re-renders ship minimal diffs. It also retains each entry's
//! last rendered dynamics: components nested in a clean entry's output
//! are still referenced by the client and must not be collected.
//!
//! Lifecycle per reference:
//! - first reference: `mount`, `update`, `render`
//! - same reference, unchanged assigns: `update` only
//! - same reference, changed assigns: `update`, `render`
//! - module replaced at the same extern id: cid reused, memoization
//!   discarded, `mount`, `update`, `render`
//!
//! `update` fires on every reference; `render` only when the entry is
//! dirty. Entries not referenced by a completed render are collected;
//! cids are never reused within a session.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use crate::error::{ComponentError, DiffError};
use crate::fingerprint::FingerprintTree;
use crate::rendered::{Assigns, ComponentRef, Rendered, Template};

/// Session-local component id: a small monotonic integer
pub type Cid = u64;

/// Component-local state, threaded through the lifecycle callbacks.
///
/// `mount` seeds it, `update` merges caller assigns into it, `render`
/// reads it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Socket {
    assigns: Assigns,
}

impl Socket {
    /// Set one assign
    pub fn assign(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.assigns.insert(key.into(), value);
    }

    /// Merge a whole assigns map, overwriting existing keys
    pub fn merge(&mut self, assigns: &Assigns) {
        for (key, value) in assigns {
            self.assigns.insert(key.clone(), value.clone());
        }
    }

    /// Read one assign
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.assigns.get(key)
    }

    /// All assigns currently held
    pub fn assigns(&self) -> &Assigns {
        &self.assigns
    }
}

/// A component implementation: the capability table behind a module tag.
///
/// Callbacks run synchronously inside the render walk; any of them
/// failing fails the whole render. Implementations needing async work
/// must settle it before rendering begins.
pub trait Component: Send + Sync {
    /// The module tag. Two references resolve to the same implementation
    /// exactly when their names are equal; a new name at an existing
    /// extern id is a replace.
    fn name(&self) -> &'static str;

    /// Seed the socket with component-local state on first reference (and
    /// again on replace)
    fn mount(&self, socket: &mut Socket) -> Result<(), ComponentError>;

    /// Merge caller-provided assigns into the socket; called on every
    /// reference
    fn update(&self, assigns: &Assigns, socket: &mut Socket) -> Result<(), ComponentError>;

    /// Produce the component's rendered tree from its socket
    fn render(&self, socket: &Socket) -> Result<Template, ComponentError>;
}

/// One live component
#[derive(Clone)]
pub(crate) struct Entry {
    /// Client-stable identity
    pub(crate) extern_id: String,
    /// Current implementation
    pub(crate) module: Arc<dyn Component>,
    /// Assigns as last handed by the caller, for the dirty check
    pub(crate) assigns: Assigns,
    /// Component state across renders
    pub(crate) socket: Socket,
    /// Memoized scaffolding knowledge from the last render
    pub(crate) fingerprints: Option<FingerprintTree>,
    /// The dynamics of the last render; component references in them
    /// keep nested entries alive while this entry is clean
    pub(crate) last_dynamics: Option<Vec<Rendered>>,
    /// Re-render needed this pass
    pub(crate) dirty: bool,
}

/// The component registry for one session.
///
/// Value-semantics like the rest of the session state: the render walk
/// clones it, mutates the clone, and hands it back only on success.
#[derive(Clone, Default)]
pub struct Registry {
    entries: BTreeMap<Cid, Entry>,
    by_extern: HashMap<String, Cid>,
    next_cid: Cid,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live components
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The cid currently bound to an extern id
    pub fn cid_of(&self, extern_id: &str) -> Option<Cid> {
        self.by_extern.get(extern_id).copied()
    }

    /// The extern id behind a cid, for encoders and debugging
    pub fn extern_id(&self, cid: Cid) -> Option<&str> {
        self.entries.get(&cid).map(|entry| entry.extern_id.as_str())
    }

    pub(crate) fn entry(&self, cid: Cid) -> Result<&Entry, DiffError> {
        self.entries.get(&cid).ok_or(DiffError::UnknownCid { cid })
    }

    pub(crate) fn entry_mut(&mut self, cid: Cid) -> Result<&mut Entry, DiffError> {
        self.entries
            .get_mut(&cid)
            .ok_or(DiffError::UnknownCid { cid })
    }

    /// Resolve a reference to a cid, driving the lifecycle.
    ///
    /// Runs `update` (and `mount` first, for new or replaced entries) and
    /// marks the entry dirty when a render is due. The caller decides
    /// when to consume the dirty bit by rendering.
    pub(crate) fn track(&mut self, reference: &ComponentRef) -> Result<Cid, DiffError> {
        if let Some(cid) = self.by_extern.get(&reference.id).copied() {
            let entry = self.entry_mut(cid)?;
            if entry.module.name() == reference.module.name() {
                entry
                    .module
                    .update(&reference.assigns, &mut entry.socket)
                    .map_err(|source| DiffError::Component {
                        id: reference.id.clone(),
                        callback: "update",
                        source,
                    })?;
                if entry.assigns != reference.assigns {
                    entry.assigns = reference.assigns.clone();
                    entry.dirty = true;
                }
            } else {
                // replace: same cid, fresh state, memoization discarded
                tracing::debug!(
                    extern_id = %reference.id,
                    cid,
                    from = entry.module.name(),
                    to = reference.module.name(),
                    "replacing component module"
                );
                entry.module = Arc::clone(&reference.module);
                entry.socket = Socket::default();
                entry.fingerprints = None;
                entry.last_dynamics = None;
                run_mount_update(&reference.id, &reference.assigns, entry)?;
                entry.assigns = reference.assigns.clone();
                entry.dirty = true;
            }
            return Ok(cid);
        }

        let cid = self.next_cid;
        self.next_cid += 1;
        tracing::debug!(extern_id = %reference.id, cid, module = reference.module.name(), "mounting component");

        let mut entry = Entry {
            extern_id: reference.id.clone(),
            module: Arc::clone(&reference.module),
            assigns: Assigns::new(),
            socket: Socket::default(),
            fingerprints: None,
            last_dynamics: None,
            dirty: true,
        };
        run_mount_update(&reference.id, &reference.assigns, &mut entry)?;
        entry.assigns = reference.assigns.clone();

        self.entries.insert(cid, entry);
        self.by_extern.insert(reference.id.clone(), cid);
        Ok(cid)
    }

    /// Drop every entry whose cid was not visited by the completed
    /// render. `next_cid` keeps counting; freed cids are never reissued.
    pub(crate) fn gc(&mut self, visited: &[Cid]) {
        let keep: HashSet<Cid> = visited.iter().copied().collect();
        let before = self.entries.len();
        self.entries.retain(|cid, _| keep.contains(cid));
        self.by_extern.retain(|_, cid| keep.contains(cid));
        let dropped = before - self.entries.len();
        if dropped > 0 {
            tracing::debug!(dropped, live = self.entries.len(), "collected components");
        }
    }
}

fn run_mount_update(id: &str, assigns: &Assigns, entry: &mut Entry) -> Result<(), DiffError> {
    entry
        .module
        .mount(&mut entry.socket)
        .map_err(|source| DiffError::Component {
            id: id.to_string(),
            callback: "mount",
            source,
        })?;
    entry
        .module
        .update(assigns, &mut entry.socket)
        .map_err(|source| DiffError::Component {
            id: id.to_string(),
            callback: "update",
            source,
        })
}
