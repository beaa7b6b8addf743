//! Rendered-tree model
//!
//! The input the diff engine consumes: a finite tree of template
//! instances, comprehensions, component references and leaf strings, as
//! produced by template compilation. Values reaching this tree are
//! already escaped; the engine never inspects fragment contents, only
//! structure.

use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::Hasher;
use std::sync::Arc;

use crate::components::Component;

/// Stable identifier of a template's static scaffolding.
///
/// Equal fingerprints mean the client already holds the scaffolding.
pub type Fingerprint = u64;

/// Component inputs, by name.
///
/// `BTreeMap` keeps iteration and equality deterministic, which the dirty
/// check and the wire output rely on.
pub type Assigns = BTreeMap<String, serde_json::Value>;

/// Hash a static sequence into a fingerprint.
///
/// Length-prefixed so fragment boundaries contribute to the hash:
/// `["ab", "c"]` and `["a", "bc"]` fingerprint differently.
pub fn fingerprint_of(statics: &[String]) -> Fingerprint {
    let mut hasher = DefaultHasher::new();
    for s in statics {
        hasher.write_usize(s.len());
        hasher.write(s.as_bytes());
    }
    hasher.finish()
}

/// A node in the rendered tree
#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// A template instance with its own static scaffolding
    Template(Template),
    /// A comprehension: one inner static sequence repeated per row
    Comprehension(Comprehension),
    /// A reference to a stateful component
    Component(ComponentRef),
    /// A leaf string, already escaped upstream
    Text(String),
    /// Nothing: the slot is empty or unchanged since the last render
    Nothing,
}

impl Rendered {
    /// Collect the extern id of every component referenced in this
    /// subtree, in document order.
    ///
    /// The diff walk uses this on a clean component's retained output:
    /// the components nested there are still on the client's screen and
    /// must stay registered even though the ancestor did not re-render.
    pub fn collect_component_ids(&self, out: &mut Vec<String>) {
        match self {
            Rendered::Component(reference) => out.push(reference.id.clone()),
            Rendered::Template(t) => {
                for value in &t.dynamics {
                    value.collect_component_ids(out);
                }
            }
            Rendered::Comprehension(c) => {
                for value in c.rows.iter().flatten() {
                    value.collect_component_ids(out);
                }
            }
            Rendered::Text(_) | Rendered::Nothing => {}
        }
    }

    /// Shorthand for a component reference slot
    pub fn component(
        id: impl Into<String>,
        module: Arc<dyn Component>,
        assigns: Assigns,
    ) -> Rendered {
        Rendered::Component(ComponentRef {
            id: id.into(),
            module,
            assigns,
        })
    }
}

impl From<String> for Rendered {
    fn from(s: String) -> Self {
        Rendered::Text(s)
    }
}

impl From<&str> for Rendered {
    fn from(s: &str) -> Self {
        Rendered::Text(s.to_string())
    }
}

/// A rendered template instance.
///
/// `statics` always has exactly one more element than `dynamics`; the
/// output interleaves them `s0 d0 s1 d1 ... dN-1 sN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    /// Static fragments, length N+1
    pub statics: Vec<String>,
    /// Dynamic slot values, length N
    pub dynamics: Vec<Rendered>,
    /// Identity of the static scaffolding
    pub fingerprint: Fingerprint,
}

impl Template {
    /// Build an instance, fingerprinting the static sequence
    pub fn new(
        statics: impl IntoIterator<Item = impl Into<String>>,
        dynamics: impl IntoIterator<Item = Rendered>,
    ) -> Self {
        let statics: Vec<String> = statics.into_iter().map(Into::into).collect();
        let fingerprint = fingerprint_of(&statics);
        Self {
            statics,
            dynamics: dynamics.into_iter().collect(),
            fingerprint,
        }
    }

    /// Build an instance with an explicit fingerprint.
    ///
    /// For template compilers that assign process-local ids instead of
    /// hashing.
    pub fn with_fingerprint(
        fingerprint: Fingerprint,
        statics: impl IntoIterator<Item = impl Into<String>>,
        dynamics: impl IntoIterator<Item = Rendered>,
    ) -> Self {
        Self {
            statics: statics.into_iter().map(Into::into).collect(),
            dynamics: dynamics.into_iter().collect(),
            fingerprint,
        }
    }
}

/// A rendered comprehension.
///
/// Rows share the inner static sequence; every row has
/// `statics.len() - 1` elements. Rows carry no identity and no
/// fingerprints.
#[derive(Debug, Clone, PartialEq)]
pub struct Comprehension {
    /// Inner static fragments, repeated for every row
    pub statics: Vec<String>,
    /// One entry per row, aligned to the inner statics
    pub rows: Vec<Vec<Rendered>>,
}

impl Comprehension {
    pub fn new(
        statics: impl IntoIterator<Item = impl Into<String>>,
        rows: impl IntoIterator<Item = Vec<Rendered>>,
    ) -> Self {
        Self {
            statics: statics.into_iter().map(Into::into).collect(),
            rows: rows.into_iter().collect(),
        }
    }
}

/// A reference to a stateful component at a dynamic slot.
///
/// `id` is the client-stable identity; the registry maps it to a numeric
/// cid. `module` is the component implementation the reference resolves
/// to this render.
#[derive(Clone)]
pub struct ComponentRef {
    /// Client-stable, opaque identity
    pub id: String,
    /// The component implementation
    pub module: Arc<dyn Component>,
    /// Inputs handed to `update` on every reference
    pub assigns: Assigns,
}

impl fmt::Debug for ComponentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRef")
            .field("id", &self.id)
            .field("module", &self.module.name())
            .field("assigns", &self.assigns)
            .finish()
    }
}

impl PartialEq for ComponentRef {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.module.name() == other.module.name()
            && self.assigns == other.assigns
    }
}
