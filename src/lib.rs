//! Calque - a server-side rendering diff engine
//!
//! A stateful, server-rendered UI sends the browser one full render over
//! WebSocket, then streams compact nested change maps; the client folds
//! each map into the full render it retains. This crate is the server
//! half of that contract: it diffs a freshly rendered template tree
//! against a per-session *fingerprint tree* (the shadow of what the
//! client already holds) and produces the minimal change map, slotting
//! stateful components in by numeric cid.
//!
//! The engine consumes rendered trees as produced by template
//! compilation; it does no template parsing and no escaping of its own.

pub mod changes;
pub mod components;
pub mod diff;
pub mod error;
pub mod fingerprint;
pub mod rendered;

pub use changes::{Changes, ComprehensionChanges, SlotChange, encode_changes};
pub use components::{Cid, Component, Registry, Socket};
pub use diff::{DiffStats, RenderResult, Session, render};
pub use error::{ComponentError, DiffError};
pub use fingerprint::{FingerprintTree, SlotMemory};
pub use rendered::{
    Assigns, ComponentRef, Comprehension, Fingerprint, Rendered, Template, fingerprint_of,
};
