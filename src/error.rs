//! Error types for the diff engine
//!
//! Errors carry structured information identifying the offending node.
//! A failed render never commits partial state; the caller keeps its
//! previous session and registry.

use thiserror::Error;

use crate::components::Cid;
use crate::rendered::Fingerprint;

/// The error component callbacks return.
///
/// Component implementations wrap whatever went wrong (database access,
/// bad assigns) in a message plus an optional source error.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct ComponentError {
    /// Human-readable description of the failure
    pub message: String,
    /// Underlying cause, if any
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ComponentError {
    /// Create an error from a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Create an error wrapping an underlying cause
    pub fn with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// All diff engine errors
#[derive(Error, Debug)]
pub enum DiffError {
    /// A template instance whose static sequence is not one longer than
    /// its dynamic sequence
    #[error(
        "template {fingerprint:#x} has {statics} static fragments for {dynamics} dynamic slots (want dynamics + 1)"
    )]
    StaticArity {
        /// Fingerprint of the offending template
        fingerprint: Fingerprint,
        /// Number of static fragments
        statics: usize,
        /// Number of dynamic slots
        dynamics: usize,
    },

    /// A comprehension row whose length disagrees with the inner statics
    #[error("comprehension row {row} has {cols} columns, the static sequence implies {expected}")]
    RowArity {
        /// Zero-based row index
        row: usize,
        /// Columns the row actually has
        cols: usize,
        /// Columns the inner static sequence implies
        expected: usize,
    },

    /// A component callback failed; the whole render fails with it
    #[error("component `{id}` failed in `{callback}`: {source}")]
    Component {
        /// The component's client-stable id
        id: String,
        /// Which callback failed: `mount`, `update`, or `render`
        callback: &'static str,
        /// The callback's error
        #[source]
        source: ComponentError,
    },

    /// A cid was referenced that the registry has no entry for
    #[error("unknown component cid {cid}")]
    UnknownCid {
        /// The missing cid
        cid: Cid,
    },

    /// A change map without statics cannot be materialized to output
    #[error("change map has no statics at this level; not a full render")]
    MissingStatics,
}
