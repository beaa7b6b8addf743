//! Change maps and their wire encoding
//!
//! The diff walk produces a nested change map; this module is its data
//! model and the projection onto the wire shape:
//!
//! - integer keys for dynamic slots,
//! - reserved keys `static`, `dynamics`, `components`,
//! - empty values omitted on incremental renders,
//! - component renders under a single root-level `components` key.
//!
//! Two encodings are provided: JSON (via `serde_json`, integer keys
//! stringified) and compact postcard bytes for the binary WebSocket path.
//!
//! The module also carries the client half of the protocol contract as a
//! server-side mirror: [`Changes::merge`] folds an incremental map into a
//! retained full render, and [`Changes::to_html`] materializes the
//! retained map back into the full output string. Integration tests lean
//! on these to prove a merged incremental render equals a fresh full one.

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::components::Cid;
use crate::error::DiffError;

/// The change map for one template instance.
///
/// `statics` is present exactly when the client does not already hold the
/// scaffolding. `components` is only populated on the root map of a
/// render.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Changes {
    /// Changed dynamic slots, by index
    pub slots: BTreeMap<usize, SlotChange>,
    /// Static fragments, on full renders only
    pub statics: Option<Vec<String>>,
    /// Component change maps, root map only
    pub components: BTreeMap<Cid, Changes>,
}

/// The change emitted for one dynamic slot
#[derive(Debug, Clone, PartialEq)]
pub enum SlotChange {
    /// A leaf string value
    Text(String),
    /// A component reference; the slot holds the bare cid
    Component(Cid),
    /// A nested template's change map
    Nested(Changes),
    /// A comprehension's change map
    Comprehension(ComprehensionChanges),
}

/// The change map for a comprehension.
///
/// `rows` is always complete; comprehensions are never partially
/// memoized. Only the inner statics may be elided.
#[derive(Debug, Clone, PartialEq)]
pub struct ComprehensionChanges {
    /// Inner static fragments, when not yet known to the client
    pub statics: Option<Vec<String>>,
    /// Every row, aligned to the inner statics
    pub rows: Vec<Vec<SlotChange>>,
}

impl Changes {
    /// True when there is nothing to send for this node
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.statics.is_none() && self.components.is_empty()
    }

    /// Fold an incremental change map into this retained render.
    ///
    /// This is what the client does with each frame it receives. A map
    /// carrying `static` signals a scaffolding change and replaces its
    /// subtree wholesale.
    pub fn merge(&mut self, update: &Changes) {
        if update.statics.is_some() {
            self.statics = update.statics.clone();
            self.slots = update.slots.clone();
        } else {
            for (index, incoming) in &update.slots {
                let merged = match (self.slots.get_mut(index), incoming) {
                    (Some(SlotChange::Nested(prev)), SlotChange::Nested(next)) => {
                        prev.merge(next);
                        true
                    }
                    (
                        Some(SlotChange::Comprehension(prev)),
                        SlotChange::Comprehension(next),
                    ) => {
                        if let Some(statics) = &next.statics {
                            prev.statics = Some(statics.clone());
                        }
                        prev.rows = next.rows.clone();
                        true
                    }
                    _ => false,
                };
                if !merged {
                    self.slots.insert(*index, incoming.clone());
                }
            }
        }

        for (cid, incoming) in &update.components {
            let merged = match self.components.get_mut(cid) {
                Some(prev) => {
                    prev.merge(incoming);
                    true
                }
                None => false,
            };
            if !merged {
                self.components.insert(*cid, incoming.clone());
            }
        }
    }

    /// Materialize the retained full render into its output string.
    ///
    /// Fails with [`DiffError::MissingStatics`] if any reached template
    /// level has no statics (the map is incremental, not a full render),
    /// and [`DiffError::UnknownCid`] if a slot references a component the
    /// root `components` map does not carry.
    pub fn to_html(&self) -> Result<String, DiffError> {
        let mut out = String::new();
        self.write_html(&mut out, &self.components)?;
        Ok(out)
    }

    fn write_html(
        &self,
        out: &mut String,
        components: &BTreeMap<Cid, Changes>,
    ) -> Result<(), DiffError> {
        let Some(statics) = &self.statics else {
            return Err(DiffError::MissingStatics);
        };
        for (index, fragment) in statics.iter().enumerate() {
            out.push_str(fragment);
            if index + 1 == statics.len() {
                break;
            }
            if let Some(slot) = self.slots.get(&index) {
                slot.write_html(out, components)?;
            }
        }
        Ok(())
    }
}

impl SlotChange {
    fn write_html(
        &self,
        out: &mut String,
        components: &BTreeMap<Cid, Changes>,
    ) -> Result<(), DiffError> {
        match self {
            SlotChange::Text(text) => out.push_str(text),
            SlotChange::Component(cid) => {
                let changes = components
                    .get(cid)
                    .ok_or(DiffError::UnknownCid { cid: *cid })?;
                changes.write_html(out, components)?;
            }
            SlotChange::Nested(changes) => changes.write_html(out, components)?,
            SlotChange::Comprehension(comprehension) => {
                let Some(statics) = &comprehension.statics else {
                    return Err(DiffError::MissingStatics);
                };
                for row in &comprehension.rows {
                    for (index, fragment) in statics.iter().enumerate() {
                        out.push_str(fragment);
                        if index + 1 == statics.len() {
                            break;
                        }
                        if let Some(element) = row.get(index) {
                            element.write_html(out, components)?;
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Serialize change maps to bytes for sending over WebSocket
pub fn encode_changes(changes: &Changes) -> Result<Vec<u8>, postcard::Error> {
    postcard::to_allocvec(changes)
}

impl Serialize for Changes {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = self.slots.len()
            + usize::from(self.statics.is_some())
            + usize::from(!self.components.is_empty());
        let mut map = serializer.serialize_map(Some(len))?;
        for (index, change) in &self.slots {
            map.serialize_entry(index, change)?;
        }
        if let Some(statics) = &self.statics {
            map.serialize_entry("static", statics)?;
        }
        if !self.components.is_empty() {
            map.serialize_entry("components", &self.components)?;
        }
        map.end()
    }
}

impl Serialize for SlotChange {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            SlotChange::Text(text) => serializer.serialize_str(text),
            SlotChange::Component(cid) => serializer.serialize_u64(*cid),
            SlotChange::Nested(changes) => changes.serialize(serializer),
            SlotChange::Comprehension(comprehension) => comprehension.serialize(serializer),
        }
    }
}

impl Serialize for ComprehensionChanges {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let len = 1 + usize::from(self.statics.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(statics) = &self.statics {
            map.serialize_entry("static", statics)?;
        }
        map.serialize_entry("dynamics", &self.rows)?;
        map.end()
    }
}
