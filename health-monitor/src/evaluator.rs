//! Bitmask state evaluation
//!
//! Turns a raw telemetry word into the set of semantic states it represents.
//! A value matches a mask when their bitwise AND is non-zero. Masks may
//! overlap, so one value can activate several states at once. When nothing
//! matches, the implied state is `Off`.

use crate::types::StateValue;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Set of concurrently active states
pub type StateSet = BTreeSet<StateValue>;

/// Immutable mapping from bit pattern to the state it signals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskTable {
    masks: BTreeMap<u64, StateValue>,
}

impl MaskTable {
    /// Create an empty mask table
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a mask
    pub fn with_mask(mut self, mask: u64, state: StateValue) -> Self {
        self.masks.insert(mask, state);
        self
    }

    /// Evaluate a value against every mask in the table
    ///
    /// Pure: the table is never modified. Returns `{Off}` when no mask matches.
    pub fn evaluate(&self, value: u64) -> StateSet {
        let mut active: StateSet = self
            .masks
            .iter()
            .filter(|(mask, _)| value & **mask != 0)
            .map(|(_, state)| *state)
            .collect();

        if active.is_empty() {
            active.insert(StateValue::Off);
        }

        active
    }

    pub fn len(&self) -> usize {
        self.masks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, StateValue)> + '_ {
        self.masks.iter().map(|(mask, state)| (*mask, *state))
    }
}

impl FromIterator<(u64, StateValue)> for MaskTable {
    fn from_iter<I: IntoIterator<Item = (u64, StateValue)>>(iter: I) -> Self {
        Self {
            masks: iter.into_iter().collect(),
        }
    }
}

/// A named mask table together with its last evaluated states
///
/// The mask table is shared configuration; the current state set belongs to
/// this entry alone.
#[derive(Debug, Clone)]
pub struct Entry {
    name: String,
    masks: Arc<MaskTable>,
    states: StateSet,
}

impl Entry {
    /// Create an entry in the `{Unknown}` state
    pub fn new(name: impl Into<String>, masks: Arc<MaskTable>) -> Self {
        Self {
            name: name.into(),
            masks,
            states: StateSet::from([StateValue::Unknown]),
        }
    }

    /// Evaluate `value`, replacing the current states with the result
    pub fn evaluate(&mut self, value: u64) -> StateSet {
        self.states = self.masks.evaluate(value);
        self.states.clone()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn masks(&self) -> &Arc<MaskTable> {
        &self.masks
    }

    /// Current states (last evaluation, or `{Unknown}` before the first one)
    pub fn states(&self) -> &StateSet {
        &self.states
    }
}
