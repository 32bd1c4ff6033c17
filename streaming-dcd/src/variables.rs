//! The dense variable index backing every term's `variable_indexes`.
//!
//! Atoms are interned in first-seen order; the resulting `u32` slots
//! are what terms serialize, so the index must stay append-only for
//! the lifetime of a term store.

use clause_grounder::{AtomKey, GroundAtom};
use std::collections::HashMap;

/// Interns random-variable atoms and owns their current values.
#[derive(Debug, Default)]
pub struct VariableIndex {
    slots: HashMap<AtomKey, u32>,
    values: Vec<f32>,
    atoms: Vec<GroundAtom>,
}

impl VariableIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `atom`, interning it on first sight.  The slot's
    /// value is seeded from the atom's value at interning time.
    pub fn index_of(&mut self, atom: &GroundAtom) -> u32 {
        debug_assert!(atom.is_random_variable());
        if let Some(index) = self.slots.get(atom.key()) {
            return *index;
        }

        assert!(self.values.len() < u32::MAX as usize);
        let index = self.values.len() as u32;
        self.slots.insert(atom.key().clone(), index);
        self.values.push(atom.value());
        self.atoms.push(atom.clone());

        index
    }

    #[must_use]
    pub fn lookup(&self, key: &AtomKey) -> Option<u32> {
        self.slots.get(key).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    #[must_use]
    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    /// Clamps every value to `[0, 1]`.
    pub fn clamp_values(&mut self) {
        for value in &mut self.values {
            *value = value.max(0.0).min(1.0);
        }
    }

    /// Copies the solved values back into the interned atoms,
    /// clamping to the unit interval, and returns them.
    #[must_use]
    pub fn sync_atoms(&mut self) -> &[GroundAtom] {
        for (atom, value) in self.atoms.iter_mut().zip(&self.values) {
            atom.set_value(value.max(0.0).min(1.0));
        }

        &self.atoms
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.values.clear();
        self.atoms.clear();
    }
}
