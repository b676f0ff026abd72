// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Variant slot bookkeeping.
//!
//! Every mutable attribute of every entity in a network is stored in a
//! [`VariantArray`], indexed by variant slot.  The [`VariantManager`] maps
//! variant IDs to slots, tracks which slots are free for reuse, and holds
//! the working variant pointer that all variant-scoped accessors indirect
//! through.
//!
//! The manager only does the bookkeeping: it returns a [`VariantChange`]
//! describing how the per-variant arrays have to be resized or copied, and
//! the network applies that change to every array it owns.

use std::collections::{BTreeSet, HashMap};

use crate::Error;

/// A value per variant slot.
///
/// Slots freed by variant removal keep their last value until they are
/// reused; only trailing slots are ever compacted away.
#[derive(Clone, Debug)]
pub(crate) struct VariantArray<T: Clone> {
    values: Vec<T>,
}

impl<T: Clone> VariantArray<T> {
    pub(crate) fn new(size: usize, value: T) -> Self {
        Self {
            values: vec![value; size],
        }
    }

    pub(crate) fn get(&self, slot: usize) -> &T {
        &self.values[slot]
    }

    pub(crate) fn set(&mut self, slot: usize, value: T) {
        self.values[slot] = value;
    }

    /// Applies a resize/copy decision made by the [`VariantManager`].
    pub(crate) fn apply(&mut self, change: &VariantChange) {
        for &slot in &change.allocated {
            self.values[slot] = self.values[change.source].clone();
        }
        for _ in 0..change.extended {
            self.values.push(self.values[change.source].clone());
        }
        let len = self.values.len();
        self.values.truncate(len - change.reduced);
    }
}

/// How the per-variant arrays have to change after a variant operation.
///
/// `allocated` slots are overwritten with the value at `source`, `extended`
/// new slots are appended as copies of `source`, and `reduced` trailing
/// slots are dropped.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct VariantChange {
    pub(crate) source: usize,
    pub(crate) allocated: Vec<usize>,
    pub(crate) extended: usize,
    pub(crate) reduced: usize,
}

/// Maps variant IDs to slots and holds the working variant pointer.
///
/// The pointer is scoped to one network instance, not shared across
/// instances.
#[derive(Clone, Debug)]
pub struct VariantManager {
    initial_variant_id: String,
    slots: HashMap<String, usize>,
    array_size: usize,
    unused: BTreeSet<usize>,
    working: Option<usize>,
}

impl VariantManager {
    pub(crate) fn new(initial_variant_id: &str) -> Self {
        Self {
            initial_variant_id: initial_variant_id.to_string(),
            slots: HashMap::from([(initial_variant_id.to_string(), 0)]),
            array_size: 1,
            unused: BTreeSet::new(),
            working: Some(0),
        }
    }

    /// The IDs of all live variants, in slot order.
    pub fn variant_ids(&self) -> Vec<String> {
        let mut ids: Vec<(&usize, &String)> =
            self.slots.iter().map(|(id, slot)| (slot, id)).collect();
        ids.sort();
        ids.into_iter().map(|(_, id)| id.clone()).collect()
    }

    /// The ID of the working variant.
    ///
    /// Fails with a `VariantNotSet` error if the working variant has been
    /// removed and no new one has been set since.
    pub fn working_variant_id(&self) -> Result<&str, Error> {
        let slot = self.working_slot()?;
        self.slots
            .iter()
            .find(|(_, s)| **s == slot)
            .map(|(id, _)| id.as_str())
            .ok_or_else(|| Error::internal(format!("No variant ID for working slot {}.", slot)))
    }

    /// The size of the per-variant arrays, including parked (freed but not
    /// yet compacted) slots.
    pub fn variant_array_size(&self) -> usize {
        self.array_size
    }

    pub(crate) fn working_slot(&self) -> Result<usize, Error> {
        self.working
            .ok_or_else(|| Error::variant_not_set("Variant index not set."))
    }

    pub(crate) fn slot_of(&self, variant_id: &str) -> Result<usize, Error> {
        self.slots
            .get(variant_id)
            .copied()
            .ok_or_else(|| Error::not_found(format!("Variant '{}' not found.", variant_id)))
    }

    pub(crate) fn set_working_variant(&mut self, variant_id: &str) -> Result<(), Error> {
        self.working = Some(self.slot_of(variant_id)?);
        Ok(())
    }

    /// Clones the variant `source_id` into each of `target_ids`.
    ///
    /// Freed slots are recycled lowest-first; remaining targets extend the
    /// arrays.  Cloning onto an existing variant requires `overwrite`.
    pub(crate) fn clone_variant(
        &mut self,
        source_id: &str,
        target_ids: &[&str],
        overwrite: bool,
    ) -> Result<VariantChange, Error> {
        let source = self.slot_of(source_id)?;

        // Validate every target before touching any bookkeeping, so a bad
        // target leaves the manager and the per-variant arrays in step.
        for (position, target_id) in target_ids.iter().enumerate() {
            if *target_id == source_id {
                return Err(Error::structural_violation(format!(
                    "Variant '{}' cannot be cloned onto itself.",
                    source_id
                )));
            }
            if target_ids[..position].contains(target_id) {
                return Err(Error::structural_violation(format!(
                    "Target variant '{}' is listed more than once.",
                    target_id
                )));
            }
            if !overwrite && self.slots.contains_key(*target_id) {
                return Err(Error::structural_violation(format!(
                    "Target variant '{}' already exists.",
                    target_id
                )));
            }
        }

        let mut change = VariantChange {
            source,
            ..VariantChange::default()
        };
        for target_id in target_ids {
            if let Some(&slot) = self.slots.get(*target_id) {
                change.allocated.push(slot);
            } else if let Some(slot) = self.unused.pop_first() {
                self.slots.insert(target_id.to_string(), slot);
                change.allocated.push(slot);
            } else {
                self.slots.insert(target_id.to_string(), self.array_size);
                self.array_size += 1;
                change.extended += 1;
            }
        }
        Ok(change)
    }

    /// Removes the variant `variant_id`, freeing its slot.
    ///
    /// Trailing freed slots are compacted away; a freed slot in the middle
    /// of the array is parked for reuse.  Removing the working variant
    /// leaves the working pointer unset.
    pub(crate) fn remove_variant(&mut self, variant_id: &str) -> Result<VariantChange, Error> {
        if variant_id == self.initial_variant_id {
            return Err(Error::structural_violation(format!(
                "The initial variant '{}' cannot be removed.",
                variant_id
            )));
        }
        let slot = self.slot_of(variant_id)?;
        self.slots.remove(variant_id);
        if self.working == Some(slot) {
            self.working = None;
        }
        self.unused.insert(slot);

        let mut change = VariantChange::default();
        while self.unused.remove(&(self.array_size - 1)) {
            self.array_size -= 1;
            change.reduced += 1;
        }
        Ok(change)
    }
}
