// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Network-level variant operations.
//!
//! The [`VariantManager`](crate::VariantManager) decides how slots move;
//! this module applies the resulting [`VariantChange`] to every per-variant
//! array the network owns: switch open/retained flags, terminal connected
//! flags, and node voltages.

use tracing::debug;

use crate::variants::{VariantChange, VariantManager};
use crate::Error;

use super::Network;

/// Variant management.
impl Network {
    /// Read access to the variant manager.
    pub fn variant_manager(&self) -> &VariantManager {
        &self.variants
    }

    /// The ID of the working variant; fails with `VariantNotSet` after the
    /// working variant has been removed.
    pub fn working_variant_id(&self) -> Result<&str, Error> {
        self.variants.working_variant_id()
    }

    /// Makes `variant_id` the working variant.  Derived handles obtained
    /// under the previous working variant become invalid.
    pub fn set_working_variant(&mut self, variant_id: &str) -> Result<(), Error> {
        self.variants.set_working_variant(variant_id)?;
        self.invalidate_topology();
        Ok(())
    }

    /// Clones the variant `source_id` into a new variant `target_id`.
    pub fn clone_variant(&mut self, source_id: &str, target_id: &str) -> Result<(), Error> {
        self.clone_variants(source_id, &[target_id], false)
    }

    /// Clones the variant `source_id` into each of `target_ids`.  Existing
    /// targets are only overwritten when `overwrite` is set.
    pub fn clone_variants(
        &mut self,
        source_id: &str,
        target_ids: &[&str],
        overwrite: bool,
    ) -> Result<(), Error> {
        let change = self.variants.clone_variant(source_id, target_ids, overwrite)?;
        debug!(
            source = source_id,
            targets = ?target_ids,
            allocated = ?change.allocated,
            extended = change.extended,
            "cloning variant"
        );
        self.apply_variant_change(&change);
        self.invalidate_topology();
        Ok(())
    }

    /// Removes a variant.  Reads through its ID fail afterwards; if it was
    /// the working variant, all variant-scoped access fails with
    /// `VariantNotSet` until a new working variant is set.
    pub fn remove_variant(&mut self, variant_id: &str) -> Result<(), Error> {
        let change = self.variants.remove_variant(variant_id)?;
        debug!(variant = variant_id, reduced = change.reduced, "removing variant");
        self.apply_variant_change(&change);
        self.invalidate_topology();
        Ok(())
    }

    fn apply_variant_change(&mut self, change: &VariantChange) {
        for switch in self.switches.values_mut() {
            switch.open.apply(change);
            switch.retained.apply(change);
        }
        for switch in self.dc_switches.values_mut() {
            switch.open.apply(change);
        }
        for equipment in self.equipment.values_mut() {
            for terminal in &mut equipment.terminals {
                terminal.connected.apply(change);
            }
            for terminal in &mut equipment.dc_terminals {
                terminal.connected.apply(change);
            }
        }
        for voltage_level in self.voltage_levels.values_mut() {
            for node in &mut voltage_level.nodes {
                node.v.apply(change);
            }
        }
        for dc_node in self.dc_nodes.values_mut() {
            dc_node.v.apply(change);
        }
    }
}
