// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for retrieving items from a [`Network`], and the variant-scoped
//! attribute accessors.
//!
//! Attribute reads and writes indirect through the working variant slot;
//! they fail with a `VariantNotSet` error while no working variant is set.
//! The items themselves stay retrievable in that state.

use crate::kinds::{EquipmentKind, Side};
use crate::{Error, ItemKind};

use super::{DcNode, DcSwitch, Equipment, Network, Subnetwork, Switch, VoltageLevel};

/// Item retrieval.
impl Network {
    /// Returns the voltage level with the given ID, if it exists.
    pub fn voltage_level(&self, id: &str) -> Result<&VoltageLevel, Error> {
        self.voltage_levels
            .get(id)
            .ok_or_else(|| Error::not_found(format!("Voltage level '{}' not found.", id)))
    }

    pub(crate) fn voltage_level_mut(&mut self, id: &str) -> Result<&mut VoltageLevel, Error> {
        self.voltage_levels
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Voltage level '{}' not found.", id)))
    }

    /// Returns the switch with the given ID, if it exists.
    pub fn switch(&self, id: &str) -> Result<&Switch, Error> {
        self.switches
            .get(id)
            .ok_or_else(|| Error::not_found(format!("Switch '{}' not found.", id)))
    }

    /// Returns the equipment with the given ID, if it exists.
    pub fn equipment(&self, id: &str) -> Result<&Equipment, Error> {
        self.equipment
            .get(id)
            .ok_or_else(|| Error::not_found(format!("Equipment '{}' not found.", id)))
    }

    /// Returns the DC node with the given ID, if it exists.
    pub fn dc_node(&self, id: &str) -> Result<&DcNode, Error> {
        self.dc_nodes
            .get(id)
            .ok_or_else(|| Error::not_found(format!("DC node '{}' not found.", id)))
    }

    /// Returns the DC switch with the given ID, if it exists.
    pub fn dc_switch(&self, id: &str) -> Result<&DcSwitch, Error> {
        self.dc_switches
            .get(id)
            .ok_or_else(|| Error::not_found(format!("DC switch '{}' not found.", id)))
    }

    /// Returns the subnetwork with the given ID, if it exists.
    pub fn subnetwork(&self, id: &str) -> Result<&Subnetwork, Error> {
        self.subnetworks
            .get(id)
            .ok_or_else(|| Error::not_found(format!("Subnetwork '{}' not found.", id)))
    }

    /// Returns the kind of item an ID resolves to, if it resolves at all.
    pub fn item_kind(&self, id: &str) -> Option<ItemKind> {
        self.index.kind_of(id)
    }

    /// Returns an iterator over the voltage levels, in ID order.
    pub fn voltage_levels(&self) -> impl Iterator<Item = &VoltageLevel> {
        self.voltage_levels.values()
    }

    /// Returns an iterator over the switches, in ID order.
    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.values()
    }

    /// Returns an iterator over all equipment, in ID order.
    pub fn all_equipment(&self) -> impl Iterator<Item = &Equipment> {
        self.equipment.values()
    }

    /// Returns an iterator over the equipment of one kind, in ID order.
    pub fn equipment_of_kind(&self, kind: EquipmentKind) -> impl Iterator<Item = &Equipment> {
        self.equipment.values().filter(move |e| e.kind == kind)
    }

    /// Returns an iterator over the DC nodes, in ID order.
    pub fn dc_nodes(&self) -> impl Iterator<Item = &DcNode> {
        self.dc_nodes.values()
    }

    /// Returns an iterator over the DC switches, in ID order.
    pub fn dc_switches(&self) -> impl Iterator<Item = &DcSwitch> {
        self.dc_switches.values()
    }

    /// Returns an iterator over the subnetworks, in ID order.
    pub fn subnetworks(&self) -> impl Iterator<Item = &Subnetwork> {
        self.subnetworks.values()
    }

    /// Returns the sorted IDs of everything inside a subnetwork: voltage
    /// levels, the switches they contain, DC nodes, DC switches and
    /// equipment.
    pub fn subnetwork_members(&self, subnetwork: &str) -> Result<Vec<String>, Error> {
        self.subnetwork(subnetwork)?;
        let scope = Some(subnetwork.to_string());
        let mut members: Vec<String> = Vec::new();
        members.extend(
            self.voltage_levels
                .values()
                .filter(|vl| vl.subnetwork == scope)
                .map(|vl| vl.id.clone()),
        );
        members.extend(
            self.switches
                .values()
                .filter(|sw| self.voltage_levels[&sw.voltage_level].subnetwork == scope)
                .map(|sw| sw.id.clone()),
        );
        members.extend(
            self.dc_nodes
                .values()
                .filter(|n| n.subnetwork == scope)
                .map(|n| n.id.clone()),
        );
        members.extend(
            self.dc_switches
                .values()
                .filter(|sw| self.dc_nodes[&sw.node1].subnetwork == scope)
                .map(|sw| sw.id.clone()),
        );
        members.extend(
            self.equipment
                .values()
                .filter(|e| e.subnetwork == scope)
                .map(|e| e.id.clone()),
        );
        members.sort();
        Ok(members)
    }
}

/// Variant-scoped attribute access.
impl Network {
    /// Whether the switch is open in the working variant.
    pub fn is_switch_open(&self, id: &str) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        Ok(*self.switch(id)?.open.get(slot))
    }

    /// Whether the switch is retained in the working variant.  Closed
    /// retained switches split the bus view without splitting connectivity.
    pub fn is_switch_retained(&self, id: &str) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        Ok(*self.switch(id)?.retained.get(slot))
    }

    /// Opens or closes a switch in the working variant.
    pub fn set_switch_open(&mut self, id: &str, open: bool) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let switch = self
            .switches
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Switch '{}' not found.", id)))?;
        if *switch.open.get(slot) != open {
            switch.open.set(slot, open);
            self.invalidate_topology();
        }
        Ok(())
    }

    /// Changes the retained flag of a switch in the working variant.
    pub fn set_switch_retained(&mut self, id: &str, retained: bool) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let switch = self
            .switches
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Switch '{}' not found.", id)))?;
        if *switch.retained.get(slot) != retained {
            switch.retained.set(slot, retained);
            self.invalidate_topology();
        }
        Ok(())
    }

    /// Whether the DC switch is open in the working variant.
    pub fn is_dc_switch_open(&self, id: &str) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        Ok(*self.dc_switch(id)?.open.get(slot))
    }

    /// Opens or closes a DC switch in the working variant.
    pub fn set_dc_switch_open(&mut self, id: &str, open: bool) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let switch = self
            .dc_switches
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("DC switch '{}' not found.", id)))?;
        if *switch.open.get(slot) != open {
            switch.open.set(slot, open);
            self.invalidate_topology();
        }
        Ok(())
    }

    /// Whether the terminal on the given side is connected in the working
    /// variant.
    pub fn is_terminal_connected(&self, equipment: &str, side: Side) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        let terminal = self
            .equipment(equipment)?
            .terminal(side)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Equipment '{}' has no terminal on side {}.",
                    equipment, side
                ))
            })?;
        Ok(*terminal.connected.get(slot))
    }

    /// Whether the DC terminal with the given index is connected in the
    /// working variant.
    pub fn is_dc_terminal_connected(&self, equipment: &str, index: usize) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        let terminal = self
            .equipment(equipment)?
            .dc_terminals
            .get(index)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Equipment '{}' has no DC terminal {}.",
                    equipment, index
                ))
            })?;
        Ok(*terminal.connected.get(slot))
    }

    /// Connects or disconnects a DC terminal in the working variant.  DC
    /// connectivity has no switch-path propagation; the flag is toggled
    /// directly.
    pub fn set_dc_terminal_connected(
        &mut self,
        equipment: &str,
        index: usize,
        connected: bool,
    ) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let terminal = self
            .equipment
            .get_mut(equipment)
            .ok_or_else(|| Error::not_found(format!("Equipment '{}' not found.", equipment)))?
            .dc_terminals
            .get_mut(index)
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Equipment '{}' has no DC terminal {}.",
                    equipment, index
                ))
            })?;
        if *terminal.connected.get(slot) != connected {
            terminal.connected.set(slot, connected);
            self.invalidate_topology();
        }
        Ok(())
    }

    pub(crate) fn set_terminal_connected(
        &mut self,
        equipment: &str,
        side: Side,
        connected: bool,
    ) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let terminal = self
            .equipment
            .get_mut(equipment)
            .ok_or_else(|| Error::not_found(format!("Equipment '{}' not found.", equipment)))?
            .terminals
            .get_mut(side.index())
            .ok_or_else(|| {
                Error::not_found(format!(
                    "Equipment '{}' has no terminal on side {}.",
                    equipment, side
                ))
            })?;
        if *terminal.connected.get(slot) != connected {
            terminal.connected.set(slot, connected);
            self.invalidate_topology();
        }
        Ok(())
    }
}
