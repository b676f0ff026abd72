// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Merging, detaching and flattening subnetworks.
//!
//! Merging turns independent root networks into subnetworks of a fresh
//! root; detaching turns one subnetwork back into an independent root.
//! Membership is a tag on voltage levels, DC nodes and equipment, so both
//! directions move items between maps and retag them, then let the
//! topology caches rebuild lazily.

use tracing::{debug, warn};

use crate::Error;

use super::index::NetworkIndex;
use super::{ItemKind, Network, Subnetwork};

/// Subnetwork composition.
impl Network {
    /// Merges independent root networks into a new root, one subnetwork
    /// per input.
    ///
    /// Inputs must not contain subnetworks themselves and must hold
    /// exactly their initial variant; the merged root starts with a fresh
    /// initial variant.  Identifier collisions across inputs are rejected.
    pub fn merge(id: &str, inputs: Vec<Network>) -> Result<Network, Error> {
        // Validate every input and every identifier before moving
        // anything, so a rejected merge never leaves a half-built root.
        let mut index = NetworkIndex::new();
        for input in &inputs {
            if !input.subnetworks.is_empty() {
                return Err(Error::structural_violation(format!(
                    "Network '{}' already contains subnetworks and cannot be merged.",
                    input.id
                )));
            }
            if input.variants.variant_ids() != vec![input.config.initial_variant_id.clone()] {
                return Err(Error::structural_violation(format!(
                    "Network '{}' must hold exactly the initial variant to be merged.",
                    input.id
                )));
            }
            index.check_and_add(&input.id, ItemKind::Subnetwork)?;
            for vl_id in input.voltage_levels.keys() {
                index.check_and_add(vl_id, ItemKind::VoltageLevel)?;
            }
            for switch_id in input.switches.keys() {
                index.check_and_add(switch_id, ItemKind::Switch)?;
            }
            for (equipment_id, equipment) in &input.equipment {
                index.check_and_add(equipment_id, ItemKind::Equipment(equipment.kind))?;
            }
            for node_id in input.dc_nodes.keys() {
                index.check_and_add(node_id, ItemKind::DcNode)?;
            }
            for switch_id in input.dc_switches.keys() {
                index.check_and_add(switch_id, ItemKind::DcSwitch)?;
            }
        }

        let mut merged = Network::new(id);
        merged.index = index;
        for input in inputs {
            let tag = Some(input.id.clone());
            merged
                .subnetworks
                .insert(input.id.clone(), Subnetwork { id: input.id });

            for (vl_id, mut vl) in input.voltage_levels {
                vl.subnetwork = tag.clone();
                merged.voltage_levels.insert(vl_id, vl);
            }
            merged.switches.extend(input.switches);
            for (equipment_id, mut equipment) in input.equipment {
                equipment.subnetwork = tag.clone();
                merged.equipment.insert(equipment_id, equipment);
            }
            for (node_id, mut node) in input.dc_nodes {
                node.subnetwork = tag.clone();
                merged.dc_nodes.insert(node_id, node);
            }
            merged.dc_switches.extend(input.dc_switches);
        }
        debug!(
            id,
            subnetworks = merged.subnetworks.len(),
            "merged networks"
        );
        Ok(merged)
    }

    /// The equipment spanning the subnetwork's boundary, sorted by ID.
    ///
    /// An equipment is a boundary element when its endpoints resolve to
    /// both the subnetwork and some other scope; a tie line into the
    /// subnetwork is the canonical case.
    pub fn boundary_elements(&self, subnetwork_id: &str) -> Result<Vec<String>, Error> {
        self.subnetwork(subnetwork_id)?;
        let mut elements = Vec::new();
        for (id, equipment) in &self.equipment {
            let mut inside = false;
            let mut outside = false;
            for terminal in &equipment.terminals {
                let scope = self.voltage_level(terminal.voltage_level())?.subnetwork();
                match scope == Some(subnetwork_id) {
                    true => inside = true,
                    false => outside = true,
                }
            }
            for terminal in &equipment.dc_terminals {
                let scope = self.dc_node(terminal.dc_node())?.subnetwork();
                match scope == Some(subnetwork_id) {
                    true => inside = true,
                    false => outside = true,
                }
            }
            if inside && outside {
                elements.push(id.clone());
            }
        }
        Ok(elements)
    }

    /// Whether the subnetwork can be detached, i.e. has no boundary
    /// elements.
    pub fn is_detachable(&self, subnetwork_id: &str) -> Result<bool, Error> {
        Ok(self.boundary_elements(subnetwork_id)?.is_empty())
    }

    /// Detaches a subnetwork into an independent root network.
    ///
    /// The detached network keeps the parent's full variant set, including
    /// the working variant pointer.  Fails when a boundary element still
    /// spans the subnetwork's boundary.
    pub fn detach(&mut self, subnetwork_id: &str) -> Result<Network, Error> {
        let boundary = self.boundary_elements(subnetwork_id)?;
        if let Some(first) = boundary.first() {
            return Err(Error::structural_violation(format!(
                "Subnetwork '{}' cannot be detached: '{}' crosses its boundary.",
                subnetwork_id, first
            )));
        }

        let mut detached = Network::with_config(subnetwork_id, self.config.clone());
        detached.variants = self.variants.clone();

        let vl_ids: Vec<String> = self
            .voltage_levels
            .iter()
            .filter(|(_, vl)| vl.subnetwork.as_deref() == Some(subnetwork_id))
            .map(|(id, _)| id.clone())
            .collect();
        for vl_id in vl_ids {
            if let Some(mut vl) = self.voltage_levels.remove(&vl_id) {
                vl.subnetwork = None;
                self.index.remove(&vl_id);
                detached.index.check_and_add(&vl_id, ItemKind::VoltageLevel)?;
                detached.voltage_levels.insert(vl_id, vl);
            }
        }

        let switch_ids: Vec<String> = self
            .switches
            .iter()
            .filter(|(_, s)| detached.voltage_levels.contains_key(s.voltage_level()))
            .map(|(id, _)| id.clone())
            .collect();
        for switch_id in switch_ids {
            if let Some(switch) = self.switches.remove(&switch_id) {
                self.index.remove(&switch_id);
                detached.index.check_and_add(&switch_id, ItemKind::Switch)?;
                detached.switches.insert(switch_id, switch);
            }
        }

        let equipment_ids: Vec<String> = self
            .equipment
            .iter()
            .filter(|(_, e)| e.subnetwork.as_deref() == Some(subnetwork_id))
            .map(|(id, _)| id.clone())
            .collect();
        for equipment_id in equipment_ids {
            if let Some(mut equipment) = self.equipment.remove(&equipment_id) {
                equipment.subnetwork = None;
                self.index.remove(&equipment_id);
                detached
                    .index
                    .check_and_add(&equipment_id, ItemKind::Equipment(equipment.kind))?;
                detached.equipment.insert(equipment_id, equipment);
            }
        }

        let dc_node_ids: Vec<String> = self
            .dc_nodes
            .iter()
            .filter(|(_, n)| n.subnetwork.as_deref() == Some(subnetwork_id))
            .map(|(id, _)| id.clone())
            .collect();
        for node_id in dc_node_ids {
            if let Some(mut node) = self.dc_nodes.remove(&node_id) {
                node.subnetwork = None;
                self.index.remove(&node_id);
                detached.index.check_and_add(&node_id, ItemKind::DcNode)?;
                detached.dc_nodes.insert(node_id, node);
            }
        }

        // DC switch endpoints never cross scopes, so the first node decides.
        let dc_switch_ids: Vec<String> = self
            .dc_switches
            .iter()
            .filter(|(_, s)| detached.dc_nodes.contains_key(s.nodes().0))
            .map(|(id, _)| id.clone())
            .collect();
        for switch_id in dc_switch_ids {
            if let Some(switch) = self.dc_switches.remove(&switch_id) {
                self.index.remove(&switch_id);
                detached.index.check_and_add(&switch_id, ItemKind::DcSwitch)?;
                detached.dc_switches.insert(switch_id, switch);
            }
        }

        self.subnetworks.remove(subnetwork_id);
        self.index.remove(subnetwork_id);
        self.invalidate_topology();
        detached.invalidate_topology();
        if let Some(vl) = detached.voltage_levels.values().find(|vl| vl.fictitious) {
            warn!(
                subnetwork_id,
                voltage_level = vl.id.as_str(),
                "detached subnetwork contains a fictitious voltage level"
            );
        }
        debug!(subnetwork_id, "detached subnetwork");
        Ok(detached)
    }

    /// Collapses all subnetworks away: members become direct members of
    /// the root, the containers vanish, and identifiers, topology and
    /// variants stay untouched.
    pub fn flatten(&mut self) {
        for vl in self.voltage_levels.values_mut() {
            vl.subnetwork = None;
        }
        for equipment in self.equipment.values_mut() {
            equipment.subnetwork = None;
        }
        for node in self.dc_nodes.values_mut() {
            node.subnetwork = None;
        }
        let subnetwork_ids: Vec<String> = self.subnetworks.keys().cloned().collect();
        for id in &subnetwork_ids {
            self.index.remove(id);
        }
        self.subnetworks.clear();
        debug!(flattened = subnetwork_ids.len(), "flattened subnetworks");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::INITIAL_VARIANT_ID;
    use crate::network::test_util::single_substation;
    use crate::PartitionKind;

    #[test]
    fn test_merge_then_detach_round_trip() -> Result<(), Error> {
        let n1 = single_substation("n1")?;
        let n2 = single_substation("n2")?;
        assert_eq!(n1.bus_count("n1_vl"), Ok(1));

        let mut merged = Network::merge("root", vec![n1, n2])?;
        assert_eq!(
            merged
                .subnetworks()
                .map(|s| s.id().to_string())
                .collect::<Vec<_>>(),
            vec!["n1", "n2"]
        );
        assert_eq!(merged.bus_count("n1_vl"), Ok(1));
        assert_eq!(merged.bus_count("n2_vl"), Ok(1));
        assert_eq!(
            merged.voltage_level("n1_vl")?.subnetwork(),
            Some("n1")
        );
        let n1_members = merged.subnetwork_members("n1")?;
        assert_eq!(n1_members, vec!["n1_b", "n1_bbs", "n1_load", "n1_vl"]);

        let detached = merged.detach("n1")?;
        assert_eq!(detached.id(), "n1");
        assert_eq!(detached.bus_count("n1_vl"), Ok(1));
        assert_eq!(detached.voltage_level("n1_vl")?.subnetwork(), None);
        for id in ["n1_b", "n1_bbs", "n1_load", "n1_vl"] {
            assert!(detached.item_kind(id).is_some());
            assert!(merged.item_kind(id).is_none());
        }
        assert_eq!(
            merged.voltage_level("n1_vl").map(|_| ()),
            Err(Error::not_found("Voltage level 'n1_vl' not found."))
        );
        assert_eq!(
            merged.subnetwork("n1").map(|_| ()),
            Err(Error::not_found("Subnetwork 'n1' not found."))
        );
        assert_eq!(merged.bus_count("n2_vl"), Ok(1));
        Ok(())
    }

    #[test]
    fn test_merge_rejects_id_collisions() -> Result<(), Error> {
        let mut n1 = Network::new("n1");
        n1.add_voltage_level("vl1", None, 1)?;
        let mut n2 = Network::new("n2");
        n2.add_voltage_level("vl1", None, 1)?;

        assert_eq!(
            Network::merge("root", vec![n1, n2]).map(|_| ()),
            Err(Error::structural_violation(
                "The network already contains an object (VoltageLevel) with the ID 'vl1'."
            ))
        );
        Ok(())
    }

    #[test]
    fn test_merge_preconditions() -> Result<(), Error> {
        let nested = Network::merge("inner", vec![single_substation("n1")?])?;
        assert_eq!(
            Network::merge("root", vec![nested]).map(|_| ()),
            Err(Error::structural_violation(
                "Network 'inner' already contains subnetworks and cannot be merged."
            ))
        );

        let mut extra_variant = single_substation("n2")?;
        extra_variant.clone_variant(INITIAL_VARIANT_ID, "v1")?;
        assert_eq!(
            Network::merge("root", vec![extra_variant]).map(|_| ()),
            Err(Error::structural_violation(
                "Network 'n2' must hold exactly the initial variant to be merged."
            ))
        );
        Ok(())
    }

    #[test]
    fn test_tie_line_blocks_detach() -> Result<(), Error> {
        let n1 = single_substation("n1")?;
        let n2 = single_substation("n2")?;
        let mut merged = Network::merge("root", vec![n1, n2])?;
        merged.add_tie_line("t1", "n1_vl", 2, "n2_vl", 2)?;

        assert_eq!(merged.boundary_elements("n1"), Ok(vec!["t1".to_string()]));
        assert_eq!(merged.is_detachable("n1"), Ok(false));
        assert_eq!(
            merged.detach("n1").map(|_| ()),
            Err(Error::structural_violation(
                "Subnetwork 'n1' cannot be detached: 't1' crosses its boundary."
            ))
        );

        merged.remove_equipment("t1")?;
        assert_eq!(merged.is_detachable("n1"), Ok(true));
        assert!(merged.detach("n1").is_ok());
        Ok(())
    }

    #[test]
    fn test_internal_tie_line_detaches_with_its_subnetwork() -> Result<(), Error> {
        let n1 = single_substation("n1")?;
        let n2 = single_substation("n2")?;
        let mut merged = Network::merge("root", vec![n1, n2])?;

        // Both ends inside "n1": the tie line belongs to that subnetwork
        // and does not block detaching it.
        merged.add_voltage_level("n1_vl2", Some("n1"), 1)?;
        merged.add_tie_line("t1", "n1_vl", 2, "n1_vl2", 0)?;
        assert_eq!(merged.equipment("t1")?.subnetwork(), Some("n1"));
        assert_eq!(merged.boundary_elements("n1"), Ok(vec![]));

        let detached = merged.detach("n1")?;
        assert_eq!(detached.equipment("t1")?.subnetwork(), None);
        assert!(merged.item_kind("t1").is_none());

        // The parent re-derives its topology without the departed levels.
        assert_eq!(merged.component_count(PartitionKind::Connected), Ok(1));
        assert_eq!(detached.component_count(PartitionKind::Connected), Ok(1));
        Ok(())
    }

    #[test]
    fn test_detach_keeps_variants() -> Result<(), Error> {
        let n1 = single_substation("n1")?;
        let mut merged = Network::merge("root", vec![n1])?;
        merged.clone_variant(INITIAL_VARIANT_ID, "v1")?;
        merged.set_working_variant("v1")?;
        merged.set_switch_open("n1_b", true)?;

        let detached = merged.detach("n1")?;
        assert_eq!(
            detached.variant_manager().variant_ids(),
            vec![INITIAL_VARIANT_ID, "v1"]
        );
        assert_eq!(detached.working_variant_id(), Ok("v1"));
        assert_eq!(detached.is_switch_open("n1_b"), Ok(true));
        assert_eq!(detached.bus_count("n1_vl"), Ok(2));

        let mut detached = detached;
        detached.set_working_variant(INITIAL_VARIANT_ID)?;
        assert_eq!(detached.is_switch_open("n1_b"), Ok(false));
        assert_eq!(detached.bus_count("n1_vl"), Ok(1));
        Ok(())
    }

    #[test]
    fn test_flatten() -> Result<(), Error> {
        let n1 = single_substation("n1")?;
        let n2 = single_substation("n2")?;
        let mut merged = Network::merge("root", vec![n1, n2])?;
        merged.clone_variant(INITIAL_VARIANT_ID, "v1")?;

        merged.flatten();
        assert_eq!(merged.subnetworks().count(), 0);
        assert_eq!(
            merged.subnetwork("n1").map(|_| ()),
            Err(Error::not_found("Subnetwork 'n1' not found."))
        );
        assert_eq!(merged.voltage_level("n1_vl")?.subnetwork(), None);
        assert_eq!(merged.equipment("n2_load")?.subnetwork(), None);
        assert_eq!(merged.bus_count("n1_vl"), Ok(1));
        assert_eq!(
            merged.variant_manager().variant_ids(),
            vec![INITIAL_VARIANT_ID, "v1"]
        );

        // The freed container IDs may be reused.
        merged.add_voltage_level("n1", None, 1)?;
        Ok(())
    }
}
