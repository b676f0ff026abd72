// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Methods for growing and shrinking a [`Network`]: subnetworks, voltage
//! levels, nodes, switches, internal connections and equipment.
//!
//! All structural validation happens here, before anything is mutated:
//! identifier uniqueness, node existence, single-terminal-per-node, and the
//! rule that no equipment may reference nodes from two different
//! subnetworks (or from a subnetwork and the root at the same time).  Tie
//! lines are the one sanctioned exception.

use petgraph::stable_graph::StableUnGraph;

use crate::kinds::{EquipmentKind, KindPredicates, Side, SwitchKind};
use crate::variants::VariantArray;
use crate::{Error, ItemKind};

use super::{
    DcNode, DcSwitch, DcTerminal, Equipment, Network, NodeSlot, Subnetwork, Switch, Terminal,
    TopologyEdge, VoltageLevel,
};

/// `Network` construction.
impl Network {
    /// Declares an empty subnetwork scope.
    pub fn add_subnetwork(&mut self, id: &str) -> Result<(), Error> {
        self.index.check_and_add(id, ItemKind::Subnetwork)?;
        self.subnetworks
            .insert(id.to_string(), Subnetwork { id: id.to_string() });
        Ok(())
    }

    /// Adds a voltage level with `node_count` unconnected nodes, optionally
    /// inside a subnetwork.
    pub fn add_voltage_level(
        &mut self,
        id: &str,
        subnetwork: Option<&str>,
        node_count: usize,
    ) -> Result<(), Error> {
        if let Some(subnetwork) = subnetwork {
            self.subnetwork(subnetwork)?;
        }
        self.index.check_and_add(id, ItemKind::VoltageLevel)?;

        let mut voltage_level = VoltageLevel {
            id: id.to_string(),
            subnetwork: subnetwork.map(str::to_string),
            fictitious: false,
            graph: StableUnGraph::default(),
            nodes: Vec::with_capacity(node_count),
        };
        for node in 0..node_count {
            let index = voltage_level.graph.add_node(node);
            voltage_level.nodes.push(NodeSlot {
                index,
                terminal: None,
                v: VariantArray::new(self.variants.variant_array_size(), f64::NAN),
            });
        }
        self.voltage_levels.insert(id.to_string(), voltage_level);
        self.invalidate_topology();
        Ok(())
    }

    /// Appends `count` fresh nodes to a voltage level.
    pub fn add_nodes(&mut self, voltage_level: &str, count: usize) -> Result<(), Error> {
        let array_size = self.variants.variant_array_size();
        let vl = self.voltage_level_mut(voltage_level)?;
        for _ in 0..count {
            let node = vl.nodes.len();
            let index = vl.graph.add_node(node);
            vl.nodes.push(NodeSlot {
                index,
                terminal: None,
                v: VariantArray::new(array_size, f64::NAN),
            });
        }
        self.invalidate_topology();
        Ok(())
    }

    /// Marks a voltage level as a fictitious tee point (or unmarks it).
    /// Connection propagation crosses into fictitious voltage levels.
    pub fn set_voltage_level_fictitious(
        &mut self,
        id: &str,
        fictitious: bool,
    ) -> Result<(), Error> {
        self.voltage_level_mut(id)?.fictitious = fictitious;
        self.invalidate_topology();
        Ok(())
    }

    /// Adds a switch between two nodes of a voltage level.
    pub fn add_switch(
        &mut self,
        id: &str,
        voltage_level: &str,
        kind: SwitchKind,
        node1: usize,
        node2: usize,
        open: bool,
        retained: bool,
    ) -> Result<(), Error> {
        if node1 == node2 {
            return Err(Error::structural_violation(format!(
                "Switch '{}': can't connect node {} to itself.",
                id, node1
            )));
        }
        self.check_node(voltage_level, node1)?;
        self.check_node(voltage_level, node2)?;
        self.index.check_and_add(id, ItemKind::Switch)?;

        let array_size = self.variants.variant_array_size();
        self.switches.insert(
            id.to_string(),
            Switch {
                id: id.to_string(),
                kind,
                voltage_level: voltage_level.to_string(),
                node1,
                node2,
                fictitious: false,
                open: VariantArray::new(array_size, open),
                retained: VariantArray::new(array_size, retained),
            },
        );
        let vl = self.voltage_level_mut(voltage_level)?;
        vl.graph.add_edge(
            vl.nodes[node1].index,
            vl.nodes[node2].index,
            TopologyEdge::Switch(id.to_string()),
        );
        self.invalidate_topology();
        Ok(())
    }

    /// Marks a switch as fictitious (or unmarks it).  Fictitious switches
    /// are refused by the default connection filters.
    pub fn set_switch_fictitious(&mut self, id: &str, fictitious: bool) -> Result<(), Error> {
        let switch = self
            .switches
            .get_mut(id)
            .ok_or_else(|| Error::not_found(format!("Switch '{}' not found.", id)))?;
        switch.fictitious = fictitious;
        self.invalidate_topology();
        Ok(())
    }

    /// Adds a permanent, always-closed connection between two nodes of a
    /// voltage level.
    pub fn add_internal_connection(
        &mut self,
        voltage_level: &str,
        node1: usize,
        node2: usize,
    ) -> Result<(), Error> {
        if node1 == node2 {
            return Err(Error::structural_violation(format!(
                "Internal connection in '{}': can't connect node {} to itself.",
                voltage_level, node1
            )));
        }
        self.check_node(voltage_level, node1)?;
        self.check_node(voltage_level, node2)?;

        let vl = self.voltage_level_mut(voltage_level)?;
        vl.graph.add_edge(
            vl.nodes[node1].index,
            vl.nodes[node2].index,
            TopologyEdge::InternalConnection,
        );
        self.invalidate_topology();
        Ok(())
    }

    /// Removes an internal connection between two nodes.
    pub fn remove_internal_connection(
        &mut self,
        voltage_level: &str,
        node1: usize,
        node2: usize,
    ) -> Result<(), Error> {
        self.check_node(voltage_level, node1)?;
        self.check_node(voltage_level, node2)?;
        let vl = self.voltage_level_mut(voltage_level)?;
        let (a, b) = (vl.nodes[node1].index, vl.nodes[node2].index);
        let edge = vl
            .graph
            .edges_connecting(a, b)
            .find(|e| *e.weight() == TopologyEdge::InternalConnection)
            .map(|e| petgraph::visit::EdgeRef::id(&e));
        match edge {
            Some(edge) => {
                vl.graph.remove_edge(edge);
                self.invalidate_topology();
                Ok(())
            }
            None => Err(Error::not_found(format!(
                "No internal connection between nodes {} and {} in voltage level '{}'.",
                node1, node2, voltage_level
            ))),
        }
    }

    /// Removes a switch.  The nodes it connected stay in place.
    pub fn remove_switch(&mut self, id: &str) -> Result<(), Error> {
        let switch = self
            .switches
            .remove(id)
            .ok_or_else(|| Error::not_found(format!("Switch '{}' not found.", id)))?;
        let vl = self.voltage_level_mut(&switch.voltage_level)?;
        let (a, b) = (vl.nodes[switch.node1].index, vl.nodes[switch.node2].index);
        let edge = vl
            .graph
            .edges_connecting(a, b)
            .find(|e| *e.weight() == TopologyEdge::Switch(id.to_string()))
            .map(|e| petgraph::visit::EdgeRef::id(&e));
        if let Some(edge) = edge {
            vl.graph.remove_edge(edge);
        }
        self.index.remove(id);
        self.invalidate_topology();
        Ok(())
    }

    /// Adds a busbar section at a node.  Busbar sections are the targets
    /// the connection propagator steers towards.
    pub fn add_busbar_section(
        &mut self,
        id: &str,
        voltage_level: &str,
        node: usize,
    ) -> Result<(), Error> {
        self.add_equipment(
            id,
            EquipmentKind::BusbarSection,
            &[(voltage_level.to_string(), node)],
            &[],
        )
    }

    /// Adds a single-terminal equipment (load, generator, ground or shunt
    /// compensator) at a node.
    pub fn add_injection(
        &mut self,
        id: &str,
        kind: EquipmentKind,
        voltage_level: &str,
        node: usize,
    ) -> Result<(), Error> {
        if !kind.is_injection() {
            return Err(Error::structural_violation(format!(
                "Equipment '{}': {} is not an injection kind.",
                id, kind
            )));
        }
        self.add_equipment(id, kind, &[(voltage_level.to_string(), node)], &[])
    }

    /// Adds a line between two voltage levels (or within one).  Both ends
    /// must be in the same subnetwork, or both directly in the root.
    pub fn add_line(
        &mut self,
        id: &str,
        voltage_level1: &str,
        node1: usize,
        voltage_level2: &str,
        node2: usize,
    ) -> Result<(), Error> {
        self.add_equipment(
            id,
            EquipmentKind::Line,
            &[
                (voltage_level1.to_string(), node1),
                (voltage_level2.to_string(), node2),
            ],
            &[],
        )
    }

    /// Adds a tie line.  Tie lines are owned by the root network and are
    /// the only equipment that may span two subnetworks; a tie line doing
    /// so becomes a boundary element that blocks detaching either side.
    pub fn add_tie_line(
        &mut self,
        id: &str,
        voltage_level1: &str,
        node1: usize,
        voltage_level2: &str,
        node2: usize,
    ) -> Result<(), Error> {
        self.add_equipment(
            id,
            EquipmentKind::TieLine,
            &[
                (voltage_level1.to_string(), node1),
                (voltage_level2.to_string(), node2),
            ],
            &[],
        )
    }

    /// Adds a three-sided equipment across three nodes.
    pub fn add_three_windings_transformer(
        &mut self,
        id: &str,
        ends: [(&str, usize); 3],
    ) -> Result<(), Error> {
        let ends: Vec<(String, usize)> = ends
            .iter()
            .map(|(vl, node)| (vl.to_string(), *node))
            .collect();
        self.add_equipment(id, EquipmentKind::ThreeWindingsTransformer, &ends, &[])
    }

    /// Adds a DC node, optionally inside a subnetwork.
    pub fn add_dc_node(&mut self, id: &str, subnetwork: Option<&str>) -> Result<(), Error> {
        if let Some(subnetwork) = subnetwork {
            self.subnetwork(subnetwork)?;
        }
        self.index.check_and_add(id, ItemKind::DcNode)?;
        self.dc_nodes.insert(
            id.to_string(),
            DcNode {
                id: id.to_string(),
                subnetwork: subnetwork.map(str::to_string),
                v: VariantArray::new(self.variants.variant_array_size(), f64::NAN),
            },
        );
        self.invalidate_topology();
        Ok(())
    }

    /// Adds a switch between two DC nodes.  Both nodes must be in the same
    /// subnetwork, or both directly in the root.
    pub fn add_dc_switch(
        &mut self,
        id: &str,
        kind: SwitchKind,
        dc_node1: &str,
        dc_node2: &str,
        open: bool,
    ) -> Result<(), Error> {
        if dc_node1 == dc_node2 {
            return Err(Error::structural_violation(format!(
                "DC switch '{}': can't connect DC node '{}' to itself.",
                id, dc_node1
            )));
        }
        let scope1 = self.dc_node(dc_node1)?.subnetwork.clone();
        let scope2 = self.dc_node(dc_node2)?.subnetwork.clone();
        self.common_scope(
            &format!("DC switch '{}'", id),
            &[
                (format!("DC node '{}'", dc_node1), scope1),
                (format!("DC node '{}'", dc_node2), scope2),
            ],
        )?;
        self.index.check_and_add(id, ItemKind::DcSwitch)?;
        self.dc_switches.insert(
            id.to_string(),
            DcSwitch {
                id: id.to_string(),
                kind,
                node1: dc_node1.to_string(),
                node2: dc_node2.to_string(),
                fictitious: false,
                open: VariantArray::new(self.variants.variant_array_size(), open),
            },
        );
        self.invalidate_topology();
        Ok(())
    }

    /// Removes a DC switch.
    pub fn remove_dc_switch(&mut self, id: &str) -> Result<(), Error> {
        if self.dc_switches.remove(id).is_none() {
            return Err(Error::not_found(format!("DC switch '{}' not found.", id)));
        }
        self.index.remove(id);
        self.invalidate_topology();
        Ok(())
    }

    /// Adds a DC line between two DC nodes of the same scope.
    pub fn add_dc_line(&mut self, id: &str, dc_node1: &str, dc_node2: &str) -> Result<(), Error> {
        self.add_equipment(
            id,
            EquipmentKind::DcLine,
            &[],
            &[dc_node1.to_string(), dc_node2.to_string()],
        )
    }

    /// Adds an AC/DC converter with one AC terminal and two DC terminals.
    /// The voltage level and both DC nodes must share one scope.
    pub fn add_ac_dc_converter(
        &mut self,
        id: &str,
        voltage_level: &str,
        node: usize,
        dc_node1: &str,
        dc_node2: &str,
    ) -> Result<(), Error> {
        self.add_equipment(
            id,
            EquipmentKind::AcDcConverter,
            &[(voltage_level.to_string(), node)],
            &[dc_node1.to_string(), dc_node2.to_string()],
        )
    }

    /// Removes an equipment and frees the nodes its terminals occupied.
    pub fn remove_equipment(&mut self, id: &str) -> Result<(), Error> {
        let equipment = self
            .equipment
            .remove(id)
            .ok_or_else(|| Error::not_found(format!("Equipment '{}' not found.", id)))?;
        for terminal in &equipment.terminals {
            let vl = self.voltage_level_mut(&terminal.voltage_level)?;
            vl.nodes[terminal.node].terminal = None;
        }
        self.index.remove(id);
        self.invalidate_topology();
        Ok(())
    }

    fn add_equipment(
        &mut self,
        id: &str,
        kind: EquipmentKind,
        ends: &[(String, usize)],
        dc_ends: &[String],
    ) -> Result<(), Error> {
        // Validate everything before touching any state.
        let mut scopes = Vec::new();
        for (voltage_level, node) in ends {
            self.check_node(voltage_level, *node)?;
            let slot = &self.voltage_levels[voltage_level].nodes[*node];
            if let Some((other, _)) = &slot.terminal {
                return Err(Error::structural_violation(format!(
                    "Equipment '{}': node {} of voltage level '{}' already has a terminal of equipment '{}'.",
                    id, node, voltage_level, other
                )));
            }
            scopes.push((
                format!("voltage level '{}'", voltage_level),
                self.voltage_levels[voltage_level].subnetwork.clone(),
            ));
        }
        for dc_node in dc_ends {
            let scope = self.dc_node(dc_node)?.subnetwork.clone();
            scopes.push((format!("DC node '{}'", dc_node), scope));
        }

        // A kind allowed to span subnetworks still belongs to a subnetwork
        // when all its ends lie in the same one; only a genuine span is
        // owned by the root.
        let subnetwork = if kind.may_span_subnetworks() {
            let first = scopes.first().and_then(|(_, scope)| scope.clone());
            if scopes.iter().all(|(_, scope)| *scope == first) {
                first
            } else {
                None
            }
        } else {
            self.common_scope(&format!("{} '{}'", kind, id), &scopes)?
        };
        self.index.check_and_add(id, ItemKind::Equipment(kind))?;

        let array_size = self.variants.variant_array_size();
        let sides = Side::first(ends.len());
        let mut terminals = Vec::with_capacity(ends.len());
        for (i, (voltage_level, node)) in ends.iter().enumerate() {
            let vl = self.voltage_level_mut(voltage_level)?;
            vl.nodes[*node].terminal = Some((id.to_string(), sides[i]));
            terminals.push(Terminal {
                voltage_level: voltage_level.clone(),
                node: *node,
                connected: VariantArray::new(array_size, true),
            });
        }
        let dc_terminals = dc_ends
            .iter()
            .map(|dc_node| DcTerminal {
                dc_node: dc_node.clone(),
                connected: VariantArray::new(array_size, true),
            })
            .collect();

        self.equipment.insert(
            id.to_string(),
            Equipment {
                id: id.to_string(),
                kind,
                subnetwork,
                terminals,
                dc_terminals,
            },
        );
        self.invalidate_topology();
        Ok(())
    }

    /// Checks that every end is in the same scope and returns it.  Scopes
    /// differ when the ends are in two subnetworks, or when one end is in a
    /// subnetwork and another directly in the root.
    fn common_scope(
        &self,
        what: &str,
        ends: &[(String, Option<String>)],
    ) -> Result<Option<String>, Error> {
        let Some((first_desc, first)) = ends.first() else {
            return Ok(None);
        };
        for (desc, scope) in &ends[1..] {
            if scope != first {
                return Err(Error::structural_violation(format!(
                    "{}: {} is in network '{}' and {} is in network '{}'.",
                    what,
                    first_desc,
                    self.scope_name(first),
                    desc,
                    self.scope_name(scope),
                )));
            }
        }
        Ok(first.clone())
    }

    pub(crate) fn scope_name<'a>(&'a self, scope: &'a Option<String>) -> &'a str {
        scope.as_deref().unwrap_or(&self.id)
    }

    pub(crate) fn check_node(&self, voltage_level: &str, node: usize) -> Result<(), Error> {
        let vl = self.voltage_level(voltage_level)?;
        if node >= vl.nodes.len() {
            return Err(Error::structural_violation(format!(
                "Node {} not found in voltage level '{}'.",
                node, voltage_level
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_ids() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        assert_eq!(
            network.add_voltage_level("vl1", None, 2),
            Err(Error::structural_violation(
                "The network already contains an object (VoltageLevel) with the ID 'vl1'."
            ))
        );
        assert_eq!(
            network.add_injection("vl1", EquipmentKind::Load, "vl1", 0),
            Err(Error::structural_violation(
                "The network already contains an object (VoltageLevel) with the ID 'vl1'."
            ))
        );
        Ok(())
    }

    #[test]
    fn test_switch_validation() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 3)?;

        assert_eq!(
            network.add_switch("s1", "vl1", SwitchKind::Breaker, 1, 1, false, false),
            Err(Error::structural_violation(
                "Switch 's1': can't connect node 1 to itself."
            ))
        );
        assert_eq!(
            network.add_switch("s1", "vl1", SwitchKind::Breaker, 0, 3, false, false),
            Err(Error::structural_violation(
                "Node 3 not found in voltage level 'vl1'."
            ))
        );
        assert_eq!(
            network.add_switch("s1", "vl2", SwitchKind::Breaker, 0, 1, false, false),
            Err(Error::not_found("Voltage level 'vl2' not found."))
        );

        network.add_switch("s1", "vl1", SwitchKind::Breaker, 0, 1, false, false)?;
        assert_eq!(network.switch("s1")?.nodes(), (0, 1));
        assert_eq!(network.switch("s1")?.kind(), SwitchKind::Breaker);

        network.remove_switch("s1")?;
        assert_eq!(
            network.remove_switch("s1"),
            Err(Error::not_found("Switch 's1' not found."))
        );
        // The ID is free again after removal.
        network.add_switch("s1", "vl1", SwitchKind::Disconnector, 1, 2, true, false)?;

        Ok(())
    }

    #[test]
    fn test_one_terminal_per_node() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_injection("load1", EquipmentKind::Load, "vl1", 0)?;

        assert_eq!(
            network.add_injection("load2", EquipmentKind::Load, "vl1", 0),
            Err(Error::structural_violation(
                "Equipment 'load2': node 0 of voltage level 'vl1' already has a terminal of equipment 'load1'."
            ))
        );

        network.remove_equipment("load1")?;
        network.add_injection("load2", EquipmentKind::Load, "vl1", 0)?;
        Ok(())
    }

    #[test]
    fn test_injection_kind_validation() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 1)?;
        assert_eq!(
            network.add_injection("l1", EquipmentKind::Line, "vl1", 0),
            Err(Error::structural_violation(
                "Equipment 'l1': Line is not an injection kind."
            ))
        );
        Ok(())
    }

    #[test]
    fn test_cross_subnetwork_line_is_rejected() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_subnetwork("subA")?;
        network.add_subnetwork("subB")?;
        network.add_voltage_level("vl1", Some("subA"), 2)?;
        network.add_voltage_level("vl2", Some("subB"), 2)?;
        network.add_voltage_level("vl3", None, 2)?;

        assert_eq!(
            network.add_line("l1", "vl1", 0, "vl2", 0),
            Err(Error::structural_violation(
                "Line 'l1': voltage level 'vl1' is in network 'subA' and voltage level 'vl2' is in network 'subB'."
            ))
        );
        // Subnetwork and root mixed is just as illegal.
        assert_eq!(
            network.add_line("l1", "vl1", 0, "vl3", 0),
            Err(Error::structural_violation(
                "Line 'l1': voltage level 'vl1' is in network 'subA' and voltage level 'vl3' is in network 'root'."
            ))
        );
        // Both ends in the same subnetwork are fine.
        network.add_voltage_level("vl4", Some("subA"), 2)?;
        network.add_line("l2", "vl1", 0, "vl4", 0)?;
        assert_eq!(network.equipment("l2")?.subnetwork(), Some("subA"));

        // A tie line may span the two subnetworks and is owned by the root.
        network.add_tie_line("t1", "vl1", 1, "vl2", 1)?;
        assert_eq!(network.equipment("t1")?.subnetwork(), None);

        Ok(())
    }

    #[test]
    fn test_cross_subnetwork_dc_switch_is_rejected() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_subnetwork("subA")?;
        network.add_subnetwork("subB")?;
        network.add_dc_node("dc1", Some("subA"))?;
        network.add_dc_node("dc2", Some("subB"))?;

        assert_eq!(
            network.add_dc_switch("ds1", SwitchKind::Breaker, "dc1", "dc2", false),
            Err(Error::structural_violation(
                "DC switch 'ds1': DC node 'dc1' is in network 'subA' and DC node 'dc2' is in network 'subB'."
            ))
        );
        assert_eq!(
            network.add_dc_line("dl1", "dc1", "dc2"),
            Err(Error::structural_violation(
                "DcLine 'dl1': DC node 'dc1' is in network 'subA' and DC node 'dc2' is in network 'subB'."
            ))
        );
        Ok(())
    }

    #[test]
    fn test_converter_scope_validation() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_subnetwork("subA")?;
        network.add_voltage_level("vl1", Some("subA"), 1)?;
        network.add_dc_node("dc1", Some("subA"))?;
        network.add_dc_node("dc2", None)?;

        assert_eq!(
            network.add_ac_dc_converter("c1", "vl1", 0, "dc1", "dc2"),
            Err(Error::structural_violation(
                "AcDcConverter 'c1': voltage level 'vl1' is in network 'subA' and DC node 'dc2' is in network 'root'."
            ))
        );

        network.add_dc_node("dc3", Some("subA"))?;
        network.add_ac_dc_converter("c1", "vl1", 0, "dc1", "dc3")?;
        assert_eq!(network.equipment("c1")?.subnetwork(), Some("subA"));
        Ok(())
    }

    #[test]
    fn test_internal_connection_removal() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_internal_connection("vl1", 0, 1)?;
        network.remove_internal_connection("vl1", 0, 1)?;
        assert_eq!(
            network.remove_internal_connection("vl1", 0, 1),
            Err(Error::not_found(
                "No internal connection between nodes 0 and 1 in voltage level 'vl1'."
            ))
        );
        Ok(())
    }
}
