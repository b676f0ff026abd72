// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Topology traversal and equipment visitors.

use petgraph::visit::EdgeRef;

use crate::kinds::Side;
use crate::Error;

use super::bus_view::{Bus, DcBus};
use super::{Network, TopologyEdge};

/// Controls a traversal from inside a callback or visitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TraversalResult {
    /// Keep going.
    Continue,
    /// Do not continue past the current edge; other paths stay live.
    StopPath,
    /// Stop the whole traversal.
    Abort,
}

/// Receives the equipment attached to a bus or node, one terminal at a
/// time.  `side` identifies the visited terminal for multi-terminal
/// equipment; injections are always visited on [`Side::One`].
pub trait EquipmentVisitor {
    fn visit(&mut self, equipment: &super::Equipment, side: Side) -> TraversalResult;
}

/// Traversal entry points.
impl Network {
    /// Walks the topology graph of a voltage level from a start node.
    ///
    /// The callback is invoked once per edge with the node the edge leads
    /// to and, for switch edges, the switch ID (`None` for internal
    /// connections).  It is called regardless of switch state; deciding
    /// whether an open switch stops the walk is up to the caller.
    pub fn traverse_topology<F>(
        &self,
        voltage_level: &str,
        start: usize,
        mut callback: F,
    ) -> Result<(), Error>
    where
        F: FnMut(usize, Option<&str>) -> TraversalResult,
    {
        self.check_node(voltage_level, start)?;
        let vl = self.voltage_level(voltage_level)?;

        let mut visited = vec![false; vl.nodes.len()];
        visited[start] = true;
        let mut worklist = vec![start];
        while let Some(node) = worklist.pop() {
            for edge in vl.graph.edges(vl.nodes[node].index) {
                let next = vl.graph[if edge.source() == vl.nodes[node].index {
                    edge.target()
                } else {
                    edge.source()
                }];
                if visited[next] {
                    continue;
                }
                let switch = match edge.weight() {
                    TopologyEdge::Switch(id) => Some(id.as_str()),
                    TopologyEdge::InternalConnection => None,
                };
                match callback(next, switch) {
                    TraversalResult::Continue => {
                        visited[next] = true;
                        worklist.push(next);
                    }
                    TraversalResult::StopPath => {}
                    TraversalResult::Abort => return Ok(()),
                }
            }
        }
        Ok(())
    }

    /// Visits the equipment whose terminals are attached to the bus's
    /// nodes and have the connected flag set in the working variant.
    pub fn visit_connected_equipment<V: EquipmentVisitor>(
        &self,
        bus: &Bus,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let nodes = self.bus_nodes(bus)?;
        self.visit_nodes(&bus.voltage_level, &nodes, true, visitor)
    }

    /// Visits all equipment attached to the bus's nodes, connected or not.
    pub fn visit_connectable_equipment<V: EquipmentVisitor>(
        &self,
        bus: &Bus,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let nodes = self.bus_nodes(bus)?;
        self.visit_nodes(&bus.voltage_level, &nodes, false, visitor)
    }

    /// Visits the connected equipment attached to a single node.
    pub fn visit_connected_equipment_at<V: EquipmentVisitor>(
        &self,
        voltage_level: &str,
        node: usize,
        visitor: &mut V,
    ) -> Result<(), Error> {
        self.check_node(voltage_level, node)?;
        self.visit_nodes(voltage_level, &[node], true, visitor)
    }

    /// Visits all equipment attached to a single node.
    pub fn visit_connectable_equipment_at<V: EquipmentVisitor>(
        &self,
        voltage_level: &str,
        node: usize,
        visitor: &mut V,
    ) -> Result<(), Error> {
        self.check_node(voltage_level, node)?;
        self.visit_nodes(voltage_level, &[node], false, visitor)
    }

    /// Visits the equipment whose DC terminals are attached to the DC
    /// bus's nodes and have the connected flag set in the working variant.
    ///
    /// `side` numbers the visited DC terminal: a DC line's first terminal
    /// is [`Side::One`], a converter's two DC terminals are [`Side::One`]
    /// and [`Side::Two`] irrespective of its AC terminal.
    pub fn visit_connected_dc_equipment<V: EquipmentVisitor>(
        &self,
        bus: &DcBus,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let nodes = self.dc_bus_nodes(bus)?;
        self.visit_dc_nodes(&nodes, true, visitor)
    }

    /// Visits all equipment with a DC terminal on the DC bus's nodes,
    /// connected or not.
    pub fn visit_connectable_dc_equipment<V: EquipmentVisitor>(
        &self,
        bus: &DcBus,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let nodes = self.dc_bus_nodes(bus)?;
        self.visit_dc_nodes(&nodes, false, visitor)
    }

    fn visit_nodes<V: EquipmentVisitor>(
        &self,
        voltage_level: &str,
        nodes: &[usize],
        connected_only: bool,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let vl = self.voltage_level(voltage_level)?;
        for &node in nodes {
            let Some((equipment_id, side)) = &vl.nodes[node].terminal else {
                continue;
            };
            let equipment = self.equipment(equipment_id)?;
            let connected = equipment
                .terminal(*side)
                .is_some_and(|t| *t.connected.get(slot));
            if connected_only && !connected {
                continue;
            }
            if visitor.visit(equipment, *side) == TraversalResult::Abort {
                return Ok(());
            }
        }
        Ok(())
    }

    fn visit_dc_nodes<V: EquipmentVisitor>(
        &self,
        nodes: &[String],
        connected_only: bool,
        visitor: &mut V,
    ) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        for equipment in self.equipment.values() {
            let sides = Side::first(equipment.dc_terminals().len());
            for (i, terminal) in equipment.dc_terminals().iter().enumerate() {
                if !nodes.iter().any(|n| n == terminal.dc_node()) {
                    continue;
                }
                if connected_only && !*terminal.connected.get(slot) {
                    continue;
                }
                if visitor.visit(equipment, sides[i]) == TraversalResult::Abort {
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}
