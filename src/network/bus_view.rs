// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The calculated bus views.
//!
//! An AC bus is the maximal set of nodes of one voltage level joined by
//! internal connections and closed non-retained switches; a DC bus is the
//! maximal set of DC nodes joined by closed DC switches.  Both views are
//! derived lazily for the working variant and cached until the next
//! structural change.
//!
//! Queries hand out [`Bus`] and [`DcBus`] handles stamped with the network
//! generation they were computed at.  After any structural mutation the
//! stamp no longer matches and every query through the old handle fails
//! with an `InvalidatedReference` error; callers must fetch fresh handles.

use std::collections::HashMap;

use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::Error;

use super::{Network, TopologyEdge, VoltageLevel};

/// One calculated AC bus: its derived ID and its nodes, sorted.
#[derive(Clone, Debug)]
pub(crate) struct CalculatedBus {
    pub(crate) id: String,
    pub(crate) nodes: Vec<usize>,
}

/// The cached bus view of one voltage level.
#[derive(Debug)]
pub(crate) struct BusViewCache {
    pub(crate) generation: u64,
    pub(crate) buses: Vec<CalculatedBus>,
    pub(crate) node_to_bus: Vec<usize>,
}

/// One calculated DC bus.
#[derive(Clone, Debug)]
pub(crate) struct DcCalculatedBus {
    pub(crate) id: String,
    pub(crate) nodes: Vec<String>,
}

/// The cached network-wide DC bus view.
#[derive(Debug)]
pub(crate) struct DcBusCache {
    pub(crate) generation: u64,
    pub(crate) buses: Vec<DcCalculatedBus>,
    pub(crate) node_to_bus: HashMap<String, usize>,
}

/// A handle to a calculated AC bus.
///
/// The handle stays valid until the next structural mutation of the
/// network; afterwards every query through it fails and a fresh handle has
/// to be fetched.
#[derive(Clone, Debug, PartialEq)]
pub struct Bus {
    pub(crate) id: String,
    pub(crate) voltage_level: String,
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl Bus {
    /// The derived bus ID: the voltage level ID and the lowest node number
    /// in the bus.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn voltage_level(&self) -> &str {
        &self.voltage_level
    }
}

/// A handle to a calculated DC bus.
#[derive(Clone, Debug, PartialEq)]
pub struct DcBus {
    pub(crate) id: String,
    pub(crate) index: usize,
    pub(crate) generation: u64,
}

impl DcBus {
    /// The derived bus ID: `dc_` and the lowest DC node ID in the bus.
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// Calculated bus queries.
impl Network {
    /// The number of buses in a voltage level, for the working variant.
    pub fn bus_count(&self, voltage_level: &str) -> Result<usize, Error> {
        self.ensure_bus_view(voltage_level)?;
        Ok(self.bus_cache.borrow()[voltage_level].buses.len())
    }

    /// The buses of a voltage level, for the working variant, ordered by
    /// lowest node number.
    pub fn buses(&self, voltage_level: &str) -> Result<Vec<Bus>, Error> {
        self.ensure_bus_view(voltage_level)?;
        let cache = self.bus_cache.borrow();
        Ok(cache[voltage_level]
            .buses
            .iter()
            .enumerate()
            .map(|(index, bus)| Bus {
                id: bus.id.clone(),
                voltage_level: voltage_level.to_string(),
                index,
                generation: self.generation,
            })
            .collect())
    }

    /// The bus a node belongs to.  Every node belongs to exactly one bus;
    /// an isolated node forms a singleton bus.
    pub fn bus_at(&self, voltage_level: &str, node: usize) -> Result<Bus, Error> {
        self.check_node(voltage_level, node)?;
        self.ensure_bus_view(voltage_level)?;
        let cache = self.bus_cache.borrow();
        let view = &cache[voltage_level];
        let index = view.node_to_bus[node];
        Ok(Bus {
            id: view.buses[index].id.clone(),
            voltage_level: voltage_level.to_string(),
            index,
            generation: self.generation,
        })
    }

    /// The nodes of a bus, sorted.
    pub fn bus_nodes(&self, bus: &Bus) -> Result<Vec<usize>, Error> {
        self.check_handle(bus.generation, "Bus", &bus.id)?;
        self.ensure_bus_view(&bus.voltage_level)?;
        Ok(self.bus_cache.borrow()[&bus.voltage_level].buses[bus.index]
            .nodes
            .clone())
    }

    /// The voltage at a bus, for the working variant.  `NaN` until a
    /// voltage has been written.
    pub fn bus_voltage(&self, bus: &Bus) -> Result<f64, Error> {
        let slot = self.variants.working_slot()?;
        let nodes = self.bus_nodes(bus)?;
        let vl = self.voltage_level(&bus.voltage_level)?;
        Ok(*vl.nodes[nodes[0]].v.get(slot))
    }

    /// Writes a voltage to every node of a bus, for the working variant.
    /// Voltage is electrical state; writing it does not invalidate any
    /// derived handle.
    pub fn set_bus_voltage(&mut self, bus: &Bus, voltage: f64) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let nodes = self.bus_nodes(bus)?;
        let vl = self.voltage_level_mut(&bus.voltage_level)?;
        for node in nodes {
            vl.nodes[node].v.set(slot, voltage);
        }
        Ok(())
    }

    /// The number of DC buses, for the working variant.
    pub fn dc_bus_count(&self) -> Result<usize, Error> {
        self.ensure_dc_bus_view()?;
        Ok(self
            .dc_bus_cache
            .borrow()
            .as_ref()
            .map_or(0, |cache| cache.buses.len()))
    }

    /// The DC buses, for the working variant, ordered by lowest DC node ID.
    pub fn dc_buses(&self) -> Result<Vec<DcBus>, Error> {
        self.ensure_dc_bus_view()?;
        let cache = self.dc_bus_cache.borrow();
        let view = cache.as_ref().ok_or_else(|| {
            Error::internal("DC bus view missing after recomputation.")
        })?;
        Ok(view
            .buses
            .iter()
            .enumerate()
            .map(|(index, bus)| DcBus {
                id: bus.id.clone(),
                index,
                generation: self.generation,
            })
            .collect())
    }

    /// The DC bus a DC node belongs to.
    pub fn dc_bus_at(&self, dc_node: &str) -> Result<DcBus, Error> {
        self.dc_node(dc_node)?;
        self.ensure_dc_bus_view()?;
        let cache = self.dc_bus_cache.borrow();
        let view = cache.as_ref().ok_or_else(|| {
            Error::internal("DC bus view missing after recomputation.")
        })?;
        let index = view.node_to_bus[dc_node];
        Ok(DcBus {
            id: view.buses[index].id.clone(),
            index,
            generation: self.generation,
        })
    }

    /// The DC nodes of a DC bus, sorted.
    pub fn dc_bus_nodes(&self, bus: &DcBus) -> Result<Vec<String>, Error> {
        self.check_handle(bus.generation, "DC bus", &bus.id)?;
        self.ensure_dc_bus_view()?;
        let cache = self.dc_bus_cache.borrow();
        let view = cache.as_ref().ok_or_else(|| {
            Error::internal("DC bus view missing after recomputation.")
        })?;
        Ok(view.buses[bus.index].nodes.clone())
    }

    /// Fails with an `InvalidatedReference` error when a handle predates
    /// the last structural mutation.
    pub(crate) fn check_handle(
        &self,
        generation: u64,
        what: &str,
        id: &str,
    ) -> Result<(), Error> {
        if generation != self.generation {
            return Err(Error::invalidated_reference(format!(
                "{} '{}' has been invalidated by a topology change; fetch it again.",
                what, id
            )));
        }
        Ok(())
    }

    pub(crate) fn ensure_bus_view(&self, voltage_level: &str) -> Result<(), Error> {
        let vl = self.voltage_level(voltage_level)?;
        let slot = self.variants.working_slot()?;
        let mut cache = self.bus_cache.borrow_mut();
        let stale = cache
            .get(voltage_level)
            .map_or(true, |view| view.generation != self.generation);
        if stale {
            debug!(voltage_level, "recomputing bus view");
            cache.insert(voltage_level.to_string(), self.compute_bus_view(vl, slot));
        }
        Ok(())
    }

    fn compute_bus_view(&self, vl: &VoltageLevel, slot: usize) -> BusViewCache {
        let node_count = vl.nodes.len();
        let mut node_to_bus = vec![usize::MAX; node_count];
        let mut buses = Vec::new();

        for start in 0..node_count {
            if node_to_bus[start] != usize::MAX {
                continue;
            }
            let bus_index = buses.len();
            let mut members = Vec::new();
            let mut stack = vec![start];
            node_to_bus[start] = bus_index;
            while let Some(node) = stack.pop() {
                members.push(node);
                for edge in vl.graph.edges(vl.nodes[node].index) {
                    let conducts = match edge.weight() {
                        TopologyEdge::InternalConnection => true,
                        TopologyEdge::Switch(id) => {
                            let switch = &self.switches[id];
                            !*switch.open.get(slot) && !*switch.retained.get(slot)
                        }
                    };
                    if !conducts {
                        continue;
                    }
                    let other = if edge.source() == vl.nodes[node].index {
                        edge.target()
                    } else {
                        edge.source()
                    };
                    let other = vl.graph[other];
                    if node_to_bus[other] == usize::MAX {
                        node_to_bus[other] = bus_index;
                        stack.push(other);
                    }
                }
            }
            members.sort_unstable();
            buses.push(CalculatedBus {
                id: format!("{}_{}", vl.id, members[0]),
                nodes: members,
            });
        }

        BusViewCache {
            generation: self.generation,
            buses,
            node_to_bus,
        }
    }

    pub(crate) fn ensure_dc_bus_view(&self) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        let mut cache = self.dc_bus_cache.borrow_mut();
        let stale = cache
            .as_ref()
            .map_or(true, |view| view.generation != self.generation);
        if stale {
            debug!("recomputing DC bus view");
            *cache = Some(self.compute_dc_bus_view(slot));
        }
        Ok(())
    }

    fn compute_dc_bus_view(&self, slot: usize) -> DcBusCache {
        // Adjacency through closed DC switches.
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
        for switch in self.dc_switches.values() {
            if *switch.open.get(slot) {
                continue;
            }
            adjacency
                .entry(&switch.node1)
                .or_default()
                .push(&switch.node2);
            adjacency
                .entry(&switch.node2)
                .or_default()
                .push(&switch.node1);
        }

        let mut node_to_bus = HashMap::new();
        let mut buses = Vec::new();
        // BTreeMap order makes discovery (and bus numbering) deterministic.
        for start in self.dc_nodes.keys() {
            if node_to_bus.contains_key(start.as_str()) {
                continue;
            }
            let bus_index = buses.len();
            let mut members = Vec::new();
            let mut stack = vec![start.as_str()];
            node_to_bus.insert(start.clone(), bus_index);
            while let Some(node) = stack.pop() {
                members.push(node.to_string());
                for other in adjacency.get(node).into_iter().flatten() {
                    if !node_to_bus.contains_key(*other) {
                        node_to_bus.insert(other.to_string(), bus_index);
                        stack.push(other);
                    }
                }
            }
            members.sort_unstable();
            buses.push(DcCalculatedBus {
                id: format!("dc_{}", members[0]),
                nodes: members,
            });
        }

        DcBusCache {
            generation: self.generation,
            buses,
            node_to_bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::INITIAL_VARIANT_ID;
    use crate::kinds::SwitchKind;
    use crate::network::test_util::two_bus_voltage_level;

    #[test]
    fn test_every_node_is_in_exactly_one_bus() -> Result<(), Error> {
        let network = two_bus_voltage_level()?;

        let buses = network.buses("vl1")?;
        let mut all_nodes: Vec<usize> = Vec::new();
        for bus in &buses {
            all_nodes.extend(network.bus_nodes(bus)?);
        }
        all_nodes.sort_unstable();
        assert_eq!(all_nodes, (0..network.voltage_level("vl1")?.node_count()).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn test_bus_merge_and_roundtrip() -> Result<(), Error> {
        let mut network = two_bus_voltage_level()?;

        // Two buses while the coupler is open.
        assert_eq!(network.bus_count("vl1"), Ok(2));
        let bus_a = network.bus_at("vl1", 0)?;
        let bus_b = network.bus_at("vl1", 2)?;
        assert_eq!(bus_a.id(), "vl1_0");
        assert_eq!(bus_b.id(), "vl1_2");
        assert_eq!(network.bus_nodes(&bus_a)?, vec![0, 1]);
        assert_eq!(network.bus_nodes(&bus_b)?, vec![2, 3]);

        // Closing the coupler merges them and invalidates old handles.
        network.set_switch_open("s", false)?;
        assert_eq!(network.bus_count("vl1"), Ok(1));
        assert_eq!(
            network.bus_nodes(&bus_a),
            Err(Error::invalidated_reference(
                "Bus 'vl1_0' has been invalidated by a topology change; fetch it again."
            ))
        );
        let merged = network.bus_at("vl1", 3)?;
        assert_eq!(merged.id(), "vl1_0");
        assert_eq!(network.bus_nodes(&merged)?, vec![0, 1, 2, 3]);

        // Reopening splits the bus again.
        network.set_switch_open("s", true)?;
        assert_eq!(network.bus_count("vl1"), Ok(2));
        assert_eq!(network.bus_nodes(&network.bus_at("vl1", 0)?)?, vec![0, 1]);
        assert_eq!(network.bus_nodes(&network.bus_at("vl1", 2)?)?, vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_isolated_node_forms_singleton_bus() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 3)?;
        network.add_internal_connection("vl1", 0, 1)?;

        assert_eq!(network.bus_count("vl1"), Ok(2));
        let singleton = network.bus_at("vl1", 2)?;
        assert_eq!(singleton.id(), "vl1_2");
        assert_eq!(network.bus_nodes(&singleton)?, vec![2]);
        Ok(())
    }

    #[test]
    fn test_closed_retained_switch_splits_buses() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_switch("s1", "vl1", SwitchKind::Breaker, 0, 1, false, true)?;

        assert_eq!(network.bus_count("vl1"), Ok(2));
        network.set_switch_retained("s1", false)?;
        assert_eq!(network.bus_count("vl1"), Ok(1));
        Ok(())
    }

    #[test]
    fn test_removing_a_switch_invalidates_handles() -> Result<(), Error> {
        let mut network = two_bus_voltage_level()?;
        let bus = network.bus_at("vl1", 0)?;

        network.remove_switch("s")?;
        assert_eq!(
            network.bus_nodes(&bus),
            Err(Error::invalidated_reference(
                "Bus 'vl1_0' has been invalidated by a topology change; fetch it again."
            ))
        );
        assert_eq!(network.bus_count("vl1"), Ok(2));
        Ok(())
    }

    #[test]
    fn test_bus_view_is_per_variant() -> Result<(), Error> {
        let mut network = two_bus_voltage_level()?;
        network.clone_variant(INITIAL_VARIANT_ID, "v1")?;

        network.set_working_variant("v1")?;
        network.set_switch_open("s", false)?;
        assert_eq!(network.bus_count("vl1"), Ok(1));

        network.set_working_variant(INITIAL_VARIANT_ID)?;
        assert_eq!(network.bus_count("vl1"), Ok(2));
        Ok(())
    }

    #[test]
    fn test_bus_voltage_roundtrip() -> Result<(), Error> {
        let mut network = two_bus_voltage_level()?;
        let bus = network.bus_at("vl1", 0)?;
        assert!(network.bus_voltage(&bus)?.is_nan());

        network.set_bus_voltage(&bus, 402.5)?;
        assert_eq!(network.bus_voltage(&bus), Ok(402.5));
        // All member nodes see the write.
        assert_eq!(network.bus_voltage(&network.bus_at("vl1", 1)?), Ok(402.5));
        // The other bus is untouched.
        assert!(network.bus_voltage(&network.bus_at("vl1", 2)?)?.is_nan());
        Ok(())
    }

    #[test]
    fn test_dc_bus_view() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_dc_node("dcA", None)?;
        network.add_dc_node("dcB", None)?;
        network.add_dc_node("dcC", None)?;
        network.add_dc_switch("ds1", SwitchKind::Breaker, "dcA", "dcB", false)?;
        network.add_dc_switch("ds2", SwitchKind::Breaker, "dcB", "dcC", true)?;

        assert_eq!(network.dc_bus_count(), Ok(2));
        let bus = network.dc_bus_at("dcB")?;
        assert_eq!(bus.id(), "dc_dcA");
        assert_eq!(network.dc_bus_nodes(&bus)?, vec!["dcA", "dcB"]);

        network.set_dc_switch_open("ds2", false)?;
        assert_eq!(network.dc_bus_count(), Ok(1));
        assert_eq!(
            network.dc_bus_nodes(&bus),
            Err(Error::invalidated_reference(
                "DC bus 'dc_dcA' has been invalidated by a topology change; fetch it again."
            ))
        );
        Ok(())
    }
}
