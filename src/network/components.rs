// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The derived component partitions.
//!
//! Three partitions are computed in one pass over the calculated buses:
//!
//! - **Connected**: AC and DC buses joined by any closed switch, connected
//!   AC branches, connected DC lines and AC/DC converters.
//! - **Synchronous**: AC buses only, joined by closed AC switches and
//!   connected AC branches; DC links do not count.
//! - **Dc**: DC buses joined by connected DC lines.
//!
//! Component 0 is always the component with the most buses; ties break by
//! discovery order, which is voltage-level ID order then bus order, with
//! DC buses (in DC node ID order) after all AC buses.

use std::collections::HashMap;

use petgraph::unionfind::UnionFind;
use tracing::debug;

use crate::kinds::KindPredicates;
use crate::Error;

use super::bus_view::{Bus, DcBus};
use super::Network;

/// Which partition a component query refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    Connected,
    Synchronous,
    Dc,
}

impl std::fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartitionKind::Connected => write!(f, "connected"),
            PartitionKind::Synchronous => write!(f, "synchronous"),
            PartitionKind::Dc => write!(f, "DC"),
        }
    }
}

/// A handle to one component of a partition, stamped with the generation
/// it was computed at.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    pub(crate) kind: PartitionKind,
    pub(crate) number: usize,
    pub(crate) generation: u64,
}

impl Component {
    /// The component number.  Number 0 is the main component.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) enum BusKey {
    Ac(String, usize),
    Dc(usize),
}

#[derive(Debug)]
pub(crate) struct Partition {
    /// Bus IDs per component, in component-number order.
    pub(crate) components: Vec<Vec<String>>,
    pub(crate) membership: HashMap<BusKey, usize>,
}

#[derive(Debug)]
pub(crate) struct ComponentCache {
    pub(crate) generation: u64,
    pub(crate) connected: Partition,
    pub(crate) synchronous: Partition,
    pub(crate) dc: Partition,
}

impl ComponentCache {
    fn partition(&self, kind: PartitionKind) -> &Partition {
        match kind {
            PartitionKind::Connected => &self.connected,
            PartitionKind::Synchronous => &self.synchronous,
            PartitionKind::Dc => &self.dc,
        }
    }
}

/// Component queries.
impl Network {
    /// The number of components in a partition, for the working variant.
    pub fn component_count(&self, kind: PartitionKind) -> Result<usize, Error> {
        self.ensure_components()?;
        Ok(self
            .component_cache
            .borrow()
            .as_ref()
            .map_or(0, |cache| cache.partition(kind).components.len()))
    }

    /// The component a bus belongs to within a partition.  AC buses are
    /// not part of the DC partition.
    pub fn component_of(&self, bus: &Bus, kind: PartitionKind) -> Result<Component, Error> {
        self.check_handle(bus.generation, "Bus", &bus.id)?;
        self.component_for_key(BusKey::Ac(bus.voltage_level.clone(), bus.index), &bus.id, kind)
    }

    /// The component a DC bus belongs to within a partition.  DC buses are
    /// not part of the synchronous partition.
    pub fn component_of_dc_bus(
        &self,
        bus: &DcBus,
        kind: PartitionKind,
    ) -> Result<Component, Error> {
        self.check_handle(bus.generation, "DC bus", &bus.id)?;
        self.component_for_key(BusKey::Dc(bus.index), &bus.id, kind)
    }

    /// Whether a bus belongs to the main (largest) connected component.
    pub fn is_in_main_component(&self, bus: &Bus) -> Result<bool, Error> {
        Ok(self.component_of(bus, PartitionKind::Connected)?.number == 0)
    }

    /// The number of buses in a component.
    pub fn component_size(&self, component: &Component) -> Result<usize, Error> {
        Ok(self.component_bus_ids(component)?.len())
    }

    /// The IDs of the buses in a component.
    pub fn component_bus_ids(&self, component: &Component) -> Result<Vec<String>, Error> {
        self.check_handle(
            component.generation,
            "Component",
            &format!("{} {}", component.kind, component.number),
        )?;
        self.ensure_components()?;
        let cache = self.component_cache.borrow();
        let cache = cache
            .as_ref()
            .ok_or_else(|| Error::internal("Component cache missing after recomputation."))?;
        cache
            .partition(component.kind)
            .components
            .get(component.number)
            .cloned()
            .ok_or_else(|| {
                Error::internal(format!(
                    "Component {} missing from the {} partition.",
                    component.number, component.kind
                ))
            })
    }

    fn component_for_key(
        &self,
        key: BusKey,
        bus_id: &str,
        kind: PartitionKind,
    ) -> Result<Component, Error> {
        self.ensure_components()?;
        let cache = self.component_cache.borrow();
        let cache = cache
            .as_ref()
            .ok_or_else(|| Error::internal("Component cache missing after recomputation."))?;
        let number = cache.partition(kind).membership.get(&key).copied();
        match number {
            Some(number) => Ok(Component {
                kind,
                number,
                generation: self.generation,
            }),
            None => Err(Error::not_found(format!(
                "Bus '{}' is not part of the {} partition.",
                bus_id, kind
            ))),
        }
    }

    fn ensure_components(&self) -> Result<(), Error> {
        let slot = self.variants.working_slot()?;
        {
            let cache = self.component_cache.borrow();
            if cache
                .as_ref()
                .is_some_and(|cache| cache.generation == self.generation)
            {
                return Ok(());
            }
        }
        for vl_id in self.voltage_levels.keys() {
            self.ensure_bus_view(vl_id)?;
        }
        self.ensure_dc_bus_view()?;
        debug!("recomputing component partitions");
        let cache = self.compute_components(slot)?;
        *self.component_cache.borrow_mut() = Some(cache);
        Ok(())
    }

    fn compute_components(&self, slot: usize) -> Result<ComponentCache, Error> {
        let bus_views = self.bus_cache.borrow();
        let dc_view = self.dc_bus_cache.borrow();
        let dc_view = dc_view
            .as_ref()
            .ok_or_else(|| Error::internal("DC bus view missing after recomputation."))?;

        // Assign every bus a global ordinal in discovery order: AC buses
        // grouped by voltage level in ID order, then DC buses.
        let mut keys: Vec<(BusKey, String)> = Vec::new();
        let mut vl_base: HashMap<&str, usize> = HashMap::new();
        for (vl_id, view) in self
            .voltage_levels
            .keys()
            .map(|id| (id, &bus_views[id]))
        {
            vl_base.insert(vl_id.as_str(), keys.len());
            for (index, bus) in view.buses.iter().enumerate() {
                keys.push((BusKey::Ac(vl_id.clone(), index), bus.id.clone()));
            }
        }
        let dc_base = keys.len();
        for (index, bus) in dc_view.buses.iter().enumerate() {
            keys.push((BusKey::Dc(index), bus.id.clone()));
        }

        let total = keys.len();
        let mut connected: UnionFind<usize> = UnionFind::new(total);
        let mut synchronous: UnionFind<usize> = UnionFind::new(total);
        let mut dc: UnionFind<usize> = UnionFind::new(total);

        // Closed switches joining two distinct buses of one voltage level;
        // with the bus view already merged across non-retained switches,
        // these are the closed retained ones.
        for switch in self.switches.values() {
            if *switch.open.get(slot) {
                continue;
            }
            let view = &bus_views[&switch.voltage_level];
            let (bus1, bus2) = (
                view.node_to_bus[switch.node1],
                view.node_to_bus[switch.node2],
            );
            if bus1 != bus2 {
                let base = vl_base[switch.voltage_level.as_str()];
                connected.union(base + bus1, base + bus2);
                synchronous.union(base + bus1, base + bus2);
            }
        }

        for equipment in self.equipment.values() {
            if equipment.kind.is_ac_branch() {
                let ordinals: Vec<usize> = equipment
                    .terminals
                    .iter()
                    .filter(|t| *t.connected.get(slot))
                    .map(|t| {
                        vl_base[t.voltage_level.as_str()]
                            + bus_views[&t.voltage_level].node_to_bus[t.node]
                    })
                    .collect();
                for pair in ordinals.windows(2) {
                    connected.union(pair[0], pair[1]);
                    synchronous.union(pair[0], pair[1]);
                }
            } else if equipment.kind.is_dc_line() {
                let ordinals: Vec<usize> = equipment
                    .dc_terminals
                    .iter()
                    .filter(|t| *t.connected.get(slot))
                    .map(|t| dc_base + dc_view.node_to_bus[&t.dc_node])
                    .collect();
                for pair in ordinals.windows(2) {
                    connected.union(pair[0], pair[1]);
                    dc.union(pair[0], pair[1]);
                }
            } else if equipment.kind.is_converter() {
                // Converters bridge the AC and DC sides, but neither the
                // synchronous nor the DC partition crosses them.
                let mut ordinals: Vec<usize> = equipment
                    .terminals
                    .iter()
                    .filter(|t| *t.connected.get(slot))
                    .map(|t| {
                        vl_base[t.voltage_level.as_str()]
                            + bus_views[&t.voltage_level].node_to_bus[t.node]
                    })
                    .collect();
                ordinals.extend(
                    equipment
                        .dc_terminals
                        .iter()
                        .filter(|t| *t.connected.get(slot))
                        .map(|t| dc_base + dc_view.node_to_bus[&t.dc_node]),
                );
                for pair in ordinals.windows(2) {
                    connected.union(pair[0], pair[1]);
                }
            }
        }

        let ac_ordinals: Vec<usize> = (0..dc_base).collect();
        let dc_ordinals: Vec<usize> = (dc_base..total).collect();
        let all_ordinals: Vec<usize> = (0..total).collect();
        Ok(ComponentCache {
            generation: self.generation,
            connected: build_partition(&connected, &all_ordinals, &keys),
            synchronous: build_partition(&synchronous, &ac_ordinals, &keys),
            dc: build_partition(&dc, &dc_ordinals, &keys),
        })
    }
}

/// Groups the ordinals by union-find root and numbers the groups: largest
/// first, ties broken by discovery order (lowest ordinal).
fn build_partition(
    union: &UnionFind<usize>,
    ordinals: &[usize],
    keys: &[(BusKey, String)],
) -> Partition {
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut root_to_group: HashMap<usize, usize> = HashMap::new();
    for &ordinal in ordinals {
        let root = union.find(ordinal);
        let group = *root_to_group.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[group].push(ordinal);
    }

    let mut order: Vec<usize> = (0..groups.len()).collect();
    order.sort_by_key(|&group| (std::cmp::Reverse(groups[group].len()), groups[group][0]));

    let mut components = Vec::with_capacity(groups.len());
    let mut membership = HashMap::new();
    for (number, &group) in order.iter().enumerate() {
        let mut bus_ids = Vec::with_capacity(groups[group].len());
        for &ordinal in &groups[group] {
            let (key, bus_id) = &keys[ordinal];
            bus_ids.push(bus_id.clone());
            membership.insert(key.clone(), number);
        }
        components.push(bus_ids);
    }
    Partition {
        components,
        membership,
    }
}
