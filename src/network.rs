// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! A typed graph of the electrical equipment, nodes and switches of a power
//! network, with derived bus and component views.

mod creation;
mod index;
mod retrieval;
mod variants;

mod bus_view;
mod components;
mod composition;
mod connection;
mod traversal;

#[cfg(test)]
pub(crate) mod test_util;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};

use petgraph::stable_graph::{NodeIndex, StableUnGraph};

use crate::kinds::{EquipmentKind, Side, SwitchKind};
use crate::variants::{VariantArray, VariantManager};
use crate::NetworkConfig;

pub use bus_view::{Bus, DcBus};
pub use components::{Component, PartitionKind};
pub use connection::SwitchFilter;
pub use index::ItemKind;
pub use traversal::{EquipmentVisitor, TraversalResult};

/// An edge of a voltage level's node/switch graph.
///
/// Internal connections are permanent and always closed; switch edges
/// carry the ID of the switch whose state decides whether they conduct.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum TopologyEdge {
    Switch(String),
    InternalConnection,
}

/// A node of a voltage level's graph.
///
/// Nodes are numbered densely from zero within their voltage level.  A node
/// can hold at most one equipment terminal, and carries the variant-scoped
/// voltage written through calculated buses.
#[derive(Clone, Debug)]
pub(crate) struct NodeSlot {
    pub(crate) index: NodeIndex,
    pub(crate) terminal: Option<(String, Side)>,
    pub(crate) v: VariantArray<f64>,
}

/// A voltage level: one node-breaker graph plus its scope information.
#[derive(Debug)]
pub struct VoltageLevel {
    id: String,
    subnetwork: Option<String>,
    fictitious: bool,
    pub(crate) graph: StableUnGraph<usize, TopologyEdge>,
    pub(crate) nodes: Vec<NodeSlot>,
}

impl VoltageLevel {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The subnetwork this voltage level belongs to, if any.
    pub fn subnetwork(&self) -> Option<&str> {
        self.subnetwork.as_deref()
    }

    /// Whether this voltage level is a fictitious tee point rather than a
    /// physical substation.
    pub fn is_fictitious(&self) -> bool {
        self.fictitious
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// A switch between two nodes of one voltage level.
///
/// The open and retained flags are variant-scoped and must be read through
/// the network; the rest of the state is static.
#[derive(Debug)]
pub struct Switch {
    id: String,
    kind: SwitchKind,
    voltage_level: String,
    node1: usize,
    node2: usize,
    fictitious: bool,
    pub(crate) open: VariantArray<bool>,
    pub(crate) retained: VariantArray<bool>,
}

impl Switch {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    pub fn voltage_level(&self) -> &str {
        &self.voltage_level
    }

    pub fn nodes(&self) -> (usize, usize) {
        (self.node1, self.node2)
    }

    pub fn is_fictitious(&self) -> bool {
        self.fictitious
    }
}

/// An AC attachment point of an equipment: one node in one voltage level,
/// plus the variant-scoped connected flag.
#[derive(Debug)]
pub struct Terminal {
    voltage_level: String,
    node: usize,
    pub(crate) connected: VariantArray<bool>,
}

impl Terminal {
    pub fn voltage_level(&self) -> &str {
        &self.voltage_level
    }

    pub fn node(&self) -> usize {
        self.node
    }
}

/// A DC attachment point of an equipment.
#[derive(Debug)]
pub struct DcTerminal {
    dc_node: String,
    pub(crate) connected: VariantArray<bool>,
}

impl DcTerminal {
    pub fn dc_node(&self) -> &str {
        &self.dc_node
    }
}

/// An equipment: a kind, up to three AC terminals and up to two DC
/// terminals.
///
/// The physical parameter catalog is out of scope; the topology core only
/// tracks where equipment attaches and whether its terminals are connected.
#[derive(Debug)]
pub struct Equipment {
    id: String,
    kind: EquipmentKind,
    subnetwork: Option<String>,
    terminals: Vec<Terminal>,
    dc_terminals: Vec<DcTerminal>,
}

impl Equipment {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> EquipmentKind {
        self.kind
    }

    /// The subnetwork this equipment belongs to.  Tie lines always belong
    /// to the root and report `None`.
    pub fn subnetwork(&self) -> Option<&str> {
        self.subnetwork.as_deref()
    }

    pub fn terminals(&self) -> &[Terminal] {
        &self.terminals
    }

    pub fn dc_terminals(&self) -> &[DcTerminal] {
        &self.dc_terminals
    }

    pub fn terminal(&self, side: Side) -> Option<&Terminal> {
        self.terminals.get(side.index())
    }
}

/// A node of the DC graph.  DC nodes live at network level, outside any
/// voltage level.
#[derive(Debug)]
pub struct DcNode {
    id: String,
    subnetwork: Option<String>,
    pub(crate) v: VariantArray<f64>,
}

impl DcNode {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subnetwork(&self) -> Option<&str> {
        self.subnetwork.as_deref()
    }
}

/// A switch between two DC nodes.
#[derive(Debug)]
pub struct DcSwitch {
    id: String,
    kind: SwitchKind,
    node1: String,
    node2: String,
    fictitious: bool,
    pub(crate) open: VariantArray<bool>,
}

impl DcSwitch {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> SwitchKind {
        self.kind
    }

    pub fn nodes(&self) -> (&str, &str) {
        (&self.node1, &self.node2)
    }

    pub fn is_fictitious(&self) -> bool {
        self.fictitious
    }
}

/// A named, nested partition of a root network.
///
/// Membership is recorded as a tag on voltage levels, DC nodes and
/// equipment; the container itself only carries the identity.
#[derive(Debug)]
pub struct Subnetwork {
    id: String,
}

impl Subnetwork {
    pub fn id(&self) -> &str {
        &self.id
    }
}

/// The electrical topology of a power network.
///
/// A network owns its voltage levels, switches and equipment, a flat
/// identifier index, the variant store, and lazily derived bus and
/// component views.  Derived views are handed out as generation-counted
/// handles ([`Bus`], [`DcBus`], [`Component`]) that fail fast once any
/// structural mutation has invalidated them.
///
/// All operations are synchronous and assume exclusive access; the caches
/// use interior mutability, so a `Network` is deliberately not `Sync`.
pub struct Network {
    id: String,
    config: NetworkConfig,
    pub(crate) index: index::NetworkIndex,
    pub(crate) variants: VariantManager,
    pub(crate) voltage_levels: BTreeMap<String, VoltageLevel>,
    pub(crate) switches: BTreeMap<String, Switch>,
    pub(crate) equipment: BTreeMap<String, Equipment>,
    pub(crate) dc_nodes: BTreeMap<String, DcNode>,
    pub(crate) dc_switches: BTreeMap<String, DcSwitch>,
    pub(crate) subnetworks: BTreeMap<String, Subnetwork>,
    /// Bumped by every structural mutation and working-variant switch;
    /// derived handles compare against it.
    pub(crate) generation: u64,
    pub(crate) bus_cache: RefCell<HashMap<String, bus_view::BusViewCache>>,
    pub(crate) dc_bus_cache: RefCell<Option<bus_view::DcBusCache>>,
    pub(crate) component_cache: RefCell<Option<components::ComponentCache>>,
}

impl Network {
    /// Creates an empty network with the default configuration.
    pub fn new(id: &str) -> Self {
        Self::with_config(id, NetworkConfig::default())
    }

    /// Creates an empty network with the given configuration.
    pub fn with_config(id: &str, config: NetworkConfig) -> Self {
        Self {
            id: id.to_string(),
            variants: VariantManager::new(&config.initial_variant_id),
            config,
            index: index::NetworkIndex::new(),
            voltage_levels: BTreeMap::new(),
            switches: BTreeMap::new(),
            equipment: BTreeMap::new(),
            dc_nodes: BTreeMap::new(),
            dc_switches: BTreeMap::new(),
            subnetworks: BTreeMap::new(),
            generation: 0,
            bus_cache: RefCell::new(HashMap::new()),
            dc_bus_cache: RefCell::new(None),
            component_cache: RefCell::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Marks every derived handle as stale.  Caches are re-derived lazily
    /// on the next query.
    pub(crate) fn invalidate_topology(&mut self) {
        self.generation += 1;
    }
}
