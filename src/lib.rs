// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

/*!
# Frequenz Network Topology

This is a library for representing the electrical topology of a power
network as a typed graph of voltage levels, nodes, switches and equipment,
and for deriving consistent connectivity views from it.

A [`Network`] owns the raw node-breaker graphs of its voltage levels, a
mirroring DC graph, a flat identifier index, and a store of parallel
variants.  From that substrate it derives, lazily and cached:

- **Calculated buses**: maximal sets of nodes joined by closed
  non-retained switches and internal connections, per voltage level
  ([`Bus`]) and over the DC graph ([`DcBus`]).
- **Components**: connected, synchronous and DC partitions over those
  buses ([`Component`], [`PartitionKind`]).

Derived views are handed out as generation-counted handles: any structural
mutation invalidates them, and a query through a stale handle fails with
an [`Error`] instead of returning outdated data.

## Variants

Every mutable attribute (switch open/retained state, terminal connection
flags, node voltages) exists once per variant.  Variants are cloned,
removed and selected through the network; see [`VariantManager`] for the
slot bookkeeping.

## Connecting and disconnecting

[`Network::connect`] and [`Network::disconnect`] search the switch paths
between an equipment's terminals and the busbar sections, toggling the
minimal switch set allowed by a [`SwitchFilter`], optionally propagating
through fictitious tee-point voltage levels.

## Composition

Independent networks can be merged into one root with a subnetwork per
input ([`Network::merge`]), detached back out ([`Network::detach`]) when
no boundary element spans the border, or flattened into a plain root
([`Network::flatten`]).
*/

mod config;
pub use config::{NetworkConfig, INITIAL_VARIANT_ID};

mod error;
pub use error::Error;

pub mod kinds;

mod variants;
pub use variants::VariantManager;

mod network;
pub use network::{
    Bus, Component, DcBus, DcNode, DcSwitch, DcTerminal, Equipment, EquipmentVisitor, ItemKind,
    Network, PartitionKind, Subnetwork, Switch, SwitchFilter, Terminal, TraversalResult,
    VoltageLevel,
};
