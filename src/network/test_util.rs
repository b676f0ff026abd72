// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Shared test fixtures.

use crate::kinds::{EquipmentKind, Side, SwitchKind};
use crate::Error;

use super::Network;

/// A network with one voltage level of four nodes forming two buses,
/// `{0, 1}` and `{2, 3}`, joined by the open breaker `s`.
pub(crate) fn two_bus_voltage_level() -> Result<Network, Error> {
    let mut network = Network::new("root");
    network.add_voltage_level("vl1", None, 4)?;
    network.add_internal_connection("vl1", 0, 1)?;
    network.add_internal_connection("vl1", 2, 3)?;
    network.add_switch("s", "vl1", SwitchKind::Breaker, 1, 2, true, false)?;
    Ok(network)
}

/// A feeder bay: busbar section at node 0, open disconnector `d1` to node
/// 1, open breaker `b1` to node 2, and the disconnected load `load1` at
/// node 2.
pub(crate) fn feeder_bay() -> Result<Network, Error> {
    let mut network = Network::new("root");
    network.add_voltage_level("vl1", None, 3)?;
    network.add_busbar_section("bbs1", "vl1", 0)?;
    network.add_switch("d1", "vl1", SwitchKind::Disconnector, 0, 1, true, false)?;
    network.add_switch("b1", "vl1", SwitchKind::Breaker, 1, 2, true, false)?;
    network.add_injection("load1", EquipmentKind::Load, "vl1", 2)?;
    network.set_terminal_connected("load1", Side::One, false)?;
    Ok(network)
}

/// An independent single-substation network whose member IDs all start
/// with `prefix`: one voltage level of three nodes forming a single bus,
/// with a busbar section, a closed breaker and a load.  Node 2 is kept
/// free so tests can attach lines to it.
pub(crate) fn single_substation(prefix: &str) -> Result<Network, Error> {
    let mut network = Network::new(prefix);
    let vl = format!("{}_vl", prefix);
    network.add_voltage_level(&vl, None, 3)?;
    network.add_busbar_section(&format!("{}_bbs", prefix), &vl, 0)?;
    network.add_switch(
        &format!("{}_b", prefix),
        &vl,
        SwitchKind::Breaker,
        0,
        1,
        false,
        false,
    )?;
    network.add_internal_connection(&vl, 1, 2)?;
    network.add_injection(&format!("{}_load", prefix), EquipmentKind::Load, &vl, 1)?;
    Ok(network)
}
