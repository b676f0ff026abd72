// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! Connecting and disconnecting equipment through switches.
//!
//! Both operations work path-wise: every simple path from the terminal's
//! node to a busbar section is enumerated, and switches along those paths
//! are toggled.  Connecting closes the open switches of the cheapest
//! usable path; disconnecting opens the first acceptable switch of every
//! path that still conducts.  A path blocked by the switch filter makes
//! the whole call report `Ok(false)` and touch nothing.

use std::collections::{BTreeSet, HashSet};

use petgraph::visit::EdgeRef;
use tracing::debug;

use crate::kinds::{KindPredicates, Side, SwitchKind};
use crate::Error;

use super::{Network, Switch, TopologyEdge};

/// Selects which switches an operation is allowed to toggle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchFilter {
    /// Any switch.
    Any,
    /// Any switch not marked fictitious.
    NonFictitious,
    /// Breakers only.
    BreakerOnly,
    /// Non-fictitious breakers only.
    NonFictitiousBreaker,
    /// Breakers and disconnectors, fictitious or not.
    BreakerOrDisconnector,
}

impl SwitchFilter {
    /// Whether the operation may toggle this switch.
    pub fn matches(&self, switch: &Switch) -> bool {
        match self {
            SwitchFilter::Any => true,
            SwitchFilter::NonFictitious => !switch.is_fictitious(),
            SwitchFilter::BreakerOnly => switch.kind() == SwitchKind::Breaker,
            SwitchFilter::NonFictitiousBreaker => {
                switch.kind() == SwitchKind::Breaker && !switch.is_fictitious()
            }
            SwitchFilter::BreakerOrDisconnector => matches!(
                switch.kind(),
                SwitchKind::Breaker | SwitchKind::Disconnector
            ),
        }
    }
}

/// One enumerated route from a terminal's node to a path-ending node, as
/// the ordered switch IDs along it plus its total edge count.
struct Path {
    switches: Vec<String>,
    edges: usize,
}

/// What ends a path during the search.
///
/// Connecting aims for a busbar section; disconnecting must separate the
/// terminal from every live foreign terminal, busbar or not.
#[derive(Clone, Copy, PartialEq)]
enum PathGoal {
    BusbarSection,
    AnyLiveTerminal,
}

/// Connection and disconnection.
impl Network {
    /// Connects the equipment's terminals, restricted to one side if given.
    ///
    /// For each selected terminal that is not yet connected, the cheapest
    /// path to a busbar section (fewest open switches, then fewest edges)
    /// whose open switches the filter accepts is chosen and its open
    /// switches are closed.  With `propagate`, paths may continue through
    /// branches into fictitious tee-point voltage levels.
    ///
    /// Returns `Ok(false)`, toggling nothing, when some selected terminal
    /// has no usable path or when no selected terminal needed work.
    pub fn connect(
        &mut self,
        equipment_id: &str,
        side: Option<Side>,
        filter: SwitchFilter,
        propagate: bool,
    ) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        let mut to_close: BTreeSet<String> = BTreeSet::new();
        let mut to_connect: Vec<Side> = Vec::new();

        for term_side in self.selected_sides(equipment_id, side)? {
            let terminal = match self.equipment(equipment_id)?.terminal(term_side) {
                Some(terminal) => terminal,
                None => continue,
            };
            if *terminal.connected.get(slot) {
                continue;
            }
            let (vl_id, node) = (terminal.voltage_level.clone(), terminal.node);
            let paths = self.find_paths(
                &vl_id,
                node,
                equipment_id,
                slot,
                propagate,
                PathGoal::BusbarSection,
            )?;

            let mut best: Option<(usize, usize, Vec<String>)> = None;
            'paths: for path in &paths {
                let mut opens = Vec::new();
                for switch_id in &path.switches {
                    let switch = self.switch(switch_id)?;
                    if *switch.open.get(slot) {
                        if !filter.matches(switch) {
                            continue 'paths;
                        }
                        opens.push(switch_id.clone());
                    }
                }
                let candidate = (opens.len(), path.edges, opens);
                if best
                    .as_ref()
                    .map_or(true, |b| (candidate.0, candidate.1) < (b.0, b.1))
                {
                    best = Some(candidate);
                }
            }
            match best {
                Some((_, _, opens)) => {
                    to_close.extend(opens);
                    to_connect.push(term_side);
                }
                None => {
                    debug!(equipment_id, side = %term_side, "no usable path to a busbar section");
                    return Ok(false);
                }
            }
        }

        if to_connect.is_empty() {
            return Ok(false);
        }
        for switch_id in &to_close {
            self.set_switch_open(switch_id, false)?;
        }
        for term_side in to_connect {
            self.set_terminal_connected(equipment_id, term_side, true)?;
        }
        Ok(true)
    }

    /// Disconnects the equipment's terminals, restricted to one side if
    /// given.
    ///
    /// Every path to a busbar section that still conducts must contribute
    /// its first filter-accepted switch; those switches are opened and the
    /// terminal's connected flag cleared.  Parallel paths through the same
    /// switch collapse into one toggle.
    ///
    /// Returns `Ok(false)`, toggling nothing, when some conducting path
    /// has no acceptable switch or when no selected terminal needed work.
    pub fn disconnect(
        &mut self,
        equipment_id: &str,
        side: Option<Side>,
        filter: SwitchFilter,
        propagate: bool,
    ) -> Result<bool, Error> {
        let slot = self.variants.working_slot()?;
        let mut to_open: BTreeSet<String> = BTreeSet::new();
        let mut to_disconnect: Vec<Side> = Vec::new();

        for term_side in self.selected_sides(equipment_id, side)? {
            let terminal = match self.equipment(equipment_id)?.terminal(term_side) {
                Some(terminal) => terminal,
                None => continue,
            };
            if !*terminal.connected.get(slot) {
                continue;
            }
            let (vl_id, node) = (terminal.voltage_level.clone(), terminal.node);
            let paths = self.find_paths(
                &vl_id,
                node,
                equipment_id,
                slot,
                propagate,
                PathGoal::AnyLiveTerminal,
            )?;

            'paths: for path in &paths {
                for switch_id in &path.switches {
                    if *self.switch(switch_id)?.open.get(slot) {
                        // Already broken by an open switch.
                        continue 'paths;
                    }
                }
                let breaking = path
                    .switches
                    .iter()
                    .find(|switch_id| {
                        self.switches
                            .get(switch_id.as_str())
                            .is_some_and(|switch| filter.matches(switch))
                    })
                    .cloned();
                match breaking {
                    Some(switch_id) => {
                        to_open.insert(switch_id);
                    }
                    None => {
                        debug!(equipment_id, side = %term_side, "conducting path with no acceptable switch");
                        return Ok(false);
                    }
                }
            }
            to_disconnect.push(term_side);
        }

        if to_disconnect.is_empty() {
            return Ok(false);
        }
        for switch_id in &to_open {
            self.set_switch_open(switch_id, true)?;
        }
        for term_side in to_disconnect {
            self.set_terminal_connected(equipment_id, term_side, false)?;
        }
        Ok(true)
    }

    /// The sides the operation applies to, validating an explicit side.
    fn selected_sides(&self, equipment_id: &str, side: Option<Side>) -> Result<Vec<Side>, Error> {
        let equipment = self.equipment(equipment_id)?;
        match side {
            Some(side) => {
                if equipment.terminal(side).is_none() {
                    return Err(Error::not_found(format!(
                        "Equipment '{}' has no terminal on side {}.",
                        equipment_id, side
                    )));
                }
                Ok(vec![side])
            }
            None => Ok(Side::first(equipment.terminals().len()).to_vec()),
        }
    }

    /// Enumerates all simple paths from a node to the goal nodes.
    ///
    /// A node carrying another equipment's non-busbar terminal ends the
    /// path (dead end when aiming for a busbar, completion when any live
    /// terminal counts); with `propagate`, such a terminal of a connected
    /// branch is instead crossed into or out of a fictitious voltage
    /// level.
    fn find_paths(
        &self,
        voltage_level: &str,
        node: usize,
        equipment_id: &str,
        slot: usize,
        propagate: bool,
        goal: PathGoal,
    ) -> Result<Vec<Path>, Error> {
        let mut paths = Vec::new();
        let mut visited = HashSet::new();
        visited.insert((voltage_level.to_string(), node));
        let mut current = Vec::new();
        self.path_search(
            voltage_level,
            node,
            equipment_id,
            slot,
            propagate,
            goal,
            &mut visited,
            &mut current,
            &mut paths,
        )?;
        Ok(paths)
    }

    #[allow(clippy::too_many_arguments)]
    fn path_search(
        &self,
        voltage_level: &str,
        node: usize,
        equipment_id: &str,
        slot: usize,
        propagate: bool,
        goal: PathGoal,
        visited: &mut HashSet<(String, usize)>,
        current: &mut Vec<Option<String>>,
        paths: &mut Vec<Path>,
    ) -> Result<(), Error> {
        let vl = self.voltage_level(voltage_level)?;
        for edge in vl.graph.edges(vl.nodes[node].index) {
            let next = vl.graph[if edge.source() == vl.nodes[node].index {
                edge.target()
            } else {
                edge.source()
            }];
            if visited.contains(&(voltage_level.to_string(), next)) {
                continue;
            }
            let step = match edge.weight() {
                TopologyEdge::Switch(id) => Some(id.clone()),
                TopologyEdge::InternalConnection => None,
            };

            match &vl.nodes[next].terminal {
                Some((other_id, other_side)) if other_id != equipment_id => {
                    let other = self.equipment(other_id)?;
                    let arrival_connected = other
                        .terminal(*other_side)
                        .is_some_and(|t| *t.connected.get(slot));
                    if other.kind().is_busbar_section() {
                        current.push(step);
                        paths.push(Path {
                            switches: current.iter().flatten().cloned().collect(),
                            edges: current.len(),
                        });
                        current.pop();
                        continue;
                    }
                    if propagate && other.kind().is_ac_branch() && arrival_connected {
                        current.push(step.clone());
                        visited.insert((voltage_level.to_string(), next));
                        for (i, far) in other.terminals().iter().enumerate() {
                            let far_side = Side::first(other.terminals().len())[i];
                            if far_side == *other_side || !*far.connected.get(slot) {
                                continue;
                            }
                            let far_key = (far.voltage_level().to_string(), far.node());
                            let crosses_tee = vl.is_fictitious()
                                || self.voltage_level(far.voltage_level())?.is_fictitious();
                            if !crosses_tee || visited.contains(&far_key) {
                                continue;
                            }
                            visited.insert(far_key.clone());
                            self.path_search(
                                far.voltage_level(),
                                far.node(),
                                other_id,
                                slot,
                                propagate,
                                goal,
                                visited,
                                current,
                                paths,
                            )?;
                            visited.remove(&far_key);
                        }
                        visited.remove(&(voltage_level.to_string(), next));
                        current.pop();
                    }
                    // A foreign terminal blocks the route to a busbar but
                    // is itself something to separate from, if it is live.
                    // That holds even when the search also hopped past it:
                    // the hop continuations do not replace this path.
                    if goal == PathGoal::AnyLiveTerminal && arrival_connected {
                        current.push(step);
                        paths.push(Path {
                            switches: current.iter().flatten().cloned().collect(),
                            edges: current.len(),
                        });
                        current.pop();
                    }
                }
                _ => {
                    current.push(step);
                    visited.insert((voltage_level.to_string(), next));
                    self.path_search(
                        voltage_level,
                        next,
                        equipment_id,
                        slot,
                        propagate,
                        goal,
                        visited,
                        current,
                        paths,
                    )?;
                    visited.remove(&(voltage_level.to_string(), next));
                    current.pop();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinds::EquipmentKind;
    use crate::network::test_util::feeder_bay;

    #[test]
    fn test_connect_closes_path_switches() -> Result<(), Error> {
        // Busbar at node 0, disconnector 0-1 (open), breaker 1-2 (open),
        // load at node 2, disconnected.
        let mut network = feeder_bay()?;

        assert!(network.connect("load1", None, SwitchFilter::Any, false)?);
        assert_eq!(network.is_switch_open("d1"), Ok(false));
        assert_eq!(network.is_switch_open("b1"), Ok(false));
        assert_eq!(network.is_terminal_connected("load1", Side::One), Ok(true));

        // A second connect is a no-op.
        assert!(!network.connect("load1", None, SwitchFilter::Any, false)?);
        Ok(())
    }

    #[test]
    fn test_connect_respects_filter() -> Result<(), Error> {
        let mut network = feeder_bay()?;

        // The open disconnector on the only path is refused.
        assert!(!network.connect("load1", None, SwitchFilter::BreakerOnly, false)?);
        assert_eq!(network.is_switch_open("d1"), Ok(true));
        assert_eq!(network.is_switch_open("b1"), Ok(true));
        assert_eq!(network.is_terminal_connected("load1", Side::One), Ok(false));

        // Pre-closing it leaves only the breaker to toggle.
        network.set_switch_open("d1", false)?;
        assert!(network.connect("load1", None, SwitchFilter::BreakerOnly, false)?);
        assert_eq!(network.is_switch_open("b1"), Ok(false));
        Ok(())
    }

    #[test]
    fn test_connect_prefers_fewest_open_switches() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 4)?;
        network.add_busbar_section("bbs1", "vl1", 0)?;
        // Two routes from the load at node 3: via node 1 with two open
        // switches, via node 2 with one.
        network.add_switch("a1", "vl1", SwitchKind::Breaker, 0, 1, true, false)?;
        network.add_switch("a2", "vl1", SwitchKind::Breaker, 1, 3, true, false)?;
        network.add_switch("b1", "vl1", SwitchKind::Breaker, 0, 2, true, false)?;
        network.add_internal_connection("vl1", 2, 3)?;
        network.add_injection("load1", EquipmentKind::Load, "vl1", 3)?;
        network.set_terminal_connected("load1", Side::One, false)?;

        assert!(network.connect("load1", None, SwitchFilter::Any, false)?);
        assert_eq!(network.is_switch_open("b1"), Ok(false));
        assert_eq!(network.is_switch_open("a1"), Ok(true));
        assert_eq!(network.is_switch_open("a2"), Ok(true));
        Ok(())
    }

    #[test]
    fn test_disconnect_opens_first_acceptable_switch() -> Result<(), Error> {
        let mut network = feeder_bay()?;
        assert!(network.connect("load1", None, SwitchFilter::Any, false)?);

        // Walking from the load, the breaker comes before the
        // disconnector.
        assert!(network.disconnect("load1", None, SwitchFilter::Any, false)?);
        assert_eq!(network.is_switch_open("b1"), Ok(true));
        assert_eq!(network.is_switch_open("d1"), Ok(false));
        assert_eq!(network.is_terminal_connected("load1", Side::One), Ok(false));

        // A second disconnect is a no-op.
        assert!(!network.disconnect("load1", None, SwitchFilter::Any, false)?);
        Ok(())
    }

    #[test]
    fn test_disconnect_diamond_is_atomic() -> Result<(), Error> {
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 3)?;
        network.add_busbar_section("bbs1", "vl1", 0)?;
        // Two parallel closed breakers between nodes 1 and 2.
        network.add_switch("d1", "vl1", SwitchKind::Disconnector, 0, 1, false, false)?;
        network.add_switch("p1", "vl1", SwitchKind::Breaker, 1, 2, false, false)?;
        network.add_switch("p2", "vl1", SwitchKind::Breaker, 1, 2, false, false)?;
        network.add_injection("load1", EquipmentKind::Load, "vl1", 2)?;

        assert!(network.disconnect("load1", None, SwitchFilter::BreakerOnly, false)?);
        assert_eq!(network.is_switch_open("p1"), Ok(true));
        assert_eq!(network.is_switch_open("p2"), Ok(true));
        assert_eq!(network.is_switch_open("d1"), Ok(false));
        Ok(())
    }

    #[test]
    fn test_disconnect_blocked_by_fictitious_switch() -> Result<(), Error> {
        // The line's only path out runs through a fictitious switch in a
        // fictitious tee-point voltage level; a non-fictitious filter must
        // refuse and leave everything untouched, even with propagation.
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_voltage_level("tee", None, 2)?;
        network.set_voltage_level_fictitious("tee", true)?;
        network.add_busbar_section("bbs1", "vl1", 0)?;
        network.add_internal_connection("vl1", 0, 1)?;
        network.add_line("l1", "vl1", 1, "tee", 0)?;
        network.add_switch("fs1", "tee", SwitchKind::Breaker, 0, 1, false, false)?;
        network.set_switch_fictitious("fs1", true)?;
        network.add_busbar_section("bbs2", "tee", 1)?;

        let blocked = network.disconnect("l1", Some(Side::Two), SwitchFilter::NonFictitious, true)?;
        assert!(!blocked);
        assert_eq!(network.is_switch_open("fs1"), Ok(false));
        assert_eq!(network.is_terminal_connected("l1", Side::Two), Ok(true));

        // An unrestricted filter may open it.
        assert!(network.disconnect("l1", Some(Side::Two), SwitchFilter::Any, true)?);
        assert_eq!(network.is_switch_open("fs1"), Ok(true));
        Ok(())
    }

    #[test]
    fn test_propagation_crosses_tee_point() -> Result<(), Error> {
        // The load's bay ends at a line into a fictitious tee point whose
        // far side reaches a busbar in another voltage level.
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_voltage_level("tee", None, 2)?;
        network.set_voltage_level_fictitious("tee", true)?;
        network.add_voltage_level("vl2", None, 2)?;
        network.add_injection("load1", EquipmentKind::Load, "vl1", 0)?;
        network.add_switch("s1", "vl1", SwitchKind::Breaker, 0, 1, false, false)?;
        network.add_line("l1", "vl1", 1, "tee", 0)?;
        network.add_internal_connection("tee", 0, 1)?;
        network.add_line("l2", "tee", 1, "vl2", 0)?;
        network.add_switch("s2", "vl2", SwitchKind::Breaker, 0, 1, false, false)?;
        network.add_busbar_section("bbs1", "vl2", 1)?;

        // Without propagation there is no busbar in reach; nothing to
        // disconnect against, the walk ends at the line terminal.
        assert!(network.disconnect("load1", None, SwitchFilter::BreakerOnly, false)?);
        assert_eq!(network.is_switch_open("s1"), Ok(true));

        network.set_switch_open("s1", false)?;
        network.set_terminal_connected("load1", Side::One, true)?;

        // With propagation the same call sees the full path through both
        // lines and still picks the nearest breaker.
        assert!(network.disconnect("load1", None, SwitchFilter::BreakerOnly, true)?);
        assert_eq!(network.is_switch_open("s1"), Ok(true));
        assert_eq!(network.is_switch_open("s2"), Ok(false));
        Ok(())
    }

    #[test]
    fn test_propagating_disconnect_severs_dead_end_tee() -> Result<(), Error> {
        // The line leads into a fictitious tee point with nothing behind
        // it.  Propagation finds no continuation there, but the closed
        // breaker towards the live line terminal must still be opened.
        let mut network = Network::new("root");
        network.add_voltage_level("vl1", None, 2)?;
        network.add_voltage_level("tee", None, 1)?;
        network.set_voltage_level_fictitious("tee", true)?;
        network.add_injection("load1", EquipmentKind::Load, "vl1", 0)?;
        network.add_switch("s1", "vl1", SwitchKind::Breaker, 0, 1, false, false)?;
        network.add_line("l1", "vl1", 1, "tee", 0)?;

        assert!(network.disconnect("load1", None, SwitchFilter::Any, true)?);
        assert_eq!(network.is_switch_open("s1"), Ok(true));
        assert_eq!(network.is_terminal_connected("load1", Side::One), Ok(false));
        Ok(())
    }

    #[test]
    fn test_side_out_of_range() {
        let mut network = feeder_bay().unwrap();
        assert_eq!(
            network.connect("load1", Some(Side::Two), SwitchFilter::Any, false),
            Err(Error::not_found(
                "Equipment 'load1' has no terminal on side 2."
            ))
        );
    }
}
