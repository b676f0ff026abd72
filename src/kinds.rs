// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module defines the closed enumerations describing the kinds of
//! switches and equipment the topology core knows about, and the sides of
//! multi-terminal equipment.

use std::fmt::Display;

/// Represents the kind of a switch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Breaker,
    Disconnector,
    LoadBreakSwitch,
}

impl Display for SwitchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchKind::Breaker => write!(f, "Breaker"),
            SwitchKind::Disconnector => write!(f, "Disconnector"),
            SwitchKind::LoadBreakSwitch => write!(f, "LoadBreakSwitch"),
        }
    }
}

/// Represents the kind of an equipment.
///
/// The enumeration is closed on purpose: topology code matches on it
/// exhaustively instead of dispatching through per-kind interfaces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EquipmentKind {
    BusbarSection,
    Ground,
    Load,
    Generator,
    ShuntCompensator,
    Line,
    TieLine,
    ThreeWindingsTransformer,
    DcLine,
    AcDcConverter,
}

impl Display for EquipmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EquipmentKind::BusbarSection => write!(f, "BusbarSection"),
            EquipmentKind::Ground => write!(f, "Ground"),
            EquipmentKind::Load => write!(f, "Load"),
            EquipmentKind::Generator => write!(f, "Generator"),
            EquipmentKind::ShuntCompensator => write!(f, "ShuntCompensator"),
            EquipmentKind::Line => write!(f, "Line"),
            EquipmentKind::TieLine => write!(f, "TieLine"),
            EquipmentKind::ThreeWindingsTransformer => write!(f, "ThreeWindingsTransformer"),
            EquipmentKind::DcLine => write!(f, "DcLine"),
            EquipmentKind::AcDcConverter => write!(f, "AcDcConverter"),
        }
    }
}

/// The side of a terminal on a multi-terminal equipment.
///
/// Single-terminal equipment only ever uses [`Side::One`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Side {
    One,
    Two,
    Three,
}

impl Side {
    /// The sides of an equipment with the given number of terminals, in
    /// order.
    pub(crate) fn first(count: usize) -> &'static [Side] {
        match count {
            0 => &[],
            1 => &[Side::One],
            2 => &[Side::One, Side::Two],
            _ => &[Side::One, Side::Two, Side::Three],
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Side::One => 0,
            Side::Two => 1,
            Side::Three => 2,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::One => write!(f, "1"),
            Side::Two => write!(f, "2"),
            Side::Three => write!(f, "3"),
        }
    }
}

/// Predicates for checking the kind of an equipment.
pub(crate) trait KindPredicates {
    fn kind(&self) -> EquipmentKind;

    fn is_busbar_section(&self) -> bool {
        self.kind() == EquipmentKind::BusbarSection
    }

    /// AC branches join the buses of their terminals within the connected
    /// and synchronous partitions.
    fn is_ac_branch(&self) -> bool {
        matches!(
            self.kind(),
            EquipmentKind::Line | EquipmentKind::TieLine | EquipmentKind::ThreeWindingsTransformer
        )
    }

    fn is_injection(&self) -> bool {
        matches!(
            self.kind(),
            EquipmentKind::Ground
                | EquipmentKind::Load
                | EquipmentKind::Generator
                | EquipmentKind::ShuntCompensator
        )
    }

    fn is_dc_line(&self) -> bool {
        self.kind() == EquipmentKind::DcLine
    }

    fn is_converter(&self) -> bool {
        self.kind() == EquipmentKind::AcDcConverter
    }

    /// Tie lines are owned by the root network and are the only equipment
    /// allowed to span two subnetworks.
    fn may_span_subnetworks(&self) -> bool {
        self.kind() == EquipmentKind::TieLine
    }
}

impl KindPredicates for EquipmentKind {
    fn kind(&self) -> EquipmentKind {
        *self
    }
}
