// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! The identifier index: a flat map from string ID to the kind of the
//! owning item, scoped to one root network.

use std::collections::HashMap;
use std::fmt::Display;

use crate::kinds::EquipmentKind;
use crate::Error;

/// The kind of item an identifier resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemKind {
    VoltageLevel,
    Switch,
    DcNode,
    DcSwitch,
    Subnetwork,
    Equipment(EquipmentKind),
}

impl Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemKind::VoltageLevel => write!(f, "VoltageLevel"),
            ItemKind::Switch => write!(f, "Switch"),
            ItemKind::DcNode => write!(f, "DcNode"),
            ItemKind::DcSwitch => write!(f, "DcSwitch"),
            ItemKind::Subnetwork => write!(f, "Subnetwork"),
            ItemKind::Equipment(kind) => write!(f, "{}", kind),
        }
    }
}

/// Identifier uniqueness is enforced here, across all item kinds of one
/// root network.
#[derive(Debug, Default)]
pub(crate) struct NetworkIndex {
    by_id: HashMap<String, ItemKind>,
}

impl NetworkIndex {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn check_and_add(&mut self, id: &str, kind: ItemKind) -> Result<(), Error> {
        if let Some(existing) = self.by_id.get(id) {
            return Err(Error::structural_violation(format!(
                "The network already contains an object ({}) with the ID '{}'.",
                existing, id
            )));
        }
        self.by_id.insert(id.to_string(), kind);
        Ok(())
    }

    pub(crate) fn remove(&mut self, id: &str) {
        self.by_id.remove(id);
    }

    pub(crate) fn kind_of(&self, id: &str) -> Option<ItemKind> {
        self.by_id.get(id).copied()
    }
}
