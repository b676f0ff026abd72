// License: MIT
// Copyright © 2024 Frequenz Energy-as-a-Service GmbH

//! This module contains the configuration options for the `Network`.

/// The default ID of the variant every network starts out with.
pub const INITIAL_VARIANT_ID: &str = "InitialVariant";

/// Configuration options for the `Network`.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// The ID given to the variant that exists when the network is created.
    /// This variant occupies slot 0 and can never be removed.
    pub initial_variant_id: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            initial_variant_id: INITIAL_VARIANT_ID.to_string(),
        }
    }
}
