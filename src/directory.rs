//! Read-only lookups into the shipment, client and entity directories.
//!
//! The engine only uses these to decorate listings; it never writes to them.

use std::collections::HashMap;

use serde::Deserialize;

pub trait Directory {
    fn shipment_code(&self, shipment_ref: &str) -> Option<String>;
    fn client_name(&self, client_ref: &str) -> Option<String>;
    fn entity_name(&self, entity_ref: &str) -> Option<String>;
}

/// Directory backed by fixed maps, typically loaded from `tramita.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StaticDirectory {
    #[serde(default)]
    pub shipments: HashMap<String, String>,
    #[serde(default)]
    pub clients: HashMap<String, String>,
    #[serde(default)]
    pub entities: HashMap<String, String>,
}

impl Directory for StaticDirectory {
    fn shipment_code(&self, shipment_ref: &str) -> Option<String> {
        self.shipments.get(shipment_ref).cloned()
    }

    fn client_name(&self, client_ref: &str) -> Option<String> {
        self.clients.get(client_ref).cloned()
    }

    fn entity_name(&self, entity_ref: &str) -> Option<String> {
        self.entities.get(entity_ref).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_fall_through_to_none() {
        let directory: StaticDirectory = toml::from_str(
            r#"
            [shipments]
            "C-17" = "CARGA-2024-017"
            "#,
        )
        .unwrap();
        assert_eq!(
            directory.shipment_code("C-17").as_deref(),
            Some("CARGA-2024-017")
        );
        assert_eq!(directory.client_name("C-17"), None);
    }
}
