use grantshift_core::AppResult;

use super::Session;

/// Outcome of picking a warehouse for a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarehouseSelection {
    /// A warehouse was chosen and activated.
    Selected(String),
    /// The role has no usable warehouse.
    Unavailable,
}

impl Session {
    /// Records that a role may use a warehouse.
    pub fn record_warehouse_usage(&mut self, role: &str, warehouse: &str) {
        let warehouses = self.role_warehouses.entry(role.to_owned()).or_default();
        if !warehouses.iter().any(|known| known == warehouse) {
            warehouses.push(warehouse.to_owned());
        }
    }

    /// Returns warehouses a role may use, in the order they were granted.
    #[must_use]
    pub fn usable_warehouses(&self, role: &str) -> &[String] {
        self.role_warehouses
            .get(role)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Picks a warehouse for a role, preferring one whose name ends with the size suffix.
    #[must_use]
    pub fn select_warehouse(&self, role: &str, size_suffix: &str) -> WarehouseSelection {
        let warehouses = self.usable_warehouses(role);
        let suffix = size_suffix.to_uppercase();

        warehouses
            .iter()
            .find(|warehouse| !suffix.is_empty() && warehouse.to_uppercase().ends_with(&suffix))
            .or_else(|| warehouses.first())
            .map_or(WarehouseSelection::Unavailable, |warehouse| {
                WarehouseSelection::Selected(warehouse.clone())
            })
    }

    /// Picks and activates a warehouse for a role.
    pub async fn use_warehouse_for(
        &mut self,
        role: &str,
        size_suffix: &str,
    ) -> AppResult<WarehouseSelection> {
        let selection = self.select_warehouse(role, size_suffix);
        if let WarehouseSelection::Selected(warehouse) = &selection {
            self.use_warehouse(warehouse).await?;
        }

        Ok(selection)
    }
}
