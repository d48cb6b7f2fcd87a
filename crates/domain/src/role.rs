use std::collections::BTreeMap;

use grantshift_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{FutureGrantRecord, GrantCategory, GrantRecord};

/// Suffix pattern of short-lived workspace roles: `<PREFIX>_WORKSPACE_<digits>`.
const WORKSPACE_MARKER: &str = "_WORKSPACE_";

/// Returns true for workspace roles, which discovery never expands.
#[must_use]
pub fn is_workspace_role(name: &str) -> bool {
    name.rfind(WORKSPACE_MARKER).is_some_and(|index| {
        let suffix = &name[index + WORKSPACE_MARKER.len()..];
        !suffix.is_empty() && suffix.chars().all(|character| character.is_ascii_digit())
    })
}

/// A role's grants partitioned by object class.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleGrants {
    by_category: BTreeMap<GrantCategory, Vec<GrantRecord>>,
}

impl RoleGrants {
    /// Partitions records, keeping enumeration order within each category.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = GrantRecord>) -> Self {
        let mut by_category: BTreeMap<GrantCategory, Vec<GrantRecord>> = BTreeMap::new();
        for record in records {
            by_category.entry(record.category()).or_default().push(record);
        }

        Self { by_category }
    }

    /// Returns grants of one category.
    #[must_use]
    pub fn in_category(&self, category: GrantCategory) -> &[GrantRecord] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterates all grants, category by category in replay order.
    pub fn iter(&self) -> impl Iterator<Item = &GrantRecord> {
        self.by_category.values().flatten()
    }

    /// Returns the total number of grants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    /// Returns true when the role has no grants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A role's future grants, split into table rules and everything else.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleFutureGrants {
    table: Vec<FutureGrantRecord>,
    other: Vec<FutureGrantRecord>,
}

impl RoleFutureGrants {
    /// Partitions future grant records.
    #[must_use]
    pub fn from_records(records: impl IntoIterator<Item = FutureGrantRecord>) -> Self {
        let (table, other) = records
            .into_iter()
            .partition(FutureGrantRecord::is_table_rule);

        Self { table, other }
    }

    /// Returns rules on future tables.
    #[must_use]
    pub fn table(&self) -> &[FutureGrantRecord] {
        &self.table
    }

    /// Returns rules on other future object classes.
    #[must_use]
    pub fn other(&self) -> &[FutureGrantRecord] {
        &self.other
    }

    /// Iterates all rules.
    pub fn iter(&self) -> impl Iterator<Item = &FutureGrantRecord> {
        self.table.iter().chain(self.other.iter())
    }
}

/// A discovered role with its lazily attached grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    name: String,
    owner: String,
    grants: RoleGrants,
    future_grants: RoleFutureGrants,
    grants_attached: bool,
    future_grants_attached: bool,
}

impl Role {
    /// Creates a role without grants.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            grants: RoleGrants::default(),
            future_grants: RoleFutureGrants::default(),
            grants_attached: false,
            future_grants_attached: false,
        }
    }

    /// Returns the role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the owning role.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Attaches grants once; every grant must be given to this role.
    pub fn attach_grants(&mut self, grants: RoleGrants) -> AppResult<()> {
        if self.grants_attached {
            return Err(AppError::Validation(format!(
                "grants are already attached to role '{}'",
                self.name
            )));
        }

        if let Some(foreign) = grants
            .iter()
            .find(|grant| grant.grantee_name() != self.name)
        {
            return Err(AppError::Validation(format!(
                "grant '{foreign}' is not assigned to role '{}'",
                self.name
            )));
        }

        self.grants = grants;
        self.grants_attached = true;
        Ok(())
    }

    /// Attaches future grants once; every rule must be given to this role.
    pub fn attach_future_grants(&mut self, future_grants: RoleFutureGrants) -> AppResult<()> {
        if self.future_grants_attached {
            return Err(AppError::Validation(format!(
                "future grants are already attached to role '{}'",
                self.name
            )));
        }

        if let Some(foreign) = future_grants
            .iter()
            .find(|grant| grant.grantee_name() != self.name)
        {
            return Err(AppError::Validation(format!(
                "future grant '{foreign}' is not assigned to role '{}'",
                self.name
            )));
        }

        self.future_grants = future_grants;
        self.future_grants_attached = true;
        Ok(())
    }

    /// Returns attached grants, empty before attachment.
    #[must_use]
    pub fn grants(&self) -> &RoleGrants {
        &self.grants
    }

    /// Returns attached future grants, empty before attachment.
    #[must_use]
    pub fn future_grants(&self) -> &RoleFutureGrants {
        &self.future_grants
    }

    /// Returns true once grants were attached.
    #[must_use]
    pub fn has_grants(&self) -> bool {
        self.grants_attached
    }

    /// Returns the warehouses this role may use, in grant order.
    #[must_use]
    pub fn usable_warehouses(&self) -> Vec<&str> {
        self.grants()
            .in_category(GrantCategory::Warehouse)
            .iter()
            .filter(|grant| grant.is_warehouse_usage())
            .map(GrantRecord::object_name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, RoleFutureGrants, RoleGrants, is_workspace_role};
    use crate::{FutureGrantRecord, GrantCategory, GrantRecord, GrantedOn, GranteeKind};

    fn grant(on: GrantedOn, name: &str, grantee: &str) -> GrantRecord {
        GrantRecord::new("USAGE", on, name, GranteeKind::Role, grantee, false, "SALES_ROLE")
    }

    #[test]
    fn grants_are_partitioned_in_replay_order() {
        let grants = RoleGrants::from_records([
            grant(GrantedOn::Warehouse, "WH_SMALL", "SALES_RO"),
            grant(GrantedOn::Database, "SALES", "SALES_RO"),
            grant(GrantedOn::Account, "ACCT", "SALES_RO"),
        ]);

        let order: Vec<_> = grants.iter().map(GrantRecord::category).collect();
        assert_eq!(
            order,
            [
                GrantCategory::Account,
                GrantCategory::Database,
                GrantCategory::Warehouse
            ]
        );
        assert_eq!(grants.in_category(GrantCategory::Table).len(), 0);
    }

    #[test]
    fn attach_rejects_foreign_grantee() {
        let mut role = Role::new("SALES_RO", "SALES_ROLE");
        let result = role.attach_grants(RoleGrants::from_records([grant(
            GrantedOn::Database,
            "SALES",
            "OTHER_ROLE",
        )]));
        assert!(result.is_err());
        assert!(!role.has_grants());
    }

    #[test]
    fn attach_happens_once() {
        let mut role = Role::new("SALES_RO", "SALES_ROLE");
        assert!(role.attach_grants(RoleGrants::default()).is_ok());
        assert!(role.attach_grants(RoleGrants::default()).is_err());

        let future = FutureGrantRecord::new(
            "SELECT",
            "TABLE",
            "SALES.PUBLIC.<TABLE>",
            GranteeKind::Role,
            "SALES_RO",
            false,
        );
        assert!(
            role.attach_future_grants(RoleFutureGrants::from_records([future]))
                .is_ok()
        );
        assert_eq!(role.future_grants().table().len(), 1);
    }

    #[test]
    fn usable_warehouses_follow_grant_order() {
        let mut role = Role::new("SALES_RO", "SALES_ROLE");
        let attached = role.attach_grants(RoleGrants::from_records([
            grant(GrantedOn::Warehouse, "WH_LARGE", "SALES_RO"),
            grant(GrantedOn::Warehouse, "WH_SMALL", "SALES_RO"),
        ]));
        assert!(attached.is_ok());
        assert_eq!(role.usable_warehouses(), ["WH_LARGE", "WH_SMALL"]);
    }

    #[test]
    fn workspace_roles_need_numeric_suffix() {
        assert!(is_workspace_role("SAPI_WORKSPACE_941797557"));
        assert!(!is_workspace_role("SAPI_WORKSPACE_"));
        assert!(!is_workspace_role("SALES_WORKSPACE_RO"));
    }
}
