use std::collections::HashMap;

use grantshift_core::{AppError, AppResult};

use crate::{FutureGrantRecord, GrantCategory, GrantRecord, Role, UserDefinition};

/// The transitive role closure of one target database.
///
/// Roles keep discovery order; lookups go through a name index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRoleSet {
    database: String,
    seed_role: String,
    roles: Vec<Role>,
    index: HashMap<String, usize>,
    users: Vec<UserDefinition>,
}

impl ProjectRoleSet {
    /// Creates an empty set for a database and its owning role.
    #[must_use]
    pub fn new(database: impl Into<String>, seed_role: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            seed_role: seed_role.into(),
            roles: Vec::new(),
            index: HashMap::new(),
            users: Vec::new(),
        }
    }

    /// Returns the target database.
    #[must_use]
    pub fn database(&self) -> &str {
        self.database.as_str()
    }

    /// Returns the role owning the target database.
    #[must_use]
    pub fn seed_role(&self) -> &str {
        self.seed_role.as_str()
    }

    /// Adds a role; names are unique within a set.
    pub fn insert_role(&mut self, role: Role) -> AppResult<()> {
        if self.index.contains_key(role.name()) {
            return Err(AppError::Validation(format!(
                "role '{}' is already part of project '{}'",
                role.name(),
                self.database
            )));
        }

        self.index.insert(role.name().to_owned(), self.roles.len());
        self.roles.push(role);
        Ok(())
    }

    /// Returns a role by name.
    #[must_use]
    pub fn role(&self, name: &str) -> Option<&Role> {
        self.index.get(name).and_then(|index| self.roles.get(*index))
    }

    /// Returns a mutable role by name.
    pub fn role_mut(&mut self, name: &str) -> Option<&mut Role> {
        self.index
            .get(name)
            .copied()
            .and_then(|index| self.roles.get_mut(index))
    }

    /// Returns true when the role belongs to the set.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterates roles in discovery order.
    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.iter()
    }

    /// Returns the number of roles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roles.len()
    }

    /// Returns true when no role was discovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Adds an owned user once.
    pub fn add_user(&mut self, user: UserDefinition) {
        if self.users.iter().any(|known| known.name() == user.name()) {
            return;
        }
        self.users.push(user);
    }

    /// Returns owned users in discovery order.
    #[must_use]
    pub fn users(&self) -> &[UserDefinition] {
        &self.users
    }

    /// Returns grants of one category across all roles, in discovery order.
    pub fn grants_in(&self, category: GrantCategory) -> impl Iterator<Item = &GrantRecord> {
        self.roles
            .iter()
            .flat_map(move |role| role.grants().in_category(category).iter())
    }

    /// Returns future table rules across all roles.
    pub fn future_table_grants(&self) -> impl Iterator<Item = &FutureGrantRecord> {
        self.roles
            .iter()
            .flat_map(|role| role.future_grants().table().iter())
    }

    /// Returns future rules on non-table classes across all roles.
    pub fn future_other_grants(&self) -> impl Iterator<Item = &FutureGrantRecord> {
        self.roles
            .iter()
            .flat_map(|role| role.future_grants().other().iter())
    }
}
