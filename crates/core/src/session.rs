use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// The three warehouse accounts a migration talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    /// Account the project is migrated from.
    Source,
    /// Intermediate account in the destination region, used for cross-region replication.
    Migration,
    /// Account the project is migrated to.
    Destination,
}

impl AccountKind {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Migration => "migration",
            Self::Destination => "destination",
        }
    }
}

impl Display for AccountKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Role, warehouse and namespace currently active for a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    current_role: Option<String>,
    current_warehouse: Option<String>,
    current_database: Option<String>,
    current_schema: Option<String>,
}

impl SessionContext {
    /// Creates a context with a known role and warehouse.
    #[must_use]
    pub fn new(current_role: Option<String>, current_warehouse: Option<String>) -> Self {
        Self {
            current_role,
            current_warehouse,
            current_database: None,
            current_schema: None,
        }
    }

    /// Returns the active role, if known.
    #[must_use]
    pub fn current_role(&self) -> Option<&str> {
        self.current_role.as_deref()
    }

    /// Returns the active warehouse, if known.
    #[must_use]
    pub fn current_warehouse(&self) -> Option<&str> {
        self.current_warehouse.as_deref()
    }

    /// Returns the active database, if any.
    #[must_use]
    pub fn current_database(&self) -> Option<&str> {
        self.current_database.as_deref()
    }

    /// Returns the active schema, if any.
    #[must_use]
    pub fn current_schema(&self) -> Option<&str> {
        self.current_schema.as_deref()
    }

    /// Returns true when the given role is already active.
    #[must_use]
    pub fn is_role_active(&self, role: &str) -> bool {
        self.current_role.as_deref() == Some(role)
    }

    /// Returns a copy with a different active role.
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.current_role = Some(role.into());
        self
    }

    /// Returns a copy with a different active warehouse.
    #[must_use]
    pub fn with_warehouse(mut self, warehouse: impl Into<String>) -> Self {
        self.current_warehouse = Some(warehouse.into());
        self
    }

    /// Returns a copy with a different active database and no schema.
    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.current_database = Some(database.into());
        self.current_schema = None;
        self
    }

    /// Returns a copy with a different active schema.
    #[must_use]
    pub fn with_schema(mut self, database: impl Into<String>, schema: impl Into<String>) -> Self {
        self.current_database = Some(database.into());
        self.current_schema = Some(schema.into());
        self
    }

    /// Forgets the cached context, e.g. after the underlying session was reset.
    pub fn reset(&mut self) {
        self.current_role = None;
        self.current_warehouse = None;
        self.current_database = None;
        self.current_schema = None;
    }
}
