use std::fmt::{Debug, Formatter};

use grantshift_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::MetadataRow;

/// User properties copied from the source account, in statement order.
pub const COPIED_USER_PROPERTIES: &[&str] = &[
    "default_secondary_roles",
    "default_role",
    "default_namespace",
    "default_warehouse",
    "display_name",
    "login_name",
];

/// Length of generated user passwords.
pub const GENERATED_PASSWORD_LENGTH: usize = 32;

/// A user owned by a project role, ready to be recreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDefinition {
    name: String,
    owner: String,
    properties: Vec<(String, String)>,
}

impl UserDefinition {
    /// Creates a user definition.
    #[must_use]
    pub fn new(name: impl Into<String>, owner: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            owner: owner.into(),
            properties: Vec::new(),
        }
    }

    /// Builds a definition from a `SHOW USERS` row, keeping only copied properties.
    pub fn from_row(row: &MetadataRow, owner: impl Into<String>) -> AppResult<Self> {
        let properties = COPIED_USER_PROPERTIES
            .iter()
            .filter_map(|property| {
                row.get(property)
                    .filter(|value| !value.is_empty())
                    .map(|value| ((*property).to_uppercase(), value.to_owned()))
            })
            .collect();

        Ok(Self {
            name: row.require("name")?.to_owned(),
            owner: owner.into(),
            properties,
        })
    }

    /// Returns the user name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the role that owns the user.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.owner.as_str()
    }

    /// Returns copied properties as upper-case name/value pairs.
    #[must_use]
    pub fn properties(&self) -> &[(String, String)] {
        &self.properties
    }
}

/// A user password that never appears in debug output or logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Password(String);

impl Password {
    /// Wraps a password value.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(AppError::Validation("password must not be empty".to_owned()));
        }

        Ok(Self(value))
    }

    /// Returns the secret value for statement rendering.
    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl Debug for Password {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str("Password(<redacted>)")
    }
}
