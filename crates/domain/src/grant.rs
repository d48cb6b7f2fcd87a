use std::fmt::{Display, Formatter};
use std::str::FromStr;

use grantshift_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::{MetadataRow, ObjectName};

/// Privilege that designates the controlling role of an object.
pub const OWNERSHIP: &str = "OWNERSHIP";

/// Privilege that allows using an object such as a warehouse or a role.
pub const USAGE: &str = "USAGE";

/// Prefix of personal per-user objects that are never migrated.
const PERSONAL_USER_OBJECT_PREFIX: &str = "USER$";

/// Object class a grant applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantedOn {
    /// Account-level privilege.
    Account,
    /// Database object.
    Database,
    /// Schema object.
    Schema,
    /// Table object.
    Table,
    /// Role object.
    Role,
    /// User object.
    User,
    /// Warehouse object.
    Warehouse,
    /// View object.
    View,
    /// User-defined function.
    Function,
    /// Stored procedure.
    Procedure,
    /// Any other object class, kept with its reported keyword.
    Other(String),
}

impl GrantedOn {
    /// Parses the keyword reported in the `granted_on` column.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "ACCOUNT" => Self::Account,
            "DATABASE" => Self::Database,
            "SCHEMA" => Self::Schema,
            "TABLE" => Self::Table,
            "ROLE" => Self::Role,
            "USER" => Self::User,
            "WAREHOUSE" => Self::Warehouse,
            "VIEW" => Self::View,
            "FUNCTION" => Self::Function,
            "PROCEDURE" => Self::Procedure,
            other => Self::Other(other.to_owned()),
        }
    }

    /// Returns the statement keyword for this object class.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Account => "ACCOUNT",
            Self::Database => "DATABASE",
            Self::Schema => "SCHEMA",
            Self::Table => "TABLE",
            Self::Role => "ROLE",
            Self::User => "USER",
            Self::Warehouse => "WAREHOUSE",
            Self::View => "VIEW",
            Self::Function => "FUNCTION",
            Self::Procedure => "PROCEDURE",
            Self::Other(keyword) => keyword.as_str(),
        }
    }

    /// Returns the partition this object class is stored under.
    #[must_use]
    pub fn category(&self) -> GrantCategory {
        match self {
            Self::Account => GrantCategory::Account,
            Self::Database => GrantCategory::Database,
            Self::Schema => GrantCategory::Schema,
            Self::Table => GrantCategory::Table,
            Self::Role => GrantCategory::Role,
            Self::Warehouse => GrantCategory::Warehouse,
            Self::User => GrantCategory::User,
            Self::View => GrantCategory::View,
            Self::Function => GrantCategory::Function,
            Self::Procedure => GrantCategory::Procedure,
            Self::Other(_) => GrantCategory::Other,
        }
    }
}

impl Display for GrantedOn {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Partition of a role's grants, declared in replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantCategory {
    /// Account-level grants.
    Account,
    /// Grants on databases.
    Database,
    /// Grants on schemas.
    Schema,
    /// Grants on tables.
    Table,
    /// Grants on roles.
    Role,
    /// Grants on warehouses.
    Warehouse,
    /// Grants on users.
    User,
    /// Grants on views.
    View,
    /// Grants on functions.
    Function,
    /// Grants on procedures.
    Procedure,
    /// Grants on any other object class.
    Other,
}

impl GrantCategory {
    /// Returns all categories in replay order.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[GrantCategory] = &[
            GrantCategory::Account,
            GrantCategory::Database,
            GrantCategory::Schema,
            GrantCategory::Table,
            GrantCategory::Role,
            GrantCategory::Warehouse,
            GrantCategory::User,
            GrantCategory::View,
            GrantCategory::Function,
            GrantCategory::Procedure,
            GrantCategory::Other,
        ];

        ALL
    }
}

/// Kind of principal a grant is given to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GranteeKind {
    /// Grant to a role.
    Role,
    /// Grant to a user.
    User,
}

impl GranteeKind {
    /// Returns the statement keyword.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Role => "ROLE",
            Self::User => "USER",
        }
    }
}

impl FromStr for GranteeKind {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "ROLE" => Ok(Self::Role),
            "USER" => Ok(Self::User),
            _ => Err(AppError::Validation(format!(
                "unsupported grantee kind '{value}'"
            ))),
        }
    }
}

impl Display for GranteeKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Immutable descriptor of one access grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrantRecord {
    privilege: String,
    granted_on: GrantedOn,
    object_name: String,
    granted_to: GranteeKind,
    grantee_name: String,
    grant_option: bool,
    granted_by: String,
}

impl GrantRecord {
    /// Creates a grant record.
    #[must_use]
    pub fn new(
        privilege: impl Into<String>,
        granted_on: GrantedOn,
        object_name: impl Into<String>,
        granted_to: GranteeKind,
        grantee_name: impl Into<String>,
        grant_option: bool,
        granted_by: impl Into<String>,
    ) -> Self {
        Self {
            privilege: privilege.into().trim().to_uppercase(),
            granted_on,
            object_name: object_name.into(),
            granted_to,
            grantee_name: grantee_name.into(),
            grant_option,
            granted_by: granted_by.into(),
        }
    }

    /// Builds a record from a `SHOW GRANTS` row.
    pub fn from_row(row: &MetadataRow) -> AppResult<Self> {
        Ok(Self::new(
            row.require("privilege")?,
            GrantedOn::parse(row.require("granted_on")?),
            row.require("name")?,
            row.require("granted_to")?.parse()?,
            row.require("grantee_name")?,
            parse_flag(row.get("grant_option")),
            row.get("granted_by").unwrap_or_default(),
        ))
    }

    /// Returns the privilege keyword.
    #[must_use]
    pub fn privilege(&self) -> &str {
        self.privilege.as_str()
    }

    /// Returns the object class.
    #[must_use]
    pub fn granted_on(&self) -> &GrantedOn {
        &self.granted_on
    }

    /// Returns the object name as reported by metadata.
    #[must_use]
    pub fn object_name(&self) -> &str {
        self.object_name.as_str()
    }

    /// Returns the grantee kind.
    #[must_use]
    pub fn granted_to(&self) -> GranteeKind {
        self.granted_to
    }

    /// Returns the grantee name.
    #[must_use]
    pub fn grantee_name(&self) -> &str {
        self.grantee_name.as_str()
    }

    /// Returns true when the grantee may grant the privilege further.
    #[must_use]
    pub fn grant_option(&self) -> bool {
        self.grant_option
    }

    /// Returns the grantor role, empty for system grants.
    #[must_use]
    pub fn granted_by(&self) -> &str {
        self.granted_by.as_str()
    }

    /// Returns true for `OWNERSHIP` grants.
    #[must_use]
    pub fn is_ownership(&self) -> bool {
        self.privilege == OWNERSHIP
    }

    /// Returns true for `USAGE` on a warehouse.
    #[must_use]
    pub fn is_warehouse_usage(&self) -> bool {
        self.privilege == USAGE && self.granted_on == GrantedOn::Warehouse
    }

    /// Returns true for grants on personal `USER$` objects.
    #[must_use]
    pub fn is_personal_user_object(&self) -> bool {
        self.object_name.starts_with(PERSONAL_USER_OBJECT_PREFIX)
    }

    /// Returns true when the grantor itself receives ownership, so creating the
    /// object under the grantor already establishes it.
    #[must_use]
    pub fn is_self_granted_ownership(&self) -> bool {
        self.is_ownership() && self.grantee_name == self.granted_by
    }

    /// Returns the partition the grant belongs to.
    #[must_use]
    pub fn category(&self) -> GrantCategory {
        self.granted_on.category()
    }

    /// Parses the object name into its parts.
    pub fn parsed_name(&self) -> AppResult<ObjectName> {
        ObjectName::parse(&self.object_name)
    }

    /// Returns a copy issued under a different grantor.
    #[must_use]
    pub fn with_granted_by(&self, granted_by: impl Into<String>) -> Self {
        Self {
            granted_by: granted_by.into(),
            ..self.clone()
        }
    }
}

impl Display for GrantRecord {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} on {} {} to {} {} (granted by {})",
            self.privilege,
            self.granted_on,
            self.object_name,
            self.granted_to,
            self.grantee_name,
            if self.granted_by.is_empty() {
                "<system>"
            } else {
                self.granted_by.as_str()
            }
        )
    }
}

/// A grant rule applied to future objects of one class within a schema or database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FutureGrantRecord {
    privilege: String,
    grant_on: String,
    container_name: String,
    grant_to: GranteeKind,
    grantee_name: String,
    grant_option: bool,
}

impl FutureGrantRecord {
    /// Creates a future grant, stripping a trailing `.<KIND>` marker from the name.
    #[must_use]
    pub fn new(
        privilege: impl Into<String>,
        grant_on: impl Into<String>,
        name: &str,
        grant_to: GranteeKind,
        grantee_name: impl Into<String>,
        grant_option: bool,
    ) -> Self {
        Self {
            privilege: privilege.into().trim().to_uppercase(),
            grant_on: grant_on.into().trim().to_uppercase(),
            container_name: strip_class_marker(name).to_owned(),
            grant_to,
            grantee_name: grantee_name.into(),
            grant_option,
        }
    }

    /// Builds a record from a `SHOW FUTURE GRANTS` row.
    pub fn from_row(row: &MetadataRow) -> AppResult<Self> {
        Ok(Self::new(
            row.require("privilege")?,
            row.require("grant_on")?,
            row.require("name")?,
            row.require("grant_to")?.parse()?,
            row.require("grantee_name")?,
            parse_flag(row.get("grant_option")),
        ))
    }

    /// Returns the privilege keyword.
    #[must_use]
    pub fn privilege(&self) -> &str {
        self.privilege.as_str()
    }

    /// Returns the future object class, e.g. `TABLE`.
    #[must_use]
    pub fn grant_on(&self) -> &str {
        self.grant_on.as_str()
    }

    /// Returns the plural keyword used in statements, e.g. `TABLES`.
    #[must_use]
    pub fn plural_kind(&self) -> String {
        format!("{}S", self.grant_on)
    }

    /// Returns the schema or database name the rule is scoped to.
    #[must_use]
    pub fn container_name(&self) -> &str {
        self.container_name.as_str()
    }

    /// Returns the grantee kind.
    #[must_use]
    pub fn grant_to(&self) -> GranteeKind {
        self.grant_to
    }

    /// Returns the grantee name.
    #[must_use]
    pub fn grantee_name(&self) -> &str {
        self.grantee_name.as_str()
    }

    /// Returns true when the grantee may grant the privilege further.
    #[must_use]
    pub fn grant_option(&self) -> bool {
        self.grant_option
    }

    /// Returns true for rules on future tables.
    #[must_use]
    pub fn is_table_rule(&self) -> bool {
        self.grant_on == "TABLE"
    }

    /// Parses the container into its parts.
    pub fn parsed_container(&self) -> AppResult<ObjectName> {
        ObjectName::parse(&self.container_name)
    }
}

impl Display for FutureGrantRecord {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "{} on future {} in {} to {} {}",
            self.privilege,
            self.plural_kind(),
            self.container_name,
            self.grant_to,
            self.grantee_name
        )
    }
}

/// A role granted to a user, as reported by `SHOW GRANTS TO USER`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGrantRecord {
    role: String,
    granted_to: GranteeKind,
    grantee_name: String,
    granted_by: Option<String>,
}

impl UserGrantRecord {
    /// Creates a user grant record.
    #[must_use]
    pub fn new(
        role: impl Into<String>,
        grantee_name: impl Into<String>,
        granted_by: Option<String>,
    ) -> Self {
        Self {
            role: role.into(),
            granted_to: GranteeKind::User,
            grantee_name: grantee_name.into(),
            granted_by: granted_by.filter(|value| !value.is_empty()),
        }
    }

    /// Builds a record from a `SHOW GRANTS TO USER` row.
    pub fn from_row(row: &MetadataRow) -> AppResult<Self> {
        Ok(Self {
            role: row.require("role")?.to_owned(),
            granted_to: row.get("granted_to").unwrap_or("USER").parse()?,
            grantee_name: row.require("grantee_name")?.to_owned(),
            granted_by: row
                .get("granted_by")
                .filter(|value| !value.is_empty())
                .map(str::to_owned),
        })
    }

    /// Returns the granted role.
    #[must_use]
    pub fn role(&self) -> &str {
        self.role.as_str()
    }

    /// Returns the grantee kind.
    #[must_use]
    pub fn granted_to(&self) -> GranteeKind {
        self.granted_to
    }

    /// Returns the grantee user name.
    #[must_use]
    pub fn grantee_name(&self) -> &str {
        self.grantee_name.as_str()
    }

    /// Returns the grantor role when one was recorded.
    #[must_use]
    pub fn granted_by(&self) -> Option<&str> {
        self.granted_by.as_deref()
    }
}

fn parse_flag(value: Option<&str>) -> bool {
    value.is_some_and(|value| value.trim().eq_ignore_ascii_case("true"))
}

fn strip_class_marker(name: &str) -> &str {
    match name.rfind(".<") {
        Some(index) if name.ends_with('>') => &name[..index],
        _ => name,
    }
}
