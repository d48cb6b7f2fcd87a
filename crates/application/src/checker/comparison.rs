use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use grantshift_core::AccountKind;
use grantshift_domain::{MetadataRow, ObjectName, quote_literal};

/// Column every comparison query selects as the record identity.
pub const ID_COLUMN: &str = "id";

/// Object class compared between the two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComparisonGroup {
    /// Users of the project.
    Users,
    /// Roles granted to project users.
    UserGrants,
    /// Project roles.
    Roles,
    /// Grants held by project roles.
    RoleGrants,
    /// Row count of one table.
    TableRows(ObjectName),
}

impl Display for ComparisonGroup {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Users => formatter.write_str("Users"),
            Self::UserGrants => formatter.write_str("Grants to users"),
            Self::Roles => formatter.write_str("Roles"),
            Self::RoleGrants => formatter.write_str("Grants to roles"),
            Self::TableRows(table) => write!(formatter, "Table {table}"),
        }
    }
}

/// A metadata query run identically against both accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Comparison {
    /// What is compared.
    pub group: ComparisonGroup,
    /// Query selecting an `ID` column plus the compared fields.
    pub sql: String,
    /// Role to read as, or the default role when absent.
    pub role: Option<String>,
}

impl Comparison {
    /// Compares users by name.
    #[must_use]
    pub fn users(users: &[String]) -> Self {
        Self {
            group: ComparisonGroup::Users,
            sql: format!(
                "SELECT NAME AS ID, NAME, LOGIN_NAME, DISPLAY_NAME, FIRST_NAME, LAST_NAME, EMAIL, \
                 DEFAULT_WAREHOUSE, DEFAULT_NAMESPACE, DEFAULT_ROLE, OWNER \
                 FROM SNOWFLAKE.ACCOUNT_USAGE.USERS WHERE DELETED_ON IS NULL AND NAME IN ({}) ORDER BY NAME",
                literal_list(users)
            ),
            role: None,
        }
    }

    /// Compares roles granted to users.
    #[must_use]
    pub fn user_grants(users: &[String]) -> Self {
        Self {
            group: ComparisonGroup::UserGrants,
            sql: format!(
                "SELECT CONCAT(ROLE, GRANTED_TO, GRANTEE_NAME, GRANTED_BY) AS ID, ROLE, GRANTED_TO, GRANTEE_NAME, GRANTED_BY \
                 FROM SNOWFLAKE.ACCOUNT_USAGE.GRANTS_TO_USERS WHERE DELETED_ON IS NULL AND GRANTEE_NAME IN ({}) \
                 ORDER BY ROLE, GRANTED_BY",
                literal_list(users)
            ),
            role: None,
        }
    }

    /// Compares roles by name and owner.
    #[must_use]
    pub fn roles(roles: &[String]) -> Self {
        Self {
            group: ComparisonGroup::Roles,
            sql: format!(
                "SELECT CONCAT(NAME, OWNER) AS ID, NAME, COMMENT, OWNER \
                 FROM SNOWFLAKE.ACCOUNT_USAGE.ROLES WHERE DELETED_ON IS NULL AND NAME IN ({}) ORDER BY NAME",
                literal_list(roles)
            ),
            role: None,
        }
    }

    /// Compares grants held by roles.
    #[must_use]
    pub fn role_grants(roles: &[String]) -> Self {
        Self {
            group: ComparisonGroup::RoleGrants,
            sql: format!(
                "SELECT CONCAT(PRIVILEGE, GRANTED_ON, NAME, GRANTED_TO, GRANTEE_NAME, GRANTED_BY, \
                 COALESCE(TABLE_CATALOG, ''), COALESCE(TABLE_SCHEMA, '')) AS ID, \
                 PRIVILEGE, GRANTED_ON, NAME, TABLE_CATALOG, TABLE_SCHEMA, GRANTED_TO, GRANTEE_NAME, GRANT_OPTION, GRANTED_BY \
                 FROM SNOWFLAKE.ACCOUNT_USAGE.GRANTS_TO_ROLES WHERE DELETED_ON IS NULL AND GRANTEE_NAME IN ({}) \
                 ORDER BY GRANTEE_NAME, PRIVILEGE, NAME",
                literal_list(roles)
            ),
            role: None,
        }
    }

    /// Compares the row count of a table, read as the given role.
    #[must_use]
    pub fn table_rows(table: ObjectName, role: impl Into<String>) -> Self {
        Self {
            sql: format!(
                "SELECT {} AS ID, COUNT(*) AS ROW_COUNT FROM {table}",
                quote_literal(&table.to_string())
            ),
            group: ComparisonGroup::TableRows(table),
            role: Some(role.into()),
        }
    }
}

fn literal_list(values: &[String]) -> String {
    if values.is_empty() {
        return "NULL".to_owned();
    }

    values
        .iter()
        .map(|value| quote_literal(value))
        .collect::<Vec<_>>()
        .join(", ")
}

/// One difference found between the two accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    /// The query returned a different number of records.
    CountDiffers {
        /// Compared group.
        group: String,
        /// Records in the source account.
        source: usize,
        /// Records in the destination account.
        destination: usize,
    },
    /// A record exists in one account only.
    MissingIn {
        /// Compared group.
        group: String,
        /// Account lacking the record.
        account: AccountKind,
        /// Record identity.
        id: String,
    },
    /// A record exists in both accounts with different fields.
    FieldsDiffer {
        /// Compared group.
        group: String,
        /// Record identity.
        id: String,
        /// Account lacking these field values.
        missing_in: AccountKind,
        /// `(column, value)` pairs that differ.
        fields: Vec<(String, String)>,
    },
    /// The row-level comparison of a table failed.
    RowsDiffer {
        /// Fully qualified table.
        table: String,
        /// Report of the comparison tool.
        report: String,
    },
}

impl Display for Mismatch {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CountDiffers {
                group,
                source,
                destination,
            } => write!(
                formatter,
                "{group}: source count ({source}) does not equal destination count ({destination})"
            ),
            Self::MissingIn { group, account, id } => {
                write!(formatter, "{group}: item '{id}' does not exist in the {account} account")
            }
            Self::FieldsDiffer {
                group,
                id,
                missing_in,
                fields,
            } => {
                let fields = fields
                    .iter()
                    .map(|(column, value)| format!("{column}: {value}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(
                    formatter,
                    "{group}: '{id}' is not the same, missing in the {missing_in} account ({fields})"
                )
            }
            Self::RowsDiffer { table, report } => {
                write!(formatter, "table {table} differs: {report}")
            }
        }
    }
}

/// Diffs two result sets of the same comparison query by their `ID` column.
#[must_use]
pub fn diff_rows(group: &str, source: &[MetadataRow], destination: &[MetadataRow]) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();
    if source.len() != destination.len() {
        mismatches.push(Mismatch::CountDiffers {
            group: group.to_owned(),
            source: source.len(),
            destination: destination.len(),
        });
    }

    let source_by_id = index_by_id(source);
    let destination_by_id = index_by_id(destination);

    for (id, source_row) in &source_by_id {
        let Some(destination_row) = destination_by_id.get(id) else {
            mismatches.push(Mismatch::MissingIn {
                group: group.to_owned(),
                account: AccountKind::Destination,
                id: (*id).to_owned(),
            });
            continue;
        };

        for (missing_in, present, other) in [
            (AccountKind::Destination, *source_row, *destination_row),
            (AccountKind::Source, *destination_row, *source_row),
        ] {
            let fields: Vec<(String, String)> = present
                .iter()
                .filter(|(column, value)| other.get(column) != Some(*value))
                .map(|(column, value)| (column.to_owned(), value.to_owned()))
                .collect();
            if !fields.is_empty() {
                mismatches.push(Mismatch::FieldsDiffer {
                    group: group.to_owned(),
                    id: (*id).to_owned(),
                    missing_in,
                    fields,
                });
            }
        }
    }

    for id in destination_by_id.keys() {
        if !source_by_id.contains_key(id) {
            mismatches.push(Mismatch::MissingIn {
                group: group.to_owned(),
                account: AccountKind::Source,
                id: (*id).to_owned(),
            });
        }
    }

    mismatches
}

fn index_by_id(rows: &[MetadataRow]) -> BTreeMap<&str, &MetadataRow> {
    rows.iter()
        .filter_map(|row| row.get(ID_COLUMN).map(|id| (id, row)))
        .collect()
}
