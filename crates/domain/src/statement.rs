use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::{
    FutureGrantRecord, GrantRecord, GrantedOn, GranteeKind, ObjectName, Password,
    RoutineSignature, quote_identifier, quote_literal,
};

/// Target of a `GRANT ... ON` clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Securable {
    /// Account-level privilege, rendered without an object name.
    Account,
    /// A named object of one class.
    Object {
        /// Object class keyword.
        kind: GrantedOn,
        /// Object name as reported by metadata.
        name: String,
    },
}

impl Securable {
    /// Returns the securable a grant record refers to.
    #[must_use]
    pub fn from_grant(grant: &GrantRecord) -> Self {
        match grant.granted_on() {
            GrantedOn::Account => Self::Account,
            kind => Self::Object {
                kind: kind.clone(),
                name: grant.object_name().to_owned(),
            },
        }
    }
}

impl Display for Securable {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Account => formatter.write_str("ACCOUNT"),
            Self::Object { kind, name } => write!(formatter, "{kind} {}", render_object(kind, name)),
        }
    }
}

fn render_object(kind: &GrantedOn, name: &str) -> String {
    match kind {
        GrantedOn::Database | GrantedOn::Role | GrantedOn::User | GrantedOn::Warehouse => {
            quote_identifier(name)
        }
        GrantedOn::Schema | GrantedOn::Table | GrantedOn::View => ObjectName::parse(name)
            .map(|parsed| parsed.to_string())
            .unwrap_or_else(|_| name.to_owned()),
        GrantedOn::Function | GrantedOn::Procedure => render_routine(name),
        GrantedOn::Account | GrantedOn::Other(_) => name.to_owned(),
    }
}

// Grant names look like DB.SCHEMA."NAME(ARG TYPE):RETURN"; GRANT needs DB.SCHEMA.NAME(TYPE).
fn render_routine(name: &str) -> String {
    let Ok(parsed) = ObjectName::parse(name) else {
        return name.to_owned();
    };
    let Some(last) = parsed.object() else {
        return name.to_owned();
    };
    let Ok(signature) = RoutineSignature::parse(last) else {
        return name.to_owned();
    };

    let mut parts: Vec<String> = parsed.parts().to_vec();
    parts.pop();
    parts.push(signature.name().to_owned());

    format!(
        "{}({})",
        ObjectName::from_parts(parts),
        signature.argument_list()
    )
}

/// Scope of a privilege granted to a share.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareScope {
    /// The database itself.
    Database(String),
    /// Every schema in a database.
    AllSchemasIn(String),
    /// Every table in a database.
    AllTablesIn(String),
}

impl Display for ShareScope {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Database(database) => write!(formatter, "DATABASE {}", quote_identifier(database)),
            Self::AllSchemasIn(database) => write!(
                formatter,
                "ALL SCHEMAS IN DATABASE {}",
                quote_identifier(database)
            ),
            Self::AllTablesIn(database) => write!(
                formatter,
                "ALL TABLES IN DATABASE {}",
                quote_identifier(database)
            ),
        }
    }
}

/// Warehouse settings copied from the source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSpec {
    /// Warehouse name.
    pub name: String,
    /// Size keyword, e.g. `Small`.
    pub size: String,
    /// Type keyword, e.g. `STANDARD`.
    pub warehouse_type: String,
    /// Auto-suspend seconds.
    pub auto_suspend: String,
    /// Auto-resume flag.
    pub auto_resume: String,
}

/// Schema settings copied from the source account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSpec {
    /// Database the schema is created in.
    pub database: String,
    /// Schema name.
    pub schema: String,
    /// Whether the schema is transient.
    pub transient: bool,
    /// Whether the schema uses managed access.
    pub managed_access: bool,
    /// Data retention in days, when reported.
    pub retention_days: Option<String>,
}

/// Typed statement issued against a warehouse account.
///
/// Rendering goes through one quoting function so every identifier is escaped
/// the same way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    /// `USE ROLE`.
    UseRole(String),
    /// `USE WAREHOUSE`.
    UseWarehouse(String),
    /// `USE DATABASE`.
    UseDatabase(String),
    /// `USE SCHEMA db.schema`.
    UseSchema {
        /// Database name.
        database: String,
        /// Schema name.
        schema: String,
    },
    /// `CREATE ROLE IF NOT EXISTS`.
    CreateRole(String),
    /// `CREATE USER IF NOT EXISTS` with copied properties.
    CreateUser {
        /// User name.
        name: String,
        /// Upper-case property/value pairs.
        properties: Vec<(String, String)>,
        /// Initial password.
        password: Option<Password>,
    },
    /// `CREATE WAREHOUSE IF NOT EXISTS`.
    CreateWarehouse(WarehouseSpec),
    /// `CREATE DATABASE` with optional retention.
    CreateDatabase {
        /// Database name.
        name: String,
        /// Data retention in days.
        retention_days: Option<String>,
    },
    /// `CREATE SCHEMA` with copied options.
    CreateSchema(SchemaSpec),
    /// `CREATE TABLE ... LIKE ...`.
    CreateTableLike {
        /// Table to create.
        table: ObjectName,
        /// Table to copy the structure from.
        source: ObjectName,
    },
    /// `CREATE TABLE ... CLONE ...`.
    CloneTable {
        /// Table to create.
        table: ObjectName,
        /// Table to clone.
        source: ObjectName,
    },
    /// `ALTER TABLE ... ADD PRIMARY KEY`.
    AddPrimaryKey {
        /// Table to alter.
        table: ObjectName,
        /// Key columns in order.
        columns: Vec<String>,
    },
    /// `TRUNCATE TABLE`.
    TruncateTable(ObjectName),
    /// `INSERT INTO ... SELECT * FROM ...`.
    InsertSelect {
        /// Table receiving rows.
        table: ObjectName,
        /// Table rows are read from.
        source: ObjectName,
    },
    /// `GRANT ROLE ... TO ROLE|USER ...`.
    GrantRole {
        /// Granted role.
        role: String,
        /// Grantee kind.
        grantee_kind: GranteeKind,
        /// Grantee name.
        grantee: String,
    },
    /// `GRANT <privilege> ON <securable> TO ROLE|USER ...`.
    Grant {
        /// Privilege keyword.
        privilege: String,
        /// Grant target.
        securable: Securable,
        /// Grantee kind.
        grantee_kind: GranteeKind,
        /// Grantee name.
        grantee: String,
        /// Whether to append `WITH GRANT OPTION`.
        with_grant_option: bool,
    },
    /// `GRANT <privilege> ON FUTURE <kinds> IN SCHEMA|DATABASE ...`.
    GrantFuture {
        /// Privilege keyword.
        privilege: String,
        /// Plural object class keyword, e.g. `TABLES`.
        plural_kind: String,
        /// Schema (two parts) or database (one part).
        container: ObjectName,
        /// Grantee kind.
        grantee_kind: GranteeKind,
        /// Grantee name.
        grantee: String,
        /// Whether to append `WITH GRANT OPTION`.
        with_grant_option: bool,
    },
    /// `REVOKE <privilege> ON FUTURE <kinds> IN SCHEMA|DATABASE ... FROM ROLE ...`.
    RevokeFuture {
        /// Privilege keyword.
        privilege: String,
        /// Plural object class keyword.
        plural_kind: String,
        /// Schema or database.
        container: ObjectName,
        /// Role losing the rule.
        role: String,
    },
    /// `REVOKE ROLE ... FROM USER ...`.
    RevokeRoleFromUser {
        /// Revoked role.
        role: String,
        /// User losing the role.
        user: String,
    },
    /// `GRANT <privilege> ON <scope> TO SHARE ...`.
    GrantToShare {
        /// Privilege keyword.
        privilege: String,
        /// Shared objects.
        scope: ShareScope,
        /// Share name.
        share: String,
    },
    /// `CREATE SHARE IF NOT EXISTS`.
    CreateShare(String),
    /// `ALTER SHARE ... ADD ACCOUNT=...`.
    AddShareAccount {
        /// Share name.
        share: String,
        /// Consumer account locator.
        account: String,
    },
    /// `CREATE DATABASE ... FROM SHARE`.
    CreateDatabaseFromShare {
        /// Database to create.
        database: String,
        /// Provider account locator.
        provider_account: String,
        /// Share name.
        share: String,
    },
    /// `ALTER DATABASE ... ENABLE REPLICATION TO ACCOUNTS ...`.
    EnableReplication {
        /// Replicated database.
        database: String,
        /// Target account as `region.account`.
        account: String,
    },
    /// `CREATE DATABASE IF NOT EXISTS ... AS REPLICA OF ...`.
    CreateReplica {
        /// Replica database.
        database: String,
        /// Primary account as `region.account`.
        primary_account: String,
    },
    /// `ALTER DATABASE ... REFRESH`.
    RefreshDatabase(String),
    /// `DROP USER IF EXISTS`.
    DropUser(String),
    /// `DROP ROLE IF EXISTS`.
    DropRole(String),
    /// `DROP DATABASE IF EXISTS`.
    DropDatabase(String),
    /// `DROP TABLE IF EXISTS`.
    DropTable(ObjectName),
    /// `ALTER DATABASE IF EXISTS ... RENAME TO ...`.
    RenameDatabase {
        /// Current name.
        from: String,
        /// New name.
        to: String,
    },
    /// DDL text copied from the source account, e.g. a view definition.
    Verbatim(String),
}

impl Statement {
    /// Builds the statement replaying a grant record.
    #[must_use]
    pub fn grant(grant: &GrantRecord) -> Self {
        if grant.privilege() == crate::USAGE && grant.granted_on() == &GrantedOn::Role {
            return Self::GrantRole {
                role: grant.object_name().to_owned(),
                grantee_kind: grant.granted_to(),
                grantee: grant.grantee_name().to_owned(),
            };
        }

        Self::Grant {
            privilege: grant.privilege().to_owned(),
            securable: Securable::from_grant(grant),
            grantee_kind: grant.granted_to(),
            grantee: grant.grantee_name().to_owned(),
            with_grant_option: grant.grant_option(),
        }
    }

    /// Builds the statement replaying a future grant rule.
    #[must_use]
    pub fn grant_future(grant: &FutureGrantRecord) -> Self {
        Self::GrantFuture {
            privilege: grant.privilege().to_owned(),
            plural_kind: grant.plural_kind(),
            container: container_name(grant),
            grantee_kind: grant.grant_to(),
            grantee: grant.grantee_name().to_owned(),
            with_grant_option: grant.grant_option(),
        }
    }

    /// Builds the statement revoking a future grant rule.
    #[must_use]
    pub fn revoke_future(grant: &FutureGrantRecord) -> Self {
        Self::RevokeFuture {
            privilege: grant.privilege().to_owned(),
            plural_kind: grant.plural_kind(),
            container: container_name(grant),
            role: grant.grantee_name().to_owned(),
        }
    }

    /// Returns true for statements that drop objects.
    #[must_use]
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Self::DropUser(_) | Self::DropRole(_) | Self::DropDatabase(_) | Self::DropTable(_)
        )
    }

    /// Renders the statement with secrets masked, for logs.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::CreateUser {
                name,
                properties,
                password,
            } => render_create_user(name, properties, password.as_ref().map(|_| "'***'")),
            other => other.to_string(),
        }
    }
}

fn container_name(grant: &FutureGrantRecord) -> ObjectName {
    grant
        .parsed_container()
        .unwrap_or_else(|_| ObjectName::from_parts([grant.container_name()]))
}

fn container_clause(container: &ObjectName) -> &'static str {
    if container.parts().len() > 1 {
        "SCHEMA"
    } else {
        "DATABASE"
    }
}

fn render_create_user(
    name: &str,
    properties: &[(String, String)],
    password: Option<&str>,
) -> String {
    let mut sql = format!("CREATE USER IF NOT EXISTS {}", quote_identifier(name));
    if let Some(password) = password {
        sql.push_str(&format!(" PASSWORD = {password}"));
    }
    for (property, value) in properties {
        sql.push_str(&format!(" {property} = {}", quote_literal(value)));
    }

    sql
}

fn grant_option_suffix(with_grant_option: bool) -> &'static str {
    if with_grant_option {
        " WITH GRANT OPTION"
    } else {
        ""
    }
}

impl Display for Statement {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseRole(role) => write!(formatter, "USE ROLE {}", quote_identifier(role)),
            Self::UseWarehouse(warehouse) => {
                write!(formatter, "USE WAREHOUSE {}", quote_identifier(warehouse))
            }
            Self::UseDatabase(database) => {
                write!(formatter, "USE DATABASE {}", quote_identifier(database))
            }
            Self::UseSchema { database, schema } => write!(
                formatter,
                "USE SCHEMA {}",
                ObjectName::from_parts([database.as_str(), schema.as_str()])
            ),
            Self::CreateRole(role) => {
                write!(formatter, "CREATE ROLE IF NOT EXISTS {}", quote_identifier(role))
            }
            Self::CreateUser {
                name,
                properties,
                password,
            } => {
                let password = password
                    .as_ref()
                    .map(|password| quote_literal(password.expose()));
                formatter.write_str(&render_create_user(name, properties, password.as_deref()))
            }
            Self::CreateWarehouse(spec) => write!(
                formatter,
                "CREATE WAREHOUSE IF NOT EXISTS {} WITH WAREHOUSE_SIZE = {} WAREHOUSE_TYPE = {} AUTO_SUSPEND = {} AUTO_RESUME = {}",
                quote_identifier(&spec.name),
                quote_literal(&spec.size),
                quote_literal(&spec.warehouse_type),
                spec.auto_suspend,
                spec.auto_resume
            ),
            Self::CreateDatabase {
                name,
                retention_days,
            } => {
                write!(formatter, "CREATE DATABASE {}", quote_identifier(name))?;
                if let Some(days) = retention_days {
                    write!(formatter, " DATA_RETENTION_TIME_IN_DAYS = {days}")?;
                }
                Ok(())
            }
            Self::CreateSchema(spec) => {
                formatter.write_str("CREATE ")?;
                if spec.transient {
                    formatter.write_str("TRANSIENT ")?;
                }
                write!(
                    formatter,
                    "SCHEMA {}",
                    ObjectName::from_parts([spec.database.as_str(), spec.schema.as_str()])
                )?;
                if spec.managed_access {
                    formatter.write_str(" WITH MANAGED ACCESS")?;
                }
                if let Some(days) = &spec.retention_days {
                    write!(formatter, " DATA_RETENTION_TIME_IN_DAYS = {days}")?;
                }
                Ok(())
            }
            Self::CreateTableLike { table, source } => {
                write!(formatter, "CREATE TABLE {table} LIKE {source}")
            }
            Self::CloneTable { table, source } => {
                write!(formatter, "CREATE TABLE {table} CLONE {source}")
            }
            Self::AddPrimaryKey { table, columns } => write!(
                formatter,
                "ALTER TABLE {table} ADD PRIMARY KEY ({})",
                columns
                    .iter()
                    .map(|column| quote_identifier(column))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Self::TruncateTable(table) => write!(formatter, "TRUNCATE TABLE {table}"),
            Self::InsertSelect { table, source } => {
                write!(formatter, "INSERT INTO {table} SELECT * FROM {source}")
            }
            Self::GrantRole {
                role,
                grantee_kind,
                grantee,
            } => write!(
                formatter,
                "GRANT ROLE {} TO {grantee_kind} {}",
                quote_identifier(role),
                quote_identifier(grantee)
            ),
            Self::Grant {
                privilege,
                securable,
                grantee_kind,
                grantee,
                with_grant_option,
            } => write!(
                formatter,
                "GRANT {privilege} ON {securable} TO {grantee_kind} {}{}",
                quote_identifier(grantee),
                grant_option_suffix(*with_grant_option)
            ),
            Self::GrantFuture {
                privilege,
                plural_kind,
                container,
                grantee_kind,
                grantee,
                with_grant_option,
            } => write!(
                formatter,
                "GRANT {privilege} ON FUTURE {plural_kind} IN {} {container} TO {grantee_kind} {}{}",
                container_clause(container),
                quote_identifier(grantee),
                grant_option_suffix(*with_grant_option)
            ),
            Self::RevokeFuture {
                privilege,
                plural_kind,
                container,
                role,
            } => write!(
                formatter,
                "REVOKE {privilege} ON FUTURE {plural_kind} IN {} {container} FROM ROLE {}",
                container_clause(container),
                quote_identifier(role)
            ),
            Self::RevokeRoleFromUser { role, user } => write!(
                formatter,
                "REVOKE ROLE {} FROM USER {}",
                quote_identifier(role),
                quote_identifier(user)
            ),
            Self::GrantToShare {
                privilege,
                scope,
                share,
            } => write!(
                formatter,
                "GRANT {privilege} ON {scope} TO SHARE {}",
                quote_identifier(share)
            ),
            Self::CreateShare(share) => {
                write!(formatter, "CREATE SHARE IF NOT EXISTS {}", quote_identifier(share))
            }
            Self::AddShareAccount { share, account } => write!(
                formatter,
                "ALTER SHARE {} ADD ACCOUNT = {account}",
                quote_identifier(share)
            ),
            Self::CreateDatabaseFromShare {
                database,
                provider_account,
                share,
            } => write!(
                formatter,
                "CREATE DATABASE {} FROM SHARE IDENTIFIER({})",
                quote_identifier(database),
                quote_literal(&format!("{provider_account}.{share}"))
            ),
            Self::EnableReplication { database, account } => write!(
                formatter,
                "ALTER DATABASE {} ENABLE REPLICATION TO ACCOUNTS {account}",
                quote_identifier(database)
            ),
            Self::CreateReplica {
                database,
                primary_account,
            } => write!(
                formatter,
                "CREATE DATABASE IF NOT EXISTS {} AS REPLICA OF {primary_account}.{}",
                quote_identifier(database),
                quote_identifier(database)
            ),
            Self::RefreshDatabase(database) => {
                write!(formatter, "ALTER DATABASE {} REFRESH", quote_identifier(database))
            }
            Self::DropUser(user) => write!(formatter, "DROP USER IF EXISTS {}", quote_identifier(user)),
            Self::DropRole(role) => write!(formatter, "DROP ROLE IF EXISTS {}", quote_identifier(role)),
            Self::DropDatabase(database) => {
                write!(formatter, "DROP DATABASE IF EXISTS {}", quote_identifier(database))
            }
            Self::DropTable(table) => write!(formatter, "DROP TABLE IF EXISTS {table}"),
            Self::RenameDatabase { from, to } => write!(
                formatter,
                "ALTER DATABASE IF EXISTS {} RENAME TO {}",
                quote_identifier(from),
                quote_identifier(to)
            ),
            Self::Verbatim(sql) => formatter.write_str(sql.trim()),
        }
    }
}
