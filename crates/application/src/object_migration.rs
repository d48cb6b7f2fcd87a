use std::collections::HashSet;

use grantshift_core::AppResult;
use grantshift_domain::{
    GrantCategory, GrantRecord, GrantedOn, GranteeKind, Instruction, ObjectName, ProjectRoleSet,
    Securable, Statement, is_workspace_role,
};
use tracing::{debug, info, warn};

use crate::naming::{is_dev_branch_schema, is_skipped_schema, share_database};
use crate::replay_executor::{ExecutionReport, ReplayExecutor};
use crate::replay_planner::names_match;
use crate::session::WarehouseSelection;
use crate::Session;

mod data;
mod routines;
mod structure;

pub use data::DataCopyReport;

/// Privilege that lets a role read a database created from a share.
const IMPORTED_PRIVILEGES: &str = "IMPORTED PRIVILEGES";

/// Tuning for object and data migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMigrationOptions {
    /// Reuse unchanged tables from `<DB>_OLD` and reload changed ones.
    pub synchronize: bool,
    /// Skip `{branchId}_{bucket}` schemas.
    pub skip_dev_branches: bool,
    /// Warehouse name suffix preferred when a role may use several.
    pub warehouse_size: String,
}

impl Default for ObjectMigrationOptions {
    fn default() -> Self {
        Self {
            synchronize: false,
            skip_dev_branches: false,
            warehouse_size: "SMALL".to_owned(),
        }
    }
}

/// Counts of objects recreated in the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectMigrationReport {
    /// Grants replayed while objects were created.
    pub replay: ExecutionReport,
    /// Schemas created.
    pub schemas: usize,
    /// Tables created.
    pub tables: usize,
    /// Views created.
    pub views: usize,
    /// Functions and procedures created.
    pub routines: usize,
    /// Objects skipped for a missing owner, warehouse or unsupported definition.
    pub skipped: usize,
}

/// Recreates database objects of one project and copies their data.
///
/// Objects are created under the role that owns them in the source account, so
/// ownership in the destination follows without extra grants.
#[derive(Debug, Clone)]
pub struct ObjectMigration {
    main_role: String,
    executor: ReplayExecutor,
    options: ObjectMigrationOptions,
}

impl ObjectMigration {
    /// Creates a migration acting as `main_role` for database-level statements.
    #[must_use]
    pub fn new(main_role: impl Into<String>, executor: ReplayExecutor) -> Self {
        Self {
            main_role: main_role.into(),
            executor,
            options: ObjectMigrationOptions::default(),
        }
    }

    /// Replaces the migration options.
    #[must_use]
    pub fn with_options(mut self, options: ObjectMigrationOptions) -> Self {
        self.options = options;
        self
    }

    fn is_migrated_schema(&self, schema: &str) -> bool {
        !is_skipped_schema(schema)
            && !(self.options.skip_dev_branches && is_dev_branch_schema(schema))
    }

    // Workspace roles routinely lack a warehouse; that gap is expected.
    async fn use_owner_warehouse(
        &self,
        session: &mut Session,
        role: &str,
        object: &ObjectName,
    ) -> AppResult<bool> {
        match session
            .use_warehouse_for(role, &self.options.warehouse_size)
            .await?
        {
            WarehouseSelection::Selected(_) => Ok(true),
            WarehouseSelection::Unavailable if is_workspace_role(role) => {
                debug!(role = %role, object = %object, "workspace role has no warehouse");
                Ok(false)
            }
            WarehouseSelection::Unavailable => {
                warn!(role = %role, object = %object, "no usable warehouse, skipping object");
                Ok(false)
            }
        }
    }

    async fn grant_share_access(
        &self,
        session: &mut Session,
        database: &str,
        role: &str,
        granted: &mut HashSet<String>,
    ) -> AppResult<()> {
        if !granted.insert(role.to_owned()) {
            return Ok(());
        }

        session.use_default_role().await?;
        session
            .run(&Statement::Grant {
                privilege: IMPORTED_PRIVILEGES.to_owned(),
                securable: Securable::Object {
                    kind: GrantedOn::Database,
                    name: share_database(database),
                },
                grantee_kind: GranteeKind::Role,
                grantee: role.to_owned(),
                with_grant_option: false,
            })
            .await
    }
}

/// Returns the source ownership grant of a named object.
fn ownership_in<'a>(
    set: &'a ProjectRoleSet,
    on: &GrantedOn,
    name: &ObjectName,
) -> Option<&'a GrantRecord> {
    set.grants_in(on.category()).find(|grant| {
        grant.is_ownership()
            && grant.granted_on() == on
            && grant
                .parsed_name()
                .is_ok_and(|parsed| names_match(on, &parsed, name))
    })
}

/// Returns the non-ownership grants of one object class, in plan order.
fn secondary_grants<'a>(
    instructions: &'a [Instruction],
    category: GrantCategory,
) -> impl Iterator<Item = &'a Instruction> {
    instructions.iter().filter(move |instruction| {
        instruction
            .grant()
            .is_some_and(|grant| grant.category() == category && !grant.is_ownership())
    })
}

#[cfg(test)]
mod tests;
