use grantshift_domain::MetadataRow;

use super::*;
use crate::naming::old_database;
use crate::replay_planner::ReplayPlan;

/// How each table received its rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataCopyReport {
    /// Tables cloned unchanged from `<DB>_OLD`.
    pub cloned: usize,
    /// Tables truncated and reloaded from the share.
    pub reloaded: usize,
    /// Empty tables filled from the share.
    pub inserted: usize,
    /// Tables left untouched for a missing owner or warehouse.
    pub skipped: usize,
    /// Grants replayed on cloned tables.
    pub replay: ExecutionReport,
}

impl ObjectMigration {
    /// Copies rows from `<DB>_SHARE` into the project's tables.
    ///
    /// Outside synchronize mode only empty tables are filled. In synchronize mode
    /// a table whose latest `_timestamp` in `<DB>_OLD` matches the share is cloned
    /// from OLD, and a table whose production copy differs from the share is
    /// reloaded.
    pub async fn migrate_data(
        &self,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
    ) -> AppResult<DataCopyReport> {
        let database = set.database();
        let share = share_database(database);
        let mut report = DataCopyReport::default();

        info!(database = %database, "migrating data");
        destination.use_role(set.seed_role()).await?;
        let schemas = destination.schemas_in(&share).await?;
        for schema_row in &schemas {
            let schema = schema_row.require("name")?;
            if !self.is_migrated_schema(schema) {
                continue;
            }

            destination.use_role(set.seed_role()).await?;
            let shared_tables = destination.tables_in(&share, schema).await?;
            let tables = destination.tables_in(database, schema).await?;
            for shared in &shared_tables {
                let name = shared.require("name")?;
                let Some(table) = tables.iter().find(|table| table.get("name") == Some(name)) else {
                    continue;
                };
                self.copy_table(
                    destination,
                    set,
                    plan,
                    &ObjectName::from_parts([database, schema, name]),
                    (shared, table),
                    &mut report,
                )
                .await?;
            }
        }

        Ok(report)
    }

    async fn copy_table(
        &self,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
        table: &ObjectName,
        (shared, production): (&MetadataRow, &MetadataRow),
        report: &mut DataCopyReport,
    ) -> AppResult<()> {
        let Some(ownership) = ownership_in(set, &GrantedOn::Table, table) else {
            warn!(table = %table, "table ownership not found, skipping data");
            report.skipped += 1;
            return Ok(());
        };
        let owner = ownership.granted_by();
        if !self.use_owner_warehouse(destination, owner, table).await? {
            report.skipped += 1;
            return Ok(());
        }

        let database = set.database();
        let shared_table = table.with_database(&share_database(database));
        if self.options.synchronize {
            let old_table = table.with_database(&old_database(database));
            let production_current =
                same_max_timestamp(destination, (owner, table), (owner, &shared_table)).await?;
            let old_current = same_max_timestamp(
                destination,
                (&self.main_role, &old_table),
                (owner, &shared_table),
            )
            .await?;

            if old_current {
                info!(table = %table, "cloning table from the old database");
                self.grant_old_table_access(destination, &old_table, owner)
                    .await?;
                destination.use_role(owner).await?;
                destination.run(&Statement::DropTable(table.clone())).await?;
                destination
                    .run(&Statement::CloneTable {
                        table: table.clone(),
                        source: old_table,
                    })
                    .await?;
                let grants = plan
                    .object_instructions(&GrantedOn::Table, table)
                    .into_iter()
                    .filter(|instruction| {
                        instruction.grant().is_some_and(|grant| !grant.is_ownership())
                    });
                report
                    .replay
                    .absorb(self.executor.execute(destination, grants).await?);
                report.cloned += 1;
                return Ok(());
            }

            if !production_current {
                info!(table = %table, "reloading table data");
                destination.use_role(owner).await?;
                destination
                    .run(&Statement::TruncateTable(table.clone()))
                    .await?;
                destination
                    .run(&Statement::InsertSelect {
                        table: table.clone(),
                        source: shared_table,
                    })
                    .await?;
                report.reloaded += 1;
                return Ok(());
            }
        }

        if production.get("rows") == Some("0") && shared.get("rows") != Some("0") {
            info!(table = %table, "copying table data");
            destination.use_role(owner).await?;
            destination
                .run(&Statement::InsertSelect {
                    table: table.clone(),
                    source: shared_table,
                })
                .await?;
            report.inserted += 1;
        }

        Ok(())
    }

    async fn grant_old_table_access(
        &self,
        destination: &mut Session,
        old_table: &ObjectName,
        role: &str,
    ) -> AppResult<()> {
        let (Some(database), Some(schema)) = (old_table.database(), old_table.schema()) else {
            return Ok(());
        };

        destination.use_role(&self.main_role).await?;
        if destination.find_database(database).await?.is_none() {
            return Ok(());
        }

        let objects = [
            ("USAGE", GrantedOn::Database, database.to_owned()),
            (
                "USAGE",
                GrantedOn::Schema,
                ObjectName::from_parts([database, schema]).to_string(),
            ),
            ("SELECT", GrantedOn::Table, old_table.to_string()),
        ];
        for (privilege, kind, name) in objects {
            destination
                .run(&Statement::Grant {
                    privilege: privilege.to_owned(),
                    securable: Securable::Object { kind, name },
                    grantee_kind: GranteeKind::Role,
                    grantee: role.to_owned(),
                    with_grant_option: false,
                })
                .await?;
        }

        Ok(())
    }
}

// A failed read counts as a difference.
async fn same_max_timestamp(
    session: &mut Session,
    (first_role, first): (&str, &ObjectName),
    (second_role, second): (&str, &ObjectName),
) -> AppResult<bool> {
    let first = match read_max_timestamp(session, first_role, first).await? {
        Some(value) => value,
        None => return Ok(false),
    };
    let second = match read_max_timestamp(session, second_role, second).await? {
        Some(value) => value,
        None => return Ok(false),
    };

    Ok(first == second)
}

async fn read_max_timestamp(
    session: &mut Session,
    role: &str,
    table: &ObjectName,
) -> AppResult<Option<Option<String>>> {
    session.use_role(role).await?;
    match session.max_timestamp(table).await {
        Ok(value) => Ok(Some(value)),
        Err(error) if error.is_statement_failure() => {
            debug!(table = %table, error = %error, "could not read latest timestamp");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}
