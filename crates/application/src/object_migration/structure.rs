use grantshift_core::AppError;
use grantshift_domain::{MetadataRow, SchemaSpec};

use super::*;
use crate::replay_planner::ReplayPlan;

// State shared by the steps of one database.
#[derive(Default)]
struct Progress {
    report: ObjectMigrationReport,
    share_access: HashSet<String>,
}

impl ObjectMigration {
    /// Creates the project's database, schemas, tables, views and routines in the
    /// destination and replays the object grants of `plan` as each object appears.
    ///
    /// Table structure is copied from `<DB>_SHARE`; definitions of views and
    /// routines are read from the source account.
    pub async fn migrate_structure(
        &self,
        source: &mut Session,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
    ) -> AppResult<ObjectMigrationReport> {
        let database = set.database();
        let mut progress = Progress::default();

        source.use_default_role().await?;
        let source_database = source.find_database(database).await?.ok_or_else(|| {
            AppError::ObjectNotFound(format!("database '{database}' not found on the source account"))
        })?;

        info!(database = %database, "migrating database");
        destination.use_role(&self.main_role).await?;
        destination
            .run(&Statement::CreateDatabase {
                name: database.to_owned(),
                retention_days: source_database.get("retention_time").map(str::to_owned),
            })
            .await?;
        let database_grants =
            plan.object_instructions(&GrantedOn::Database, &ObjectName::from_parts([database]));
        progress
            .report
            .replay
            .absorb(self.executor.execute(destination, database_grants).await?);
        self.grant_share_access(
            destination,
            database,
            set.seed_role(),
            &mut progress.share_access,
        )
        .await?;

        destination.use_role(set.seed_role()).await?;
        let schemas = destination.schemas_in(&share_database(database)).await?;
        for schema_row in &schemas {
            let schema = schema_row.require("name")?;
            if !self.is_migrated_schema(schema) {
                if !is_skipped_schema(schema) {
                    info!(schema = %schema, "skipping development branch schema");
                }
                continue;
            }
            self.migrate_schema(source, destination, set, plan, schema_row, &mut progress)
                .await?;
        }

        self.copy_views(source, destination, set, plan, &mut progress.report)
            .await?;
        self.copy_routines(source, destination, set, plan, &mut progress.report)
            .await?;

        Ok(progress.report)
    }

    async fn migrate_schema(
        &self,
        source: &mut Session,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
        schema_row: &MetadataRow,
        progress: &mut Progress,
    ) -> AppResult<()> {
        let database = set.database();
        let schema = schema_row.require("name")?;
        let schema_name = ObjectName::from_parts([database, schema]);
        let Some(ownership) = ownership_in(set, &GrantedOn::Schema, &schema_name) else {
            warn!(schema = %schema_name, "schema ownership not found, skipping schema");
            progress.report.skipped += 1;
            return Ok(());
        };

        let options: Vec<&str> = schema_row
            .get("options")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .collect();

        info!(schema = %schema_name, owner = %ownership.granted_by(), "migrating schema");
        destination.use_role(ownership.granted_by()).await?;
        destination
            .run(&Statement::CreateSchema(SchemaSpec {
                database: database.to_owned(),
                schema: schema.to_owned(),
                transient: options.contains(&"TRANSIENT"),
                managed_access: options.contains(&"MANAGED ACCESS"),
                retention_days: schema_row.get("retention_time").map(str::to_owned),
            }))
            .await?;
        progress.report.schemas += 1;

        let schema_grants = plan
            .object_instructions(&GrantedOn::Schema, &schema_name)
            .into_iter()
            .chain(plan.future_instructions(&schema_name));
        progress
            .report
            .replay
            .absorb(self.executor.execute(destination, schema_grants).await?);

        let tables = destination
            .tables_in(&share_database(database), schema)
            .await?;
        source.use_default_role().await?;
        let primary_keys = source.primary_keys_in_schema(database, schema).await?;

        for table_row in &tables {
            let table = table_row.require("name")?;
            let columns = primary_keys.get(table).map(Vec::as_slice).unwrap_or_default();
            self.migrate_table(
                destination,
                set,
                plan,
                &ObjectName::from_parts([database, schema, table]),
                columns,
                progress,
            )
            .await?;
        }

        Ok(())
    }

    async fn migrate_table(
        &self,
        destination: &mut Session,
        set: &ProjectRoleSet,
        plan: &ReplayPlan,
        table: &ObjectName,
        primary_key: &[String],
        progress: &mut Progress,
    ) -> AppResult<()> {
        let Some(ownership) = ownership_in(set, &GrantedOn::Table, table) else {
            warn!(table = %table, "table ownership not found, skipping table");
            progress.report.skipped += 1;
            return Ok(());
        };
        let owner = ownership.granted_by();

        self.grant_share_access(destination, set.database(), owner, &mut progress.share_access)
            .await?;
        destination.use_role(owner).await?;
        let create = Statement::CreateTableLike {
            table: table.clone(),
            source: table.with_database(&share_database(set.database())),
        };
        match destination.run(&create).await {
            Ok(()) => progress.report.tables += 1,
            Err(error) if error.is_statement_failure() => {
                warn!(table = %table, error = %error, "skipping table creation");
            }
            Err(error) => return Err(error),
        }

        let table_grants = plan.object_instructions(&GrantedOn::Table, table);
        progress
            .report
            .replay
            .absorb(self.executor.execute(destination, table_grants).await?);

        if primary_key.is_empty() {
            return Ok(());
        }
        destination.use_role(owner).await?;
        let add_key = Statement::AddPrimaryKey {
            table: table.clone(),
            columns: primary_key.to_vec(),
        };
        match destination.run(&add_key).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_statement_failure() => {
                warn!(table = %table, error = %error, "skipping primary key");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}
