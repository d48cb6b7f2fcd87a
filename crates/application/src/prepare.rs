use grantshift_core::{AppError, AppResult};
use grantshift_domain::{ShareScope, Statement, WarehouseSpec};
use tracing::info;

use crate::Session;
use crate::naming::{migration_share, share_database};

/// Warehouse created in the migration account to run replica refreshes.
const REPLICATION_WAREHOUSE: &str = "migrate";

/// Exposes source databases to the destination account.
///
/// Accounts in the same region share directly from the source. Otherwise each
/// database is replicated into the migration account, which lives in the
/// destination region, and shared from there.
#[derive(Debug, Clone)]
pub struct PrepareMigration {
    databases: Vec<String>,
}

impl PrepareMigration {
    /// Creates the preparation step for the given databases.
    #[must_use]
    pub fn new(databases: Vec<String>) -> Self {
        Self { databases }
    }

    /// Replicates databases into the migration account when regions differ.
    pub async fn create_replication(
        &self,
        source: &mut Session,
        destination: &mut Session,
        migration: Option<&mut Session>,
    ) -> AppResult<()> {
        if !is_cross_region(source, destination).await? {
            return Ok(());
        }
        let migration = require_migration(migration)?;
        let migration_locator = migration.replication_locator().await?;
        let source_locator = source.replication_locator().await?;

        source.use_default_role().await?;
        migration.use_default_role().await?;
        for database in &self.databases {
            info!(database = %database, "replicating database to the migration account");
            source
                .run(&Statement::EnableReplication {
                    database: database.clone(),
                    account: migration_locator.clone(),
                })
                .await?;

            migration
                .run(&Statement::CreateReplica {
                    database: database.clone(),
                    primary_account: source_locator.clone(),
                })
                .await?;
            migration.use_database(database).await?;
            migration.use_schema(database, "PUBLIC").await?;
            migration
                .run(&Statement::CreateWarehouse(WarehouseSpec {
                    name: REPLICATION_WAREHOUSE.to_owned(),
                    size: "Small".to_owned(),
                    warehouse_type: "STANDARD".to_owned(),
                    auto_suspend: "300".to_owned(),
                    auto_resume: "true".to_owned(),
                }))
                .await?;
            migration.use_warehouse(REPLICATION_WAREHOUSE).await?;
            migration
                .run(&Statement::RefreshDatabase(database.clone()))
                .await?;
        }

        Ok(())
    }

    /// Creates `MIGRATION_SHARE_<DB>` shares readable by the destination account.
    pub async fn create_shares(
        &self,
        source: &mut Session,
        destination: &mut Session,
        migration: Option<&mut Session>,
    ) -> AppResult<()> {
        let cross_region = is_cross_region(source, destination).await?;
        let consumer = destination.account_name().await?;
        let provider = provider(source, migration, cross_region)?;

        provider.use_default_role().await?;
        for database in &self.databases {
            let share = migration_share(&database.to_uppercase());
            info!(database = %database, share = %share, "sharing database");
            for statement in [
                Statement::CreateShare(share.clone()),
                Statement::GrantToShare {
                    privilege: "USAGE".to_owned(),
                    scope: ShareScope::Database(database.clone()),
                    share: share.clone(),
                },
                Statement::GrantToShare {
                    privilege: "USAGE".to_owned(),
                    scope: ShareScope::AllSchemasIn(database.clone()),
                    share: share.clone(),
                },
                Statement::GrantToShare {
                    privilege: "SELECT".to_owned(),
                    scope: ShareScope::AllTablesIn(database.clone()),
                    share: share.clone(),
                },
                Statement::AddShareAccount {
                    share: share.clone(),
                    account: consumer.clone(),
                },
            ] {
                provider.run(&statement).await?;
            }
        }

        Ok(())
    }

    /// Recreates `<DB>_SHARE` in the destination from the provider's share.
    pub async fn create_databases_from_shares(
        &self,
        source: &mut Session,
        destination: &mut Session,
        migration: Option<&mut Session>,
    ) -> AppResult<()> {
        let cross_region = is_cross_region(source, destination).await?;
        let provider = provider(source, migration, cross_region)?;
        let provider_account = provider.account_name().await?;

        destination.use_default_role().await?;
        for database in &self.databases {
            let share_clone = share_database(database);
            destination.drop_share_clone(&share_clone).await?;
            destination
                .run(&Statement::CreateDatabaseFromShare {
                    database: share_clone,
                    provider_account: provider_account.clone(),
                    share: migration_share(database),
                })
                .await?;
        }

        Ok(())
    }
}

async fn is_cross_region(source: &mut Session, destination: &mut Session) -> AppResult<bool> {
    Ok(source.region().await? != destination.region().await?)
}

fn require_migration(migration: Option<&mut Session>) -> AppResult<&mut Session> {
    migration.ok_or_else(|| {
        AppError::MissingSession(
            "source and destination regions differ but no migration account is configured"
                .to_owned(),
        )
    })
}

fn provider<'a>(
    source: &'a mut Session,
    migration: Option<&'a mut Session>,
    cross_region: bool,
) -> AppResult<&'a mut Session> {
    if cross_region {
        require_migration(migration)
    } else {
        Ok(source)
    }
}
