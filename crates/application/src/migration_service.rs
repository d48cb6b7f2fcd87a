use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use grantshift_core::{AccountKind, AppError, AppResult};
use grantshift_domain::{GrantCategory, Password, ProjectRoleSet};
use tracing::{info, warn};

use crate::checker::{MigrationChecker, Mismatch};
use crate::cleanup::CleanupPlanner;
use crate::object_migration::{
    DataCopyReport, ObjectMigration, ObjectMigrationOptions, ObjectMigrationReport,
};
use crate::prepare::PrepareMigration;
use crate::replay_executor::{ExecutionReport, FailedGrantLog, ReplayExecutor};
use crate::replay_planner::ReplayPlanner;
use crate::role_graph::RoleGraphBuilder;
use crate::session_ports::{RowDiffRunner, SessionFactory};
use crate::Session;

mod bootstrap;

/// Settings of one migration.
#[derive(Debug, Clone)]
pub struct MigrationSettings {
    /// Databases to migrate.
    pub databases: Vec<String>,
    /// Clean the destination first and copy data incrementally.
    pub synchronize: bool,
    /// Only log pre-migration cleanup statements.
    pub dry_run_cleanup: bool,
    /// Skip development branch schemas.
    pub skip_dev_branches: bool,
    /// Preferred warehouse name suffix.
    pub warehouse_size: String,
    /// Passwords for recreated users, by user name.
    pub passwords: HashMap<String, Password>,
    /// Users cleanup never drops.
    pub protected_users: Vec<String>,
}

impl MigrationSettings {
    /// Creates settings for the given databases with defaults for everything else.
    #[must_use]
    pub fn new(databases: Vec<String>) -> Self {
        Self {
            databases,
            synchronize: false,
            dry_run_cleanup: true,
            skip_dev_branches: false,
            warehouse_size: "SMALL".to_owned(),
            passwords: HashMap::new(),
            protected_users: Vec::new(),
        }
    }

    fn object_options(&self) -> ObjectMigrationOptions {
        ObjectMigrationOptions {
            synchronize: self.synchronize,
            skip_dev_branches: self.skip_dev_branches,
            warehouse_size: self.warehouse_size.clone(),
        }
    }
}

/// The sessions a migration talks to.
pub struct MigrationSessions {
    /// Account the project is copied from.
    pub source: Session,
    /// Account the project is copied to.
    pub destination: Session,
    /// Account in the destination region used for replication, if configured.
    pub migration: Option<Session>,
}

impl MigrationSessions {
    /// Opens all configured sessions; source and destination are required.
    pub async fn open(factory: &dyn SessionFactory) -> AppResult<Self> {
        let required = |account: AccountKind, handle: Option<_>| {
            handle
                .map(|handle| Session::new(account, handle))
                .ok_or_else(|| {
                    AppError::MissingSession(format!("the {account} account is not configured"))
                })
        };

        let source = required(AccountKind::Source, factory.open(AccountKind::Source).await?)?;
        let destination = required(
            AccountKind::Destination,
            factory.open(AccountKind::Destination).await?,
        )?;
        let migration = factory
            .open(AccountKind::Migration)
            .await?
            .map(|handle| Session::new(AccountKind::Migration, handle));

        Ok(Self {
            source,
            destination,
            migration,
        })
    }
}

/// Outcome of a full migration run.
#[derive(Debug, Clone)]
pub struct MigrationSummary {
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: DateTime<Utc>,
    /// Statements executed by pre-migration cleanup.
    pub cleaned: usize,
    /// Replay of roles, users and account-level grants.
    pub access: ExecutionReport,
    /// Objects created per database.
    pub objects: Vec<ObjectMigrationReport>,
    /// Data copy per database.
    pub data: Vec<DataCopyReport>,
    /// Retry pass over deferred grants.
    pub retried: ExecutionReport,
    /// Post-migration cleanup statements that failed.
    pub cleanup_failures: usize,
}

/// Outcome of a verification run.
#[derive(Debug, Clone, Default)]
pub struct CheckSummary {
    /// Differences in users, roles, grants and row counts.
    pub structure: Vec<Mismatch>,
    /// Row-level differences.
    pub data: Vec<Mismatch>,
}

impl CheckSummary {
    /// Returns true when both accounts match.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.structure.is_empty() && self.data.is_empty()
    }
}

/// Runs migration, verification and cleanup of a project between accounts.
pub struct MigrationService {
    settings: MigrationSettings,
    row_diff: Arc<dyn RowDiffRunner>,
}

impl MigrationService {
    /// Creates a service with the given settings and row-level diff capability.
    #[must_use]
    pub fn new(settings: MigrationSettings, row_diff: Arc<dyn RowDiffRunner>) -> Self {
        Self { settings, row_diff }
    }

    /// Migrates every configured database.
    ///
    /// Ownership and region preconditions are checked before the destination is
    /// touched.
    pub async fn run(&self, sessions: &mut MigrationSessions) -> AppResult<MigrationSummary> {
        let started_at = Utc::now();
        let databases = &self.settings.databases;
        let MigrationSessions {
            source,
            destination,
            migration,
        } = sessions;

        info!(databases = ?databases, "discovering source roles");
        source.use_default_role().await?;
        let mut graph = RoleGraphBuilder::new();
        let sets = graph.discover(source, databases).await?;
        let main_role = graph.main_role(source, &sets).await?;
        ensure_replication_path(source, destination, migration.is_some()).await?;

        let planner = ReplayPlanner::new(main_role.name())
            .with_passwords(self.settings.passwords.clone());
        let plans = sets
            .iter()
            .map(|set| planner.plan(set))
            .collect::<AppResult<Vec<_>>>()?;

        let cleaned = if self.settings.synchronize {
            info!("running pre-migration cleanup");
            self.cleanup_planner(main_role.name())
                .run_pre_migration(destination, databases, self.settings.dry_run_cleanup)
                .await?
        } else {
            0
        };

        let prepare = PrepareMigration::new(databases.clone());
        info!("preparing replication and shares");
        prepare
            .create_replication(source, destination, migration.as_mut())
            .await?;
        prepare
            .create_shares(source, destination, migration.as_mut())
            .await?;

        info!(role = %main_role.name(), "creating main role");
        self.create_main_role(source, destination, &main_role).await?;
        prepare
            .create_databases_from_shares(source, destination, migration.as_mut())
            .await?;

        info!("replaying roles, users and grants");
        let executor = ReplayExecutor::new(destination.user());
        let mut access = ExecutionReport::default();
        for plan in &plans {
            access.absorb(executor.execute(destination, plan.access()).await?);
        }
        self.grant_roles_to_users(source, destination, &sets).await?;

        let objects_migration = ObjectMigration::new(main_role.name(), executor.clone())
            .with_options(self.settings.object_options());
        let mut deferred = FailedGrantLog::default();
        deferred.extend(access.failed().clone());
        let mut objects = Vec::with_capacity(sets.len());
        let mut data = Vec::with_capacity(sets.len());
        for (set, plan) in sets.iter().zip(&plans) {
            let report = objects_migration
                .migrate_structure(source, destination, set, plan)
                .await?;
            deferred.extend(report.replay.failed().clone());
            objects.push(report);

            let copied = objects_migration.migrate_data(destination, set, plan).await?;
            deferred.extend(copied.replay.failed().clone());
            data.push(copied);
        }

        let retried = executor.reapply_failed(destination, &deferred).await?;

        info!("running post-migration cleanup");
        let cleanup_failures = self
            .cleanup_planner(main_role.name())
            .run_post_migration(destination, databases)
            .await?;

        report_unused_grants(&sets);

        let finished_at = Utc::now();
        info!(
            elapsed_seconds = (finished_at - started_at).num_seconds(),
            granted = access.succeeded(),
            still_failing = retried.failed().len(),
            "migration finished"
        );
        Ok(MigrationSummary {
            started_at,
            finished_at,
            cleaned,
            access,
            objects,
            data,
            retried,
            cleanup_failures,
        })
    }

    /// Compares the migrated structure and data of both accounts.
    pub async fn check(&self, sessions: &mut MigrationSessions) -> AppResult<CheckSummary> {
        let databases = &self.settings.databases;
        let MigrationSessions {
            source,
            destination,
            ..
        } = sessions;

        source.use_default_role().await?;
        let mut graph = RoleGraphBuilder::new();
        let sets = graph.discover(source, databases).await?;
        let main_role = graph.main_role(source, &sets).await?;

        let checker = MigrationChecker::new(Arc::clone(&self.row_diff));
        let structure = checker
            .compare_structure(source, destination, &main_role, &sets)
            .await?;
        let data = checker
            .compare_data(source, destination, &main_role, databases)
            .await?;

        let summary = CheckSummary { structure, data };
        if summary.is_clean() {
            info!("accounts match");
        } else {
            warn!(
                structure = summary.structure.len(),
                data = summary.data.len(),
                "accounts differ"
            );
        }
        Ok(summary)
    }

    /// Runs pre-migration cleanup on its own, honouring the dry-run setting.
    pub async fn cleanup(&self, sessions: &mut MigrationSessions) -> AppResult<usize> {
        let databases = &self.settings.databases;
        let MigrationSessions {
            source,
            destination,
            ..
        } = sessions;

        source.use_default_role().await?;
        let mut graph = RoleGraphBuilder::new();
        let sets = graph.discover(source, databases).await?;
        let main_role = graph.main_role(source, &sets).await?;

        self.cleanup_planner(main_role.name())
            .run_pre_migration(destination, databases, self.settings.dry_run_cleanup)
            .await
    }

    fn cleanup_planner(&self, main_role: &str) -> CleanupPlanner {
        CleanupPlanner::new(main_role).with_protected_users(&self.settings.protected_users)
    }
}

async fn ensure_replication_path(
    source: &mut Session,
    destination: &mut Session,
    has_migration_account: bool,
) -> AppResult<()> {
    if has_migration_account || source.region().await? == destination.region().await? {
        return Ok(());
    }

    Err(AppError::MissingSession(
        "source and destination regions differ but no migration account is configured".to_owned(),
    ))
}

// Grants the replay has no statement for; they are reported for manual follow-up.
fn report_unused_grants(sets: &[ProjectRoleSet]) {
    for set in sets {
        for grant in set.grants_in(GrantCategory::Other) {
            warn!(database = %set.database(), grant = %grant, "unused grant");
        }
        for grant in set.future_other_grants() {
            warn!(database = %set.database(), grant = %grant, "unused future grant");
        }
    }
}

#[cfg(test)]
mod tests;
