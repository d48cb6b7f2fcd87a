//! Application services and ports.

#![forbid(unsafe_code)]

mod checker;
mod cleanup;
mod migration_service;
mod naming;
mod object_migration;
mod prepare;
mod replay_executor;
mod replay_planner;
mod role_graph;
mod session;
mod session_ports;

#[cfg(test)]
mod test_support;

pub use checker::{
    Comparison, ComparisonGroup, ID_COLUMN, MigrationChecker, Mismatch, diff_rows,
};
pub use cleanup::{CleanupPlanner, CleanupStep, PostMigrationPlan};
pub use migration_service::{
    CheckSummary, MigrationService, MigrationSessions, MigrationSettings, MigrationSummary,
};
pub use naming::{
    OLD_DATABASE_SUFFIX, SHARE_DATABASE_SUFFIX, TIMESTAMP_COLUMN, is_dev_branch_schema,
    migration_share, old_database, share_database,
};
pub use object_migration::{
    DataCopyReport, ObjectMigration, ObjectMigrationOptions, ObjectMigrationReport,
};
pub use prepare::PrepareMigration;
pub use replay_executor::{
    ExecutionReport, FailedGrantLog, FailureDisposition, ReplayExecutor, classify_failure,
};
pub use replay_planner::{
    ReplayPlan, ReplayPlanner, UNSUPPORTED_PRIVILEGES, generate_password,
    is_unsupported_privilege,
};
pub use role_graph::RoleGraphBuilder;
pub use session::{ACCOUNT_ADMIN_ROLE, Session, WarehouseSelection};
pub use session_ports::{
    RowDiffOutcome, RowDiffRequest, RowDiffRunner, SessionFactory, SessionHandle,
    WarehouseSession,
};
