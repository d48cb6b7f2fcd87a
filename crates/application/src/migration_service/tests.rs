use std::sync::Arc;

use async_trait::async_trait;
use grantshift_core::{AccountKind, AppError, AppResult};
use grantshift_domain::{
    GrantRecord, GrantedOn, GranteeKind, Password, ProjectRoleSet, Role, RoleGrants,
    UserDefinition,
};

use crate::session_ports::{
    RowDiffOutcome, RowDiffRequest, RowDiffRunner, SessionFactory, SessionHandle,
};
use crate::test_support::{FakeFailure, FakeWarehouse, row, session};

use super::{MigrationService, MigrationSessions, MigrationSettings, ensure_replication_path};

struct NoRowDiff;

#[async_trait]
impl RowDiffRunner for NoRowDiff {
    async fn compare(&self, _request: &RowDiffRequest) -> AppResult<RowDiffOutcome> {
        Err(AppError::Internal("row diff is not available in tests".to_owned()))
    }
}

struct FakeFactory {
    source: Option<Arc<FakeWarehouse>>,
    destination: Option<Arc<FakeWarehouse>>,
    migration: Option<Arc<FakeWarehouse>>,
}

#[async_trait]
impl SessionFactory for FakeFactory {
    async fn open(&self, account: AccountKind) -> AppResult<Option<SessionHandle>> {
        let warehouse = match account {
            AccountKind::Source => &self.source,
            AccountKind::Destination => &self.destination,
            AccountKind::Migration => &self.migration,
        };
        Ok(warehouse.as_ref().map(|warehouse| SessionHandle {
            connection: warehouse.clone(),
            user: "MIGRATE".to_owned(),
            default_role: "ACCOUNTADMIN".to_owned(),
            default_warehouse: None,
        }))
    }
}

fn service(settings: MigrationSettings) -> MigrationService {
    MigrationService::new(settings, Arc::new(NoRowDiff))
}

fn main_role() -> Role {
    let mut role = Role::new("MAIN", "ACCOUNTADMIN");
    let attached = role.attach_grants(RoleGrants::from_records([GrantRecord::new(
        "USAGE",
        GrantedOn::Warehouse,
        "MAIN_WH",
        GranteeKind::Role,
        "MAIN",
        false,
        "ACCOUNTADMIN",
    )]));
    assert!(attached.is_ok());
    role
}

#[test]
fn settings_default_to_dry_run_cleanup() {
    let settings = MigrationSettings::new(vec!["SALES".to_owned()]);
    assert!(settings.dry_run_cleanup);
    assert!(!settings.synchronize);
    assert_eq!(settings.warehouse_size, "SMALL");
}

#[tokio::test]
async fn sessions_require_source_and_destination() {
    let factory = FakeFactory {
        source: Some(Arc::new(FakeWarehouse::default())),
        destination: None,
        migration: None,
    };

    let result = MigrationSessions::open(&factory).await;
    assert!(matches!(result, Err(AppError::MissingSession(_))));
}

#[tokio::test]
async fn migration_session_is_optional() {
    let factory = FakeFactory {
        source: Some(Arc::new(FakeWarehouse::default())),
        destination: Some(Arc::new(FakeWarehouse::default())),
        migration: None,
    };

    let sessions = MigrationSessions::open(&factory)
        .await
        .unwrap_or_else(|_| unreachable!());
    assert!(sessions.migration.is_none());
    assert_eq!(sessions.destination.account(), AccountKind::Destination);
}

#[tokio::test]
async fn cross_region_needs_migration_account() {
    let source_warehouse = Arc::new(FakeWarehouse::default());
    source_warehouse
        .respond(
            "SELECT CURRENT_REGION() AS \"region\"",
            vec![row(&[("region", "AWS_US_WEST_2")])],
        )
        .await;
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .respond(
            "SELECT CURRENT_REGION() AS \"region\"",
            vec![row(&[("region", "AWS_EU_CENTRAL_1")])],
        )
        .await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let missing = ensure_replication_path(&mut source, &mut destination, false).await;
    assert!(matches!(missing, Err(AppError::MissingSession(_))));
    let configured = ensure_replication_path(&mut source, &mut destination, true).await;
    assert!(configured.is_ok());
    assert!(destination_warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn main_role_is_bootstrapped_with_warehouses_and_user() {
    let source_warehouse = Arc::new(FakeWarehouse::default());
    source_warehouse
        .respond(
            "SHOW WAREHOUSES LIKE 'MAIN_WH'",
            vec![row(&[
                ("name", "MAIN_WH"),
                ("size", "X-Small"),
                ("type", "STANDARD"),
                ("auto_suspend", "60"),
                ("auto_resume", "true"),
            ])],
        )
        .await;
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let mut settings = MigrationSettings::new(vec!["SALES".to_owned()]);
    settings.passwords.insert(
        "MAIN".to_owned(),
        Password::new("secret").unwrap_or_else(|_| unreachable!()),
    );
    let result = service(settings)
        .create_main_role(&mut source, &mut destination, &main_role())
        .await;

    assert!(result.is_ok());
    assert_eq!(
        destination_warehouse.statements().await,
        vec![
            "CREATE ROLE IF NOT EXISTS \"MAIN\"",
            "GRANT ROLE \"MAIN\" TO USER \"MIGRATE\"",
            "GRANT CREATE DATABASE ON ACCOUNT TO ROLE \"MAIN\"",
            "GRANT CREATE ROLE ON ACCOUNT TO ROLE \"MAIN\" WITH GRANT OPTION",
            "GRANT CREATE USER ON ACCOUNT TO ROLE \"MAIN\" WITH GRANT OPTION",
            "CREATE WAREHOUSE IF NOT EXISTS \"MAIN_WH\" WITH WAREHOUSE_SIZE = 'X-Small' WAREHOUSE_TYPE = 'STANDARD' AUTO_SUSPEND = 60 AUTO_RESUME = true",
            "GRANT USAGE ON WAREHOUSE \"MAIN_WH\" TO ROLE \"MAIN\"",
            "CREATE USER IF NOT EXISTS \"MAIN\" PASSWORD = 'secret' DEFAULT_ROLE = 'MAIN'",
            "GRANT ROLE \"MAIN\" TO USER \"MAIN\"",
            "GRANT ROLE \"MAIN\" TO ROLE \"SYSADMIN\"",
        ]
    );
    assert_eq!(destination.usable_warehouses("MAIN"), ["MAIN_WH"]);
}

#[tokio::test]
async fn existing_main_role_must_be_granted_to_migration_user() {
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .respond("SHOW ROLES LIKE 'MAIN'", vec![row(&[("name", "MAIN")])])
        .await;
    destination_warehouse
        .respond(
            "SHOW GRANTS TO USER \"MIGRATE\"",
            vec![row(&[
                ("role", "SYSADMIN"),
                ("granted_to", "USER"),
                ("grantee_name", "MIGRATE"),
            ])],
        )
        .await;
    let mut source = session(AccountKind::Source, &Arc::new(FakeWarehouse::default()));
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let result = service(MigrationSettings::new(Vec::new()))
        .create_main_role(&mut source, &mut destination, &main_role())
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
    assert!(destination_warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn existing_main_role_held_by_migration_user_is_reused() {
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .respond("SHOW ROLES LIKE 'MAIN'", vec![row(&[("name", "MAIN")])])
        .await;
    destination_warehouse
        .respond(
            "SHOW GRANTS TO USER \"MIGRATE\"",
            vec![row(&[
                ("role", "MAIN"),
                ("granted_to", "USER"),
                ("grantee_name", "MIGRATE"),
            ])],
        )
        .await;
    let mut source = session(AccountKind::Source, &Arc::new(FakeWarehouse::default()));
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let result = service(MigrationSettings::new(Vec::new()))
        .create_main_role(&mut source, &mut destination, &main_role())
        .await;

    assert!(result.is_ok());
    assert!(destination_warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn user_role_grants_run_under_original_grantor() {
    let source_warehouse = Arc::new(FakeWarehouse::default());
    source_warehouse
        .respond(
            "SHOW GRANTS TO USER \"SALES\"",
            vec![
                row(&[
                    ("role", "SALES_RO"),
                    ("granted_to", "USER"),
                    ("grantee_name", "SALES"),
                    ("granted_by", "SALES_ROLE"),
                ]),
                row(&[
                    ("role", "REPORTING"),
                    ("granted_to", "USER"),
                    ("grantee_name", "SALES"),
                    ("granted_by", ""),
                ]),
            ],
        )
        .await;
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .fail(
            "GRANT ROLE \"REPORTING\" TO USER \"SALES\"",
            FakeFailure::Denied,
        )
        .await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    let mut project = ProjectRoleSet::new("SALES", "SALES_ROLE");
    project.add_user(UserDefinition::new("SALES", "SALES_ROLE"));

    let result = service(MigrationSettings::new(vec!["SALES".to_owned()]))
        .grant_roles_to_users(&mut source, &mut destination, &[project])
        .await;

    assert!(result.is_ok());
    let grants: Vec<_> = destination_warehouse
        .executed()
        .await
        .into_iter()
        .filter(|executed| executed.sql.starts_with("GRANT"))
        .collect();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].sql, "GRANT ROLE \"SALES_RO\" TO USER \"SALES\"");
    assert_eq!(grants[0].role.as_deref(), Some("SALES_ROLE"));
}
