use std::sync::Arc;

use grantshift_core::AccountKind;
use grantshift_domain::{
    GrantRecord, GrantedOn, GranteeKind, MetadataRow, ProjectRoleSet, Role, RoleGrants,
};

use crate::replay_executor::ReplayExecutor;
use crate::replay_planner::{ReplayPlan, ReplayPlanner};
use crate::test_support::{FakeFailure, FakeWarehouse, row, session};

use super::{ObjectMigration, ObjectMigrationOptions};

const SHARE_SCHEMAS: &str = "SHOW SCHEMAS IN DATABASE \"SALES_SHARE\"";
const SHARE_TABLES: &str = "SHOW TABLES IN SCHEMA \"SALES_SHARE\".\"CRM\"";
const PRODUCTION_TABLES: &str = "SHOW TABLES IN SCHEMA \"SALES\".\"CRM\"";

fn grant(privilege: &str, granted_on: GrantedOn, name: &str, grantee: &str) -> GrantRecord {
    GrantRecord::new(
        privilege,
        granted_on,
        name,
        GranteeKind::Role,
        grantee,
        false,
        "SALES_ROLE",
    )
}

fn role(name: &str, owner: &str, grants: Vec<GrantRecord>) -> Role {
    let mut role = Role::new(name, owner);
    assert!(role.attach_grants(RoleGrants::from_records(grants)).is_ok());
    role
}

fn sales_project() -> ProjectRoleSet {
    let mut project = ProjectRoleSet::new("SALES", "SALES_ROLE");
    let seed = role(
        "SALES_ROLE",
        "MAIN",
        vec![
            grant("OWNERSHIP", GrantedOn::Database, "SALES", "SALES_ROLE"),
            grant("OWNERSHIP", GrantedOn::Schema, "SALES.CRM", "SALES_ROLE"),
            grant("OWNERSHIP", GrantedOn::Table, "SALES.CRM.ORDERS", "SALES_ROLE"),
            grant("OWNERSHIP", GrantedOn::Role, "SALES_RO", "SALES_ROLE"),
        ],
    );
    let reader = role(
        "SALES_RO",
        "SALES_ROLE",
        vec![grant("SELECT", GrantedOn::Table, "SALES.CRM.ORDERS", "SALES_RO")],
    );
    assert!(project.insert_role(seed).is_ok());
    assert!(project.insert_role(reader).is_ok());
    project
}

fn plan(project: &ProjectRoleSet) -> ReplayPlan {
    ReplayPlanner::new("MAIN")
        .plan(project)
        .unwrap_or_else(|_| unreachable!())
}

fn migration(options: ObjectMigrationOptions) -> ObjectMigration {
    ObjectMigration::new("MAIN", ReplayExecutor::new("MIGRATE")).with_options(options)
}

async fn source_account() -> Arc<FakeWarehouse> {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse
        .respond(
            "SHOW DATABASES LIKE 'SALES'",
            vec![row(&[("name", "SALES"), ("retention_time", "7")])],
        )
        .await;
    warehouse
        .respond(
            "SHOW PRIMARY KEYS IN SCHEMA \"SALES\".\"CRM\"",
            vec![row(&[
                ("table_name", "ORDERS"),
                ("column_name", "ID"),
                ("key_sequence", "1"),
            ])],
        )
        .await;
    warehouse
}

async fn destination_account(shared_tables: Vec<MetadataRow>) -> Arc<FakeWarehouse> {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse
        .respond(
            SHARE_SCHEMAS,
            vec![
                row(&[("name", "INFORMATION_SCHEMA")]),
                row(&[("name", "PUBLIC")]),
                row(&[
                    ("name", "CRM"),
                    ("options", "TRANSIENT, MANAGED ACCESS"),
                    ("retention_time", "1"),
                ]),
            ],
        )
        .await;
    warehouse.respond(SHARE_TABLES, shared_tables).await;
    warehouse
}

#[tokio::test]
async fn structure_is_created_under_source_owners() {
    let project = sales_project();
    let source_warehouse = source_account().await;
    let destination_warehouse = destination_account(vec![row(&[("name", "ORDERS")])]).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let report = migration(ObjectMigrationOptions::default())
        .migrate_structure(&mut source, &mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(
        destination_warehouse.statements().await,
        [
            "CREATE DATABASE \"SALES\" DATA_RETENTION_TIME_IN_DAYS = 7",
            "GRANT OWNERSHIP ON DATABASE \"SALES\" TO ROLE \"SALES_ROLE\"",
            "GRANT IMPORTED PRIVILEGES ON DATABASE \"SALES_SHARE\" TO ROLE \"SALES_ROLE\"",
            "CREATE TRANSIENT SCHEMA \"SALES\".\"CRM\" WITH MANAGED ACCESS DATA_RETENTION_TIME_IN_DAYS = 1",
            "CREATE TABLE \"SALES\".\"CRM\".\"ORDERS\" LIKE \"SALES_SHARE\".\"CRM\".\"ORDERS\"",
            "GRANT SELECT ON TABLE \"SALES\".\"CRM\".\"ORDERS\" TO ROLE \"SALES_RO\"",
            "ALTER TABLE \"SALES\".\"CRM\".\"ORDERS\" ADD PRIMARY KEY (\"ID\")",
        ]
    );
    let executed = destination_warehouse.executed().await;
    let create_schema = executed
        .iter()
        .find(|executed| executed.sql.starts_with("CREATE TRANSIENT SCHEMA"));
    assert_eq!(
        create_schema.and_then(|executed| executed.role.as_deref()),
        Some("SALES_ROLE")
    );
    assert_eq!(report.schemas, 1);
    assert_eq!(report.tables, 1);
    assert_eq!(report.skipped, 0);
}

#[tokio::test]
async fn grants_on_other_databases_are_not_replayed() {
    let mut project = ProjectRoleSet::new("SALES", "SALES_ROLE");
    let seed = role(
        "SALES_ROLE",
        "MAIN",
        vec![
            grant("OWNERSHIP", GrantedOn::Database, "SALES", "SALES_ROLE"),
            grant("USAGE", GrantedOn::Database, "ARCHIVE", "SALES_ROLE"),
        ],
    );
    assert!(project.insert_role(seed).is_ok());
    let plan = plan(&project);
    assert!(
        plan.objects()
            .iter()
            .filter_map(|instruction| instruction.grant())
            .any(|grant| grant.object_name() == "ARCHIVE")
    );
    let source_warehouse = source_account().await;
    let destination_warehouse = destination_account(Vec::new()).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let report = migration(ObjectMigrationOptions::default())
        .migrate_structure(&mut source, &mut destination, &project, &plan)
        .await
        .unwrap_or_else(|_| unreachable!());

    let statements = destination_warehouse.statements().await;
    assert!(
        statements
            .iter()
            .any(|sql| sql == "GRANT OWNERSHIP ON DATABASE \"SALES\" TO ROLE \"SALES_ROLE\"")
    );
    assert!(!statements.iter().any(|sql| sql.contains("ARCHIVE")));
    assert!(report.replay.failed().is_empty());
}

#[tokio::test]
async fn schema_without_tables_creates_no_tables() {
    let project = sales_project();
    let source_warehouse = source_account().await;
    let destination_warehouse = destination_account(Vec::new()).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let report = migration(ObjectMigrationOptions::default())
        .migrate_structure(&mut source, &mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.schemas, 1);
    assert_eq!(report.tables, 0);
    assert!(
        !destination_warehouse
            .statements()
            .await
            .iter()
            .any(|sql| sql.contains("TABLE"))
    );
}

#[tokio::test]
async fn failed_views_are_retried_in_a_later_pass() {
    let project = sales_project();
    let source_warehouse = source_account().await;
    let view = "CREATE VIEW RECENT AS SELECT * FROM ORDERS";
    source_warehouse
        .respond(
            "SHOW VIEWS IN DATABASE \"SALES\"",
            vec![
                row(&[
                    ("name", "RECENT"),
                    ("schema_name", "CRM"),
                    ("owner", "SALES_ROLE"),
                    ("text", view),
                ]),
                row(&[
                    ("name", "TABLES"),
                    ("schema_name", "INFORMATION_SCHEMA"),
                    ("owner", "SALES_ROLE"),
                    ("text", "CREATE VIEW TABLES AS SELECT 1"),
                ]),
            ],
        )
        .await;
    let destination_warehouse = destination_account(Vec::new()).await;
    destination_warehouse.fail_once(view, FakeFailure::NotFound).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    destination.record_warehouse_usage("SALES_ROLE", "SALES_WH");

    let report = migration(ObjectMigrationOptions::default())
        .migrate_structure(&mut source, &mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.views, 1);
    let statements = destination_warehouse.statements().await;
    assert_eq!(statements.iter().filter(|sql| *sql == view).count(), 1);
    assert!(!statements.iter().any(|sql| sql.contains("TABLES AS")));
    assert!(
        source_warehouse
            .statements()
            .await
            .contains(&"GRANT ROLE \"SALES_ROLE\" TO USER \"MIGRATE\"".to_owned())
    );
}

#[tokio::test]
async fn unsupported_routines_are_skipped() {
    let project = sales_project();
    let source_warehouse = source_account().await;
    source_warehouse
        .respond(
            "SHOW FUNCTIONS IN DATABASE \"SALES\"",
            vec![
                row(&[
                    ("name", "SCORE"),
                    ("catalog_name", "SALES"),
                    ("schema_name", "CRM"),
                    ("arguments", "SCORE() RETURN NUMBER"),
                    ("language", "SCALA"),
                ]),
                row(&[
                    ("name", "ABS"),
                    ("catalog_name", ""),
                    ("schema_name", ""),
                    ("arguments", "ABS(NUMBER) RETURN NUMBER"),
                    ("language", "SQL"),
                ]),
            ],
        )
        .await;
    let destination_warehouse = destination_account(Vec::new()).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let report = migration(ObjectMigrationOptions::default())
        .migrate_structure(&mut source, &mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.routines, 0);
    assert_eq!(report.skipped, 1);
}

#[tokio::test]
async fn empty_tables_are_filled_from_the_share() {
    let project = sales_project();
    let destination_warehouse =
        destination_account(vec![row(&[("name", "ORDERS"), ("rows", "10")])]).await;
    destination_warehouse
        .respond(
            PRODUCTION_TABLES,
            vec![row(&[("name", "ORDERS"), ("rows", "0")])],
        )
        .await;
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    destination.record_warehouse_usage("SALES_ROLE", "SALES_WH");

    let report = migration(ObjectMigrationOptions::default())
        .migrate_data(&mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.inserted, 1);
    assert_eq!(
        destination_warehouse.statements().await,
        ["INSERT INTO \"SALES\".\"CRM\".\"ORDERS\" SELECT * FROM \"SALES_SHARE\".\"CRM\".\"ORDERS\""]
    );
}

#[tokio::test]
async fn tables_without_warehouse_are_skipped() {
    let project = sales_project();
    let destination_warehouse =
        destination_account(vec![row(&[("name", "ORDERS"), ("rows", "10")])]).await;
    destination_warehouse
        .respond(
            PRODUCTION_TABLES,
            vec![row(&[("name", "ORDERS"), ("rows", "0")])],
        )
        .await;
    let mut destination = session(AccountKind::Destination, &destination_warehouse);

    let report = migration(ObjectMigrationOptions::default())
        .migrate_data(&mut destination, &project, &plan(&project))
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.skipped, 1);
    assert!(destination_warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn synchronize_clones_unchanged_tables_from_old_database() {
    let project = sales_project();
    let destination_warehouse =
        destination_account(vec![row(&[("name", "ORDERS"), ("rows", "10")])]).await;
    destination_warehouse
        .respond(
            PRODUCTION_TABLES,
            vec![row(&[("name", "ORDERS"), ("rows", "0")])],
        )
        .await;
    for table in ["\"SALES_OLD\"", "\"SALES_SHARE\""] {
        destination_warehouse
            .respond(
                &format!(
                    "SELECT MAX(\"_timestamp\") AS \"max_timestamp\" FROM {table}.\"CRM\".\"ORDERS\""
                ),
                vec![row(&[("max_timestamp", "1700000000")])],
            )
            .await;
    }
    destination_warehouse
        .respond(
            "SHOW DATABASES LIKE 'SALES_OLD'",
            vec![row(&[("name", "SALES_OLD")])],
        )
        .await;
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    destination.record_warehouse_usage("SALES_ROLE", "SALES_WH");

    let report = migration(ObjectMigrationOptions {
        synchronize: true,
        ..ObjectMigrationOptions::default()
    })
    .migrate_data(&mut destination, &project, &plan(&project))
    .await
    .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.cloned, 1);
    assert_eq!(
        destination_warehouse.statements().await,
        [
            "GRANT USAGE ON DATABASE \"SALES_OLD\" TO ROLE \"SALES_ROLE\"",
            "GRANT USAGE ON SCHEMA \"SALES_OLD\".\"CRM\" TO ROLE \"SALES_ROLE\"",
            "GRANT SELECT ON TABLE \"SALES_OLD\".\"CRM\".\"ORDERS\" TO ROLE \"SALES_ROLE\"",
            "DROP TABLE IF EXISTS \"SALES\".\"CRM\".\"ORDERS\"",
            "CREATE TABLE \"SALES\".\"CRM\".\"ORDERS\" CLONE \"SALES_OLD\".\"CRM\".\"ORDERS\"",
            "GRANT SELECT ON TABLE \"SALES\".\"CRM\".\"ORDERS\" TO ROLE \"SALES_RO\"",
        ]
    );
}

#[tokio::test]
async fn synchronize_reloads_changed_tables() {
    let project = sales_project();
    let destination_warehouse =
        destination_account(vec![row(&[("name", "ORDERS"), ("rows", "10")])]).await;
    destination_warehouse
        .respond(
            PRODUCTION_TABLES,
            vec![row(&[("name", "ORDERS"), ("rows", "8")])],
        )
        .await;
    destination_warehouse
        .respond(
            "SELECT MAX(\"_timestamp\") AS \"max_timestamp\" FROM \"SALES\".\"CRM\".\"ORDERS\"",
            vec![row(&[("max_timestamp", "1600000000")])],
        )
        .await;
    destination_warehouse
        .respond(
            "SELECT MAX(\"_timestamp\") AS \"max_timestamp\" FROM \"SALES_SHARE\".\"CRM\".\"ORDERS\"",
            vec![row(&[("max_timestamp", "1700000000")])],
        )
        .await;
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    destination.record_warehouse_usage("SALES_ROLE", "SALES_WH");

    let report = migration(ObjectMigrationOptions {
        synchronize: true,
        ..ObjectMigrationOptions::default()
    })
    .migrate_data(&mut destination, &project, &plan(&project))
    .await
    .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.reloaded, 1);
    assert_eq!(
        destination_warehouse.statements().await,
        [
            "TRUNCATE TABLE \"SALES\".\"CRM\".\"ORDERS\"",
            "INSERT INTO \"SALES\".\"CRM\".\"ORDERS\" SELECT * FROM \"SALES_SHARE\".\"CRM\".\"ORDERS\"",
        ]
    );
}
