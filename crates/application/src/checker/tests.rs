use std::sync::Arc;

use async_trait::async_trait;
use grantshift_core::{AccountKind, AppResult};
use grantshift_domain::{
    GrantRecord, GrantedOn, GranteeKind, MetadataRow, ProjectRoleSet, Role, RoleGrants,
};
use tokio::sync::Mutex;

use crate::session_ports::{RowDiffOutcome, RowDiffRequest, RowDiffRunner};
use crate::test_support::{FakeWarehouse, grant_row, row, session};

use super::{Comparison, MigrationChecker, Mismatch, diff_rows};

#[derive(Default)]
struct FakeRowDiff {
    requests: Mutex<Vec<RowDiffRequest>>,
}

#[async_trait]
impl RowDiffRunner for FakeRowDiff {
    async fn compare(&self, request: &RowDiffRequest) -> AppResult<RowDiffOutcome> {
        self.requests.lock().await.push(request.clone());
        Ok(RowDiffOutcome {
            succeeded: false,
            report: "1 row differs".to_owned(),
        })
    }
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

fn sales_project() -> ProjectRoleSet {
    let mut project = ProjectRoleSet::new("SALES", "SALES_ROLE");
    for (name, owner) in [("SALES_ROLE", "MAIN"), ("SALES_RO", "SALES_ROLE")] {
        assert!(project.insert_role(Role::new(name, owner)).is_ok());
    }
    project
}

fn role_row(name: &str, owner: &str) -> MetadataRow {
    let id = format!("{name}{owner}");
    row(&[("id", id.as_str()), ("name", name), ("owner", owner)])
}

async fn account(roles: Vec<MetadataRow>) -> Arc<FakeWarehouse> {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse
        .respond(
            "SHOW GRANTS ON DATABASE \"SALES\"",
            vec![grant_row("OWNERSHIP", "DATABASE", "SALES", "SALES_ROLE", "MAIN")],
        )
        .await;
    warehouse
        .respond(
            "SHOW GRANTS TO ROLE \"SALES_ROLE\"",
            vec![grant_row("OWNERSHIP", "ROLE", "SALES_RO", "SALES_ROLE", "SALES_ROLE")],
        )
        .await;
    let project_roles = ["SALES_ROLE".to_owned(), "SALES_RO".to_owned()];
    warehouse
        .respond(&Comparison::roles(&project_roles).sql, roles)
        .await;
    warehouse
}

#[test]
fn diff_reports_missing_and_changed_records() {
    let source = [role_row("A", "MAIN"), row(&[("id", "B"), ("comment", "x")])];
    let destination = [
        row(&[("id", "B"), ("comment", "y")]),
        role_row("C", "MAIN"),
        role_row("D", "MAIN"),
    ];

    let mismatches = diff_rows("Roles", &source, &destination);

    assert_eq!(mismatches.len(), 6);
    assert!(matches!(
        &mismatches[0],
        Mismatch::CountDiffers {
            source: 2,
            destination: 3,
            ..
        }
    ));
    assert!(matches!(
        &mismatches[1],
        Mismatch::MissingIn { account: AccountKind::Destination, id, .. } if id == "AMAIN"
    ));
    assert!(matches!(
        &mismatches[2],
        Mismatch::FieldsDiffer { missing_in: AccountKind::Destination, fields, .. }
            if fields == &[("comment".to_owned(), "x".to_owned())]
    ));
    assert!(matches!(
        &mismatches[3],
        Mismatch::FieldsDiffer { missing_in: AccountKind::Source, .. }
    ));
    assert!(matches!(
        &mismatches[5],
        Mismatch::MissingIn { account: AccountKind::Source, id, .. } if id == "DMAIN"
    ));
}

#[test]
fn identical_rows_have_no_mismatches() {
    let rows = [role_row("A", "MAIN"), role_row("B", "A")];
    assert!(diff_rows("Roles", &rows, &rows).is_empty());
}

#[tokio::test]
async fn replayed_structure_has_no_mismatches() {
    let roles = vec![role_row("SALES_ROLE", "MAIN"), role_row("SALES_RO", "SALES_ROLE")];
    let source_warehouse = account(roles.clone()).await;
    let destination_warehouse = account(roles).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    let checker = MigrationChecker::new(Arc::new(FakeRowDiff::default()));

    let mismatches = checker
        .compare_structure(&mut source, &mut destination, &main_role(), &[sales_project()])
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(mismatches.is_empty());
    assert!(
        destination_warehouse
            .queries()
            .await
            .iter()
            .any(|query| query.contains("ACCOUNT_USAGE.ROLES"))
    );
}

#[tokio::test]
async fn changed_owner_is_reported() {
    let source_warehouse =
        account(vec![role_row("SALES_ROLE", "MAIN"), role_row("SALES_RO", "SALES_ROLE")]).await;
    let destination_warehouse =
        account(vec![role_row("SALES_ROLE", "MAIN"), role_row("SALES_RO", "MAIN")]).await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    let checker = MigrationChecker::new(Arc::new(FakeRowDiff::default()));

    let mismatches = checker
        .compare_structure(&mut source, &mut destination, &main_role(), &[sales_project()])
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(mismatches.len(), 2);
    assert!(mismatches.iter().all(|mismatch| matches!(
        mismatch,
        Mismatch::MissingIn { id, .. } if id.starts_with("SALES_RO")
    )));
}

#[tokio::test]
async fn role_missing_from_destination_is_reported() {
    let project_roles = ["SALES_ROLE".to_owned(), "SALES_RO".to_owned()];
    let source_warehouse =
        account(vec![role_row("SALES_ROLE", "MAIN"), role_row("SALES_RO", "SALES_ROLE")]).await;
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .respond(
            &Comparison::roles(&project_roles).sql,
            vec![role_row("SALES_ROLE", "MAIN")],
        )
        .await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    let checker = MigrationChecker::new(Arc::new(FakeRowDiff::default()));

    let mismatches = checker
        .compare_structure(&mut source, &mut destination, &main_role(), &[sales_project()])
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(mismatches.iter().any(|mismatch| matches!(
        mismatch,
        Mismatch::MissingIn { account: AccountKind::Destination, id, .. }
            if id == "SALES_ROSALES_ROLE"
    )));
}

#[tokio::test]
async fn data_check_diffs_tables_with_primary_keys_only() {
    let source_warehouse = Arc::new(FakeWarehouse::default());
    for (sql, rows) in [
        (
            "SELECT CURRENT_REGION() AS \"region\"",
            vec![row(&[("region", "AWS_US_EAST_1")])],
        ),
        (
            "SHOW REGIONS LIKE 'AWS_US_EAST_1'",
            vec![row(&[("region", "us-east-1")])],
        ),
        (
            "SELECT CURRENT_ACCOUNT() AS \"account\"",
            vec![row(&[("account", "SRC")])],
        ),
        (
            "SHOW SCHEMAS IN DATABASE \"SALES\"",
            vec![
                row(&[("name", "PUBLIC"), ("owner", "SALES_ROLE")]),
                row(&[("name", "RAW"), ("owner", "SALES_ROLE")]),
            ],
        ),
        (
            "SHOW TABLES IN SCHEMA \"SALES\".\"RAW\"",
            vec![row(&[("name", "ORDERS")]), row(&[("name", "LOGS")])],
        ),
        (
            "SHOW PRIMARY KEYS IN TABLE \"SALES\".\"RAW\".\"ORDERS\"",
            vec![row(&[
                ("table_name", "ORDERS"),
                ("column_name", "id"),
                ("key_sequence", "1"),
            ])],
        ),
        (
            "SHOW COLUMNS IN TABLE \"SALES\".\"RAW\".\"ORDERS\"",
            vec![
                row(&[("column_name", "id")]),
                row(&[("column_name", "amount")]),
                row(&[("column_name", "_timestamp")]),
            ],
        ),
    ] {
        source_warehouse.respond(sql, rows).await;
    }
    let destination_warehouse = Arc::new(FakeWarehouse::default());
    destination_warehouse
        .respond(
            "SELECT CURRENT_REGION() AS \"region\"",
            vec![row(&[("region", "AWS_EU_CENTRAL_1")])],
        )
        .await;
    destination_warehouse
        .respond(
            "SELECT CURRENT_ACCOUNT() AS \"account\"",
            vec![row(&[("account", "DST")])],
        )
        .await;
    let mut source = session(AccountKind::Source, &source_warehouse);
    let mut destination = session(AccountKind::Destination, &destination_warehouse);
    let row_diff = Arc::new(FakeRowDiff::default());
    let checker = MigrationChecker::new(row_diff.clone());

    let mismatches = checker
        .compare_data(&mut source, &mut destination, &main_role(), &["SALES".to_owned()])
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(mismatches.len(), 1);
    let requests = row_diff.requests.lock().await.clone();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.source_account, "SRC.us-east-1");
    assert_eq!(request.target_account, "DST.AWS_EU_CENTRAL_1");
    assert_eq!(request.role, "SALES_ROLE");
    assert_eq!(request.warehouse, "MAIN_WH");
    assert_eq!(request.table, "ORDERS");
    assert_eq!(request.primary_keys, ["id"]);
    assert_eq!(request.extra_columns, ["amount"]);
}
