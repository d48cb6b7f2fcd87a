use std::sync::Arc;

use grantshift_core::{AccountKind, AppError};

use crate::test_support::{FakeFailure, FakeWarehouse, grant_row, row, session};

use super::CleanupPlanner;

fn databases() -> Vec<String> {
    vec!["SALES".to_owned()]
}

async fn previously_migrated() -> Arc<FakeWarehouse> {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse
        .respond("SHOW DATABASES LIKE 'SALES'", vec![row(&[("name", "SALES")])])
        .await;
    warehouse
        .respond(
            "SHOW GRANTS ON DATABASE \"SALES\"",
            vec![grant_row("OWNERSHIP", "DATABASE", "SALES", "SALES_ROLE", "MAIN")],
        )
        .await;
    warehouse
        .respond(
            "SHOW GRANTS TO ROLE \"SALES_ROLE\"",
            vec![
                grant_row("OWNERSHIP", "ROLE", "SALES_RO", "SALES_ROLE", "SALES_ROLE"),
                grant_row("OWNERSHIP", "USER", "SALES_LOADER", "SALES_ROLE", "SALES_ROLE"),
                grant_row("OWNERSHIP", "USER", "MIGRATE", "SALES_ROLE", "SALES_ROLE"),
                grant_row("USAGE", "WAREHOUSE", "SALES_WH", "SALES_ROLE", "MAIN"),
            ],
        )
        .await;
    warehouse
        .respond(
            "SHOW FUTURE GRANTS TO ROLE \"SALES_RO\"",
            vec![row(&[
                ("privilege", "SELECT"),
                ("grant_on", "TABLE"),
                ("name", "SALES.RAW.<TABLE>"),
                ("grant_to", "ROLE"),
                ("grantee_name", "SALES_RO"),
            ])],
        )
        .await;
    warehouse
        .respond(
            "SHOW ROLES LIKE 'MAIN'",
            vec![row(&[("name", "MAIN"), ("owner", "ACCOUNTADMIN")])],
        )
        .await;
    warehouse
        .respond(
            "SHOW GRANTS TO USER \"MIGRATE\"",
            vec![row(&[("role", "MAIN"), ("grantee_name", "MIGRATE")])],
        )
        .await;
    warehouse
}

#[tokio::test]
async fn plans_revokes_then_users_then_roles_then_rename() {
    let warehouse = previously_migrated().await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let steps = CleanupPlanner::new("MAIN")
        .plan_pre_migration(&mut session, &databases())
        .await
        .unwrap_or_else(|_| unreachable!());

    let rendered: Vec<String> = steps.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        [
            "USE ROLE \"SALES_ROLE\"; REVOKE SELECT ON FUTURE TABLES IN SCHEMA \"SALES\".\"RAW\" FROM ROLE \"SALES_RO\";",
            "USE ROLE \"SALES_ROLE\"; DROP USER IF EXISTS \"SALES_LOADER\";",
            "USE ROLE \"SALES_ROLE\"; DROP ROLE IF EXISTS \"SALES_RO\";",
            "USE ROLE \"MAIN\"; DROP ROLE IF EXISTS \"SALES_ROLE\";",
            "USE ROLE \"MAIN\"; DROP DATABASE IF EXISTS \"SALES_OLD\";",
            "USE ROLE \"MAIN\"; ALTER DATABASE IF EXISTS \"SALES\" RENAME TO \"SALES_OLD\";",
        ]
    );
}

#[tokio::test]
async fn clean_account_yields_an_empty_plan() {
    let warehouse = Arc::new(FakeWarehouse::default());
    let mut session = session(AccountKind::Destination, &warehouse);
    let planner = CleanupPlanner::new("MAIN");

    for _ in 0..2 {
        let steps = planner
            .plan_pre_migration(&mut session, &databases())
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(steps.is_empty());
    }
}

#[tokio::test]
async fn protected_users_are_kept() {
    let warehouse = previously_migrated().await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let steps = CleanupPlanner::new("MAIN")
        .with_protected_users(["sales_loader"])
        .plan_pre_migration(&mut session, &databases())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(
        steps
            .iter()
            .all(|step| !step.statement.to_string().starts_with("DROP USER"))
    );
}

#[tokio::test]
async fn drops_under_the_administrative_role_are_refused() {
    let warehouse = previously_migrated().await;
    warehouse
        .respond(
            "SHOW GRANTS TO ROLE \"SALES_ROLE\"",
            vec![grant_row("OWNERSHIP", "USER", "SALES_LOADER", "SALES_ROLE", "SALES_ROLE")],
        )
        .await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let result = CleanupPlanner::new("ACCOUNTADMIN")
        .plan_pre_migration(&mut session, &databases())
        .await;

    assert!(matches!(result, Err(AppError::DestructiveGuard(_))));
}

#[tokio::test]
async fn dry_run_logs_and_asks_for_manual_review() {
    let warehouse = previously_migrated().await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let result = CleanupPlanner::new("MAIN")
        .run_pre_migration(&mut session, &databases(), true)
        .await;

    assert!(matches!(
        result,
        Err(AppError::ManualReviewRequired { statements: 6 })
    ));
    assert!(warehouse.statements().await.is_empty());
}

#[tokio::test]
async fn unassigned_main_role_owned_elsewhere_is_rejected() {
    let warehouse = previously_migrated().await;
    warehouse
        .respond(
            "SHOW ROLES LIKE 'MAIN'",
            vec![row(&[("name", "MAIN"), ("owner", "SECURITYADMIN")])],
        )
        .await;
    warehouse.respond("SHOW GRANTS TO USER \"MIGRATE\"", Vec::new()).await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let result = CleanupPlanner::new("MAIN")
        .run_pre_migration(&mut session, &databases(), false)
        .await;

    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn run_grants_roles_the_user_cannot_assume() {
    let warehouse = previously_migrated().await;
    warehouse
        .fail_once("USE ROLE \"SALES_ROLE\"", FakeFailure::Denied)
        .await;
    let mut session = session(AccountKind::Destination, &warehouse);

    let executed = CleanupPlanner::new("MAIN")
        .run_pre_migration(&mut session, &databases(), false)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(executed, 6);
    let statements = warehouse.statements().await;
    assert_eq!(statements[0], "GRANT ROLE \"SALES_ROLE\" TO USER \"MIGRATE\"");
    assert_eq!(
        statements[1],
        "REVOKE SELECT ON FUTURE TABLES IN SCHEMA \"SALES\".\"RAW\" FROM ROLE \"SALES_RO\""
    );
    assert_eq!(
        statements.last().map(String::as_str),
        Some("ALTER DATABASE IF EXISTS \"SALES\" RENAME TO \"SALES_OLD\"")
    );
}

#[tokio::test]
async fn post_migration_drops_leftovers_and_revokes_roles_newest_first() {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse
        .respond(
            "SHOW DATABASES",
            vec![
                row(&[("name", "SALES"), ("owner", "SALES_ROLE")]),
                row(&[("name", "SALES_OLD"), ("owner", "SALES_ROLE")]),
                row(&[("name", "SALES_SHARE"), ("owner", "ACCOUNTADMIN")]),
            ],
        )
        .await;
    warehouse
        .respond(
            "SHOW GRANTS TO USER \"MIGRATE\"",
            vec![
                row(&[("role", "ACCOUNTADMIN"), ("grantee_name", "MIGRATE")]),
                row(&[
                    ("role", "MAIN"),
                    ("grantee_name", "MIGRATE"),
                    ("granted_by", "ACCOUNTADMIN"),
                ]),
                row(&[
                    ("role", "SALES_ROLE"),
                    ("grantee_name", "MIGRATE"),
                    ("granted_by", "MAIN"),
                ]),
                row(&[
                    ("role", "SALES_RO"),
                    ("grantee_name", "MIGRATE"),
                    ("granted_by", "SALES_ROLE"),
                ]),
            ],
        )
        .await;
    warehouse
        .fail("DROP DATABASE IF EXISTS \"SALES_OLD\"", FakeFailure::NotFound)
        .await;
    let mut session = session(AccountKind::Destination, &warehouse);
    let planner = CleanupPlanner::new("MAIN");

    let plan = planner
        .plan_post_migration(&mut session, &databases())
        .await
        .unwrap_or_else(|_| unreachable!());
    assert_eq!(plan.share_clones, ["SALES_SHARE"]);
    assert_eq!(plan.len(), 4);

    let failures = planner
        .run_post_migration(&mut session, &databases())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(failures, 1);
    assert_eq!(
        warehouse.statements().await,
        [
            "DROP DATABASE IF EXISTS \"SALES_SHARE\"",
            "REVOKE ROLE \"SALES_RO\" FROM USER \"MIGRATE\"",
            "REVOKE ROLE \"SALES_ROLE\" FROM USER \"MIGRATE\"",
        ]
    );
}
