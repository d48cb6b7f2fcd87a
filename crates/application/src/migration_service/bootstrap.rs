use grantshift_core::{AppError, AppResult};
use grantshift_domain::{
    GENERATED_PASSWORD_LENGTH, GrantedOn, GranteeKind, MetadataRow, ProjectRoleSet, Role,
    Securable, Statement, USAGE, WarehouseSpec,
};
use tracing::{info, warn};

use super::MigrationService;
use crate::Session;
use crate::replay_planner::generate_password;

const ACCOUNT_PRIVILEGES: [(&str, bool); 3] = [
    ("CREATE DATABASE", false),
    ("CREATE ROLE", true),
    ("CREATE USER", true),
];

const SYSADMIN: &str = "SYSADMIN";

impl MigrationService {
    /// Creates the main role, its warehouses and its user in the destination.
    ///
    /// An existing main role is reused only when the migration user already holds it.
    pub(super) async fn create_main_role(
        &self,
        source: &mut Session,
        destination: &mut Session,
        main_role: &Role,
    ) -> AppResult<()> {
        let name = main_role.name();
        let user = destination.user().to_owned();
        destination.use_default_role().await?;

        if destination.find_role(name).await?.is_some() {
            let granted = destination
                .grants_to_user(&user)
                .await?
                .iter()
                .any(|grant| grant.role() == name);
            if !granted {
                return Err(AppError::Validation(format!(
                    "main role '{name}' exists but is not granted to user '{user}'"
                )));
            }
            info!(role = %name, "main role already exists");
            return Ok(());
        }

        destination.run(&Statement::CreateRole(name.to_owned())).await?;
        destination
            .grant_role_to_user(name, &user)
            .await?;
        for (privilege, with_grant_option) in ACCOUNT_PRIVILEGES {
            destination
                .run(&Statement::Grant {
                    privilege: privilege.to_owned(),
                    securable: Securable::Account,
                    grantee_kind: GranteeKind::Role,
                    grantee: name.to_owned(),
                    with_grant_option,
                })
                .await?;
        }

        source.use_default_role().await?;
        for warehouse in main_role.usable_warehouses() {
            let Some(row) = source.find_warehouse(warehouse).await? else {
                warn!(warehouse = %warehouse, "warehouse of main role not found in source account");
                continue;
            };
            destination
                .run(&Statement::CreateWarehouse(warehouse_spec(&row)?))
                .await?;
            destination
                .run(&Statement::Grant {
                    privilege: USAGE.to_owned(),
                    securable: Securable::Object {
                        kind: GrantedOn::Warehouse,
                        name: warehouse.to_owned(),
                    },
                    grantee_kind: GranteeKind::Role,
                    grantee: name.to_owned(),
                    with_grant_option: false,
                })
                .await?;
            destination.record_warehouse_usage(name, warehouse);
        }

        let password = match self.settings.passwords.get(name) {
            Some(password) => password.clone(),
            None => generate_password(GENERATED_PASSWORD_LENGTH)?,
        };
        destination
            .run(&Statement::CreateUser {
                name: name.to_owned(),
                properties: vec![("DEFAULT_ROLE".to_owned(), name.to_owned())],
                password: Some(password),
            })
            .await?;
        destination.grant_role_to_user(name, name).await?;
        destination
            .run(&Statement::GrantRole {
                role: name.to_owned(),
                grantee_kind: GranteeKind::Role,
                grantee: SYSADMIN.to_owned(),
            })
            .await
    }

    /// Replays the role grants each recreated user holds in the source account.
    pub(super) async fn grant_roles_to_users(
        &self,
        source: &mut Session,
        destination: &mut Session,
        sets: &[ProjectRoleSet],
    ) -> AppResult<()> {
        source.use_default_role().await?;
        for user in sets.iter().flat_map(ProjectRoleSet::users) {
            for grant in source.grants_to_user(user.name()).await? {
                let acting_role = grant
                    .granted_by()
                    .unwrap_or(destination.default_role())
                    .to_owned();
                destination.use_role(&acting_role).await?;
                let statement = Statement::GrantRole {
                    role: grant.role().to_owned(),
                    grantee_kind: grant.granted_to(),
                    grantee: grant.grantee_name().to_owned(),
                };
                match destination.run(&statement).await {
                    Ok(()) => {}
                    Err(error) if error.is_statement_failure() => {
                        warn!(
                            user = %user.name(),
                            role = %grant.role(),
                            error = %error,
                            "failed to grant role to user"
                        );
                    }
                    Err(error) => return Err(error),
                }
            }
        }

        Ok(())
    }
}

fn warehouse_spec(row: &MetadataRow) -> AppResult<WarehouseSpec> {
    Ok(WarehouseSpec {
        name: row.require("name")?.to_owned(),
        size: row.require("size")?.to_owned(),
        warehouse_type: row.require("type")?.to_owned(),
        auto_suspend: row.require("auto_suspend")?.to_owned(),
        auto_resume: row.require("auto_resume")?.to_owned(),
    })
}
