use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{GrantedOn, ObjectName, ProjectRoleSet, Role, quote_literal};
use tracing::{info, warn};

use crate::Session;
use crate::naming::{TIMESTAMP_COLUMN, is_skipped_schema};
use crate::session_ports::{RowDiffRequest, RowDiffRunner};

mod comparison;

pub use comparison::{Comparison, ComparisonGroup, ID_COLUMN, Mismatch, diff_rows};

/// Read-only verification of a finished migration.
pub struct MigrationChecker {
    row_diff: Arc<dyn RowDiffRunner>,
}

impl MigrationChecker {
    /// Creates a checker using the given row-level diff capability.
    #[must_use]
    pub fn new(row_diff: Arc<dyn RowDiffRunner>) -> Self {
        Self { row_diff }
    }

    /// Compares users, roles, their grants and table row counts of every
    /// discovered project between the two accounts.
    ///
    /// Roles and users found only in the destination are compared as well.
    /// Every mismatch is logged and returned.
    pub async fn compare_structure(
        &self,
        source: &mut Session,
        destination: &mut Session,
        main_role: &Role,
        sets: &[ProjectRoleSet],
    ) -> AppResult<Vec<Mismatch>> {
        let warehouse = first_warehouse(main_role)?;
        for session in [&mut *source, &mut *destination] {
            session.use_default_role().await?;
            session.use_warehouse(&warehouse).await?;
        }

        let mut mismatches = Vec::new();
        for set in sets {
            let database = set.database();
            let database_role = set.seed_role();
            info!(database = %database, "checking database structure");

            let mut roles: Vec<String> = set.roles().map(|role| role.name().to_owned()).collect();
            let mut users = vec![database_role.to_owned()];
            users.extend(set.users().iter().map(|user| user.name().to_owned()));
            let (owned_roles, owned_users) = owned_roles_and_users(destination, database_role).await?;
            merge_names(&mut roles, owned_roles);
            merge_names(&mut users, owned_users);

            let mut comparisons = vec![
                Comparison::users(&users),
                Comparison::user_grants(&users),
                Comparison::roles(&roles),
                Comparison::role_grants(&roles),
            ];
            for schema in source.schemas_in(database).await? {
                let schema = schema.require("name")?.to_owned();
                for table in source.tables_in(database, &schema).await? {
                    let table =
                        ObjectName::from_parts([database, schema.as_str(), table.require("name")?]);
                    comparisons.push(Comparison::table_rows(table, database_role));
                }
            }

            for comparison in &comparisons {
                mismatches.extend(self.compare(source, destination, comparison).await?);
            }
        }

        for session in [&mut *source, &mut *destination] {
            session.use_default_role().await?;
        }
        info!(mismatches = mismatches.len(), "structure check finished");
        Ok(mismatches)
    }

    /// Runs the row-level diff for every table with a primary key.
    ///
    /// Tables without a primary key are skipped with a warning.
    pub async fn compare_data(
        &self,
        source: &mut Session,
        destination: &mut Session,
        main_role: &Role,
        databases: &[String],
    ) -> AppResult<Vec<Mismatch>> {
        let warehouse = first_warehouse(main_role)?;
        let source_account = account_locator(source).await?;
        let target_account = account_locator(destination).await?;

        for session in [&mut *source, &mut *destination] {
            session.use_default_role().await?;
            let user = session.user().to_owned();
            session.grant_role_to_user(main_role.name(), &user).await?;
        }

        let mut mismatches = Vec::new();
        for database in databases {
            for schema in source.schemas_in(database).await? {
                let schema_name = schema.require("name")?.to_owned();
                if is_skipped_schema(&schema_name) {
                    continue;
                }
                let owner = schema.require("owner")?.to_owned();

                for session in [&mut *source, &mut *destination] {
                    session.use_role(main_role.name()).await?;
                    let user = session.user().to_owned();
                    session.grant_role_to_user(&owner, &user).await?;
                }
                source.use_role(&owner).await?;

                for table in source.tables_in(database, &schema_name).await? {
                    let table_name = table.require("name")?.to_owned();
                    let object = ObjectName::from_parts([
                        database.as_str(),
                        schema_name.as_str(),
                        table_name.as_str(),
                    ]);

                    let primary_keys = source.primary_keys_in_table(&object).await?;
                    if primary_keys.is_empty() {
                        warn!(table = %object, "table has no primary key, skipping");
                        continue;
                    }
                    let extra_columns = source
                        .columns_in(&object)
                        .await?
                        .into_iter()
                        .filter(|column| {
                            !primary_keys.contains(column) && column != TIMESTAMP_COLUMN
                        })
                        .collect();

                    let request = RowDiffRequest {
                        source_account: source_account.clone(),
                        target_account: target_account.clone(),
                        role: owner.clone(),
                        warehouse: warehouse.clone(),
                        database: database.clone(),
                        schema: schema_name.clone(),
                        table: table_name,
                        primary_keys,
                        extra_columns,
                    };
                    let outcome = self.row_diff.compare(&request).await?;
                    if outcome.succeeded {
                        info!(table = %object, report = %outcome.report, "table data matches");
                    } else {
                        let mismatch = Mismatch::RowsDiffer {
                            table: object.to_string(),
                            report: outcome.report,
                        };
                        warn!("{mismatch}");
                        mismatches.push(mismatch);
                    }
                }
            }
        }

        info!(mismatches = mismatches.len(), "data check finished");
        Ok(mismatches)
    }

    async fn compare(
        &self,
        source: &mut Session,
        destination: &mut Session,
        comparison: &Comparison,
    ) -> AppResult<Vec<Mismatch>> {
        if let Some(role) = &comparison.role {
            source.use_role(role).await?;
            destination.use_role(role).await?;
        }

        let group = comparison.group.to_string();
        info!(group = %group, "comparing");
        let source_rows = source.fetch_all(&comparison.sql).await?;
        let destination_rows = destination.fetch_all(&comparison.sql).await?;

        let mismatches = diff_rows(&group, &source_rows, &destination_rows);
        for mismatch in &mismatches {
            warn!("{mismatch}");
        }
        Ok(mismatches)
    }
}

fn first_warehouse(main_role: &Role) -> AppResult<String> {
    main_role
        .usable_warehouses()
        .first()
        .map(|warehouse| (*warehouse).to_owned())
        .ok_or_else(|| AppError::NoWarehouse {
            role: main_role.name().to_owned(),
        })
}

// Roles and users owned, directly or through owned roles, by a role.
async fn owned_roles_and_users(
    session: &mut Session,
    role: &str,
) -> AppResult<(Vec<String>, Vec<String>)> {
    let mut roles = Vec::new();
    let mut users = Vec::new();
    let mut visited = HashSet::from([role.to_owned()]);
    let mut queue = VecDeque::from([role.to_owned()]);

    while let Some(current) = queue.pop_front() {
        for grant in session.grants_to_role(&current).await? {
            if !grant.is_ownership() {
                continue;
            }
            match grant.granted_on() {
                GrantedOn::Role if visited.insert(grant.object_name().to_owned()) => {
                    roles.push(grant.object_name().to_owned());
                    queue.push_back(grant.object_name().to_owned());
                }
                GrantedOn::User => users.push(grant.object_name().to_owned()),
                _ => {}
            }
        }
    }

    Ok((roles, users))
}

// Appends names not yet listed, keeping first-seen order.
fn merge_names(names: &mut Vec<String>, extra: Vec<String>) {
    for name in extra {
        if !names.contains(&name) {
            names.push(name);
        }
    }
}

// `account.region` with the region in the form the diff tool expects.
async fn account_locator(session: &mut Session) -> AppResult<String> {
    let region = session.region().await?;
    let account = session.account_name().await?;
    let sql = format!("SHOW REGIONS LIKE {}", quote_literal(&region));
    let cloud_region = session
        .fetch_all(&sql)
        .await?
        .first()
        .and_then(|row| row.get("region").map(str::to_owned))
        .unwrap_or(region);

    Ok(format!("{account}.{cloud_region}"))
}

#[cfg(test)]
mod tests;
