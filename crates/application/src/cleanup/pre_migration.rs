use std::collections::{HashSet, VecDeque};

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{GrantedOn, Statement};
use tracing::{info, warn};

use super::{CleanupPlanner, CleanupStep};
use crate::Session;
use crate::naming::old_database;

/// Roles, users and future grants found under one seed role in the destination.
#[derive(Debug, Default)]
struct Removal {
    // (role, owner) in traversal order, seed first.
    roles: Vec<(String, String)>,
    // (user, owner)
    users: Vec<(String, String)>,
    future_revokes: Vec<CleanupStep>,
}

impl CleanupPlanner {
    /// Plans the removal of everything a previous migration left in the destination.
    ///
    /// Future grants are revoked first, then owned users are dropped, then
    /// roles deepest first, and finally each existing database is renamed to
    /// its `_OLD` name after a stale `_OLD` copy is dropped. An account with
    /// nothing to clean yields an empty plan.
    pub async fn plan_pre_migration(
        &self,
        session: &mut Session,
        databases: &[String],
    ) -> AppResult<Vec<CleanupStep>> {
        let mut future_revokes = Vec::new();
        let mut user_drops = Vec::new();
        let mut role_drops = Vec::new();
        let mut database_steps = Vec::new();
        let mut seen_roles = HashSet::new();
        let mut seen_users = HashSet::new();

        for database in databases {
            let exists = session.find_database(database).await?.is_some();
            let seed_role = if exists {
                Some(session.ownership_role_on_database(database).await?)
            } else {
                self.role_named_like(session, database).await?
            };

            if let Some(seed_role) = seed_role {
                if seed_role == self.main_role || session.is_admin_role(&seed_role) {
                    warn!(
                        database = %database,
                        role = %seed_role,
                        "database is owned by a shared role, keeping its roles"
                    );
                } else {
                    let removal = self.collect_removal(session, &seed_role).await?;
                    future_revokes.extend(removal.future_revokes);
                    for (user, owner) in removal.users {
                        if seen_users.insert(user.clone()) {
                            user_drops.push(CleanupStep::required(owner, Statement::DropUser(user)));
                        }
                    }
                    for (role, owner) in removal.roles.into_iter().rev() {
                        if seen_roles.insert(role.clone()) {
                            role_drops.push(CleanupStep::required(owner, Statement::DropRole(role)));
                        }
                    }
                }
            }

            if let Some((user, owner)) = self.user_named_like(session, database).await? {
                if seen_users.insert(user.clone()) {
                    user_drops.push(CleanupStep::required(owner, Statement::DropUser(user)));
                }
            }

            if exists {
                let old = old_database(database);
                database_steps.push(CleanupStep::required(
                    self.main_role.as_str(),
                    Statement::DropDatabase(old.clone()),
                ));
                database_steps.push(CleanupStep::required(
                    self.main_role.as_str(),
                    Statement::RenameDatabase {
                        from: database.clone(),
                        to: old,
                    },
                ));
            }
        }

        let steps: Vec<CleanupStep> = future_revokes
            .into_iter()
            .chain(user_drops)
            .chain(role_drops)
            .chain(database_steps)
            .collect();

        if let Some(step) = steps
            .iter()
            .find(|step| step.statement.is_destructive() && session.is_admin_role(&step.acting_role))
        {
            return Err(AppError::DestructiveGuard(format!(
                "'{}' would run under the administrative role '{}'",
                step.statement, step.acting_role
            )));
        }

        Ok(steps)
    }

    /// Runs the pre-migration cleanup, or only logs it in dry-run mode.
    ///
    /// A dry run that found something to clean fails with
    /// `ManualReviewRequired` so the operator runs the logged statements.
    pub async fn run_pre_migration(
        &self,
        session: &mut Session,
        databases: &[String],
        dry_run: bool,
    ) -> AppResult<usize> {
        if !self.ensure_main_role_access(session).await? {
            info!(role = %self.main_role, "main role does not exist yet, nothing to clean");
            return Ok(0);
        }

        let steps = self.plan_pre_migration(session, databases).await?;
        if steps.is_empty() {
            info!("destination account is clean");
            return Ok(0);
        }

        if dry_run {
            for step in &steps {
                info!("{step}");
            }
            return Err(AppError::ManualReviewRequired {
                statements: steps.len(),
            });
        }

        for step in &steps {
            self.run_step(session, step).await?;
        }
        session.use_default_role().await?;

        info!(statements = steps.len(), "pre-migration cleanup done");
        Ok(steps.len())
    }

    // Returns false when the main role does not exist in the destination.
    async fn ensure_main_role_access(&self, session: &mut Session) -> AppResult<bool> {
        session.use_default_role().await?;
        let Some(role) = session.find_role(&self.main_role).await? else {
            return Ok(false);
        };

        let user = session.user().to_owned();
        let assigned = session
            .grants_to_user(&user)
            .await?
            .iter()
            .any(|grant| grant.role() == self.main_role);
        if assigned {
            return Ok(true);
        }

        let owner = role.get("owner").unwrap_or_default().to_owned();
        if !session.is_admin_role(&owner) {
            return Err(AppError::Validation(format!(
                "main role '{}' exists but is not assigned to user '{user}' and cannot be granted",
                self.main_role
            )));
        }

        session.grant_role_to_user(&self.main_role, &user).await?;
        Ok(true)
    }

    async fn role_named_like(
        &self,
        session: &mut Session,
        database: &str,
    ) -> AppResult<Option<String>> {
        for candidate in [database.to_owned(), database.to_lowercase()] {
            if let Some(row) = session.find_role(&candidate).await? {
                return Ok(Some(row.require("name")?.to_owned()));
            }
        }

        Ok(None)
    }

    async fn user_named_like(
        &self,
        session: &mut Session,
        database: &str,
    ) -> AppResult<Option<(String, String)>> {
        if self.is_protected_user(session, database) {
            return Ok(None);
        }

        let Some(row) = session.find_user(database).await? else {
            return Ok(None);
        };
        let owner = row
            .get("owner")
            .filter(|owner| !owner.is_empty())
            .unwrap_or(self.main_role.as_str())
            .to_owned();

        Ok(Some((row.require("name")?.to_owned(), owner)))
    }

    async fn collect_removal(&self, session: &mut Session, seed_role: &str) -> AppResult<Removal> {
        let mut removal = Removal::default();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(seed_role.to_owned(), self.main_role.clone())]);

        while let Some((role, owner)) = queue.pop_front() {
            if !visited.insert(role.clone()) {
                continue;
            }

            for grant in session.grants_to_role(&role).await? {
                if !grant.is_ownership() {
                    continue;
                }
                match grant.granted_on() {
                    GrantedOn::Role if grant.object_name() != role => {
                        queue.push_back((grant.object_name().to_owned(), role.clone()));
                    }
                    GrantedOn::User if !self.is_protected_user(session, grant.object_name()) => {
                        removal
                            .users
                            .push((grant.object_name().to_owned(), role.clone()));
                    }
                    _ => {}
                }
            }

            for future_grant in session.future_grants_to_role(&role).await? {
                removal.future_revokes.push(CleanupStep::required(
                    owner.as_str(),
                    Statement::revoke_future(&future_grant),
                ));
            }

            removal.roles.push((role, owner));
        }

        Ok(removal)
    }
}
