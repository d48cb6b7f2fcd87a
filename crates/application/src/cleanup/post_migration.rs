use grantshift_core::AppResult;
use grantshift_domain::Statement;
use tracing::{info, warn};

use super::{CleanupPlanner, CleanupStep};
use crate::Session;
use crate::naming::{old_database, share_database};

/// Statements that remove the migration's leftovers from the destination.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostMigrationPlan {
    /// `<DB>_SHARE` databases, dropped under the administrative role.
    pub share_clones: Vec<String>,
    /// `_OLD` drops and role revokes, each tolerated on failure.
    pub steps: Vec<CleanupStep>,
}

impl PostMigrationPlan {
    /// Returns the number of statements in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.share_clones.len() + self.steps.len()
    }

    /// Returns true when there is nothing to clean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CleanupPlanner {
    /// Plans dropping share clones and `_OLD` databases, then revoking every role
    /// of the connecting user except its default and the main role, newest first.
    pub async fn plan_post_migration(
        &self,
        session: &mut Session,
        databases: &[String],
    ) -> AppResult<PostMigrationPlan> {
        session.use_default_role().await?;
        let existing = session.show_databases().await?;
        let owner_of = |name: &str| {
            existing
                .iter()
                .find(|row| row.get("name") == Some(name))
                .map(|row| row.get("owner").unwrap_or_default().to_owned())
        };

        let mut plan = PostMigrationPlan::default();
        for database in databases {
            let old = old_database(database);
            if let Some(owner) = owner_of(&old) {
                let owner = if owner.is_empty() { self.main_role.clone() } else { owner };
                plan.steps
                    .push(CleanupStep::tolerated(owner, Statement::DropDatabase(old)));
            }

            let share = share_database(database);
            if owner_of(&share).is_some() {
                plan.share_clones.push(share);
            }
        }

        let user = session.user().to_owned();
        let default_role = session.default_role().to_owned();
        let grants = session.grants_to_user(&user).await?;
        for grant in grants.iter().rev() {
            if grant.role() == default_role || grant.role() == self.main_role {
                continue;
            }
            let acting_role = grant.granted_by().unwrap_or(default_role.as_str());
            plan.steps.push(CleanupStep::tolerated(
                acting_role,
                Statement::RevokeRoleFromUser {
                    role: grant.role().to_owned(),
                    user: user.clone(),
                },
            ));
        }

        Ok(plan)
    }

    /// Runs the post-migration cleanup; failures are logged and skipped.
    ///
    /// Returns the number of statements that failed.
    pub async fn run_post_migration(
        &self,
        session: &mut Session,
        databases: &[String],
    ) -> AppResult<usize> {
        let plan = self.plan_post_migration(session, databases).await?;
        let mut failures = 0;

        for share in &plan.share_clones {
            session.use_default_role().await?;
            if let Err(error) = session.drop_share_clone(share).await {
                if !error.is_statement_failure() {
                    return Err(error);
                }
                warn!(database = %share, error = %error, "failed to drop share clone");
                failures += 1;
            }
        }

        for step in &plan.steps {
            if !self.run_step(session, step).await? {
                failures += 1;
            }
        }
        session.use_default_role().await?;

        info!(statements = plan.len(), failures, "post-migration cleanup done");
        Ok(failures)
    }
}
