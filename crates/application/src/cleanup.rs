use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{Statement, quote_identifier};
use tracing::{info, warn};

use crate::Session;

mod post_migration;
mod pre_migration;

pub use post_migration::PostMigrationPlan;

/// One destructive or revoking statement together with the role it runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupStep {
    /// Role the statement runs as.
    pub acting_role: String,
    /// Statement to run.
    pub statement: Statement,
    /// Whether a failure is logged instead of aborting the cleanup.
    pub tolerate_failure: bool,
}

impl CleanupStep {
    fn required(acting_role: impl Into<String>, statement: Statement) -> Self {
        Self {
            acting_role: acting_role.into(),
            statement,
            tolerate_failure: false,
        }
    }

    fn tolerated(acting_role: impl Into<String>, statement: Statement) -> Self {
        Self {
            acting_role: acting_role.into(),
            statement,
            tolerate_failure: true,
        }
    }
}

impl Display for CleanupStep {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            formatter,
            "USE ROLE {}; {};",
            quote_identifier(&self.acting_role),
            self.statement
        )
    }
}

/// Plans and runs destination cleanup around a migration.
#[derive(Debug, Clone)]
pub struct CleanupPlanner {
    main_role: String,
    protected_users: HashSet<String>,
}

impl CleanupPlanner {
    /// Creates a planner for the given main role.
    #[must_use]
    pub fn new(main_role: impl Into<String>) -> Self {
        Self {
            main_role: main_role.into(),
            protected_users: HashSet::new(),
        }
    }

    /// Adds users that are never dropped; the connecting user always is.
    #[must_use]
    pub fn with_protected_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.protected_users = users
            .into_iter()
            .map(|user| user.as_ref().to_uppercase())
            .collect();
        self
    }

    /// Returns the main role.
    #[must_use]
    pub fn main_role(&self) -> &str {
        self.main_role.as_str()
    }

    fn is_protected_user(&self, session: &Session, user: &str) -> bool {
        user.eq_ignore_ascii_case(session.user())
            || self.protected_users.contains(&user.to_uppercase())
    }

    // Switches to a role, granting it to the connecting user through the main
    // role when the user cannot assume it yet.
    async fn switch_role(&self, session: &mut Session, role: &str) -> AppResult<()> {
        match session.use_role(role).await {
            Ok(()) => Ok(()),
            Err(error) if error.is_statement_failure() => {
                info!(role = %role, "granting role to the migration user before switching");
                let user = session.user().to_owned();
                session.use_role(&self.main_role).await?;
                session.grant_role_to_user(role, &user).await?;
                session.use_role(role).await
            }
            Err(error) => Err(error),
        }
    }

    // Returns false when a tolerated step failed.
    async fn run_step(&self, session: &mut Session, step: &CleanupStep) -> AppResult<bool> {
        let result = match self.switch_role(session, &step.acting_role).await {
            Ok(()) => session.run(&step.statement).await,
            Err(error) => Err(error),
        };

        match result {
            Ok(()) => Ok(true),
            Err(error) if step.tolerate_failure && !matches!(error, AppError::Internal(_)) => {
                warn!(step = %step, error = %error, "cleanup statement failed, skipping");
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }
}

#[cfg(test)]
mod tests;
