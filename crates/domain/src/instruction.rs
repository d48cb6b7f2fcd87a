use std::fmt::{Display, Formatter};

use crate::{FutureGrantRecord, GrantRecord, Password, Statement, UserDefinition};

/// One replay step, tagged with the role it must run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Create a role under its grantor.
    CreateRole {
        /// Role to create.
        role: String,
        /// Role the statement runs as.
        acting_role: String,
    },
    /// Create a user owned by a project role.
    CreateUser {
        /// User definition copied from the source account.
        user: UserDefinition,
        /// Role the statement runs as.
        acting_role: String,
        /// Initial password.
        password: Password,
    },
    /// Replay a grant under its original grantor.
    AssignGrant(GrantRecord),
    /// Replay a future grant rule.
    AssignFutureGrant {
        /// Future grant rule.
        grant: FutureGrantRecord,
        /// Role the statement runs as.
        acting_role: String,
    },
}

impl Instruction {
    /// Returns the role the instruction runs under.
    #[must_use]
    pub fn acting_role(&self) -> &str {
        match self {
            Self::CreateRole { acting_role, .. }
            | Self::CreateUser { acting_role, .. }
            | Self::AssignFutureGrant { acting_role, .. } => acting_role.as_str(),
            Self::AssignGrant(grant) => grant.granted_by(),
        }
    }

    /// Returns the role this instruction creates, if any.
    #[must_use]
    pub fn created_role(&self) -> Option<&str> {
        match self {
            Self::CreateRole { role, .. } => Some(role.as_str()),
            _ => None,
        }
    }

    /// Returns the grant this instruction replays, if any.
    #[must_use]
    pub fn grant(&self) -> Option<&GrantRecord> {
        match self {
            Self::AssignGrant(grant) => Some(grant),
            _ => None,
        }
    }

    /// Renders the statement the instruction executes.
    #[must_use]
    pub fn to_statement(&self) -> Statement {
        match self {
            Self::CreateRole { role, .. } => Statement::CreateRole(role.clone()),
            Self::CreateUser { user, password, .. } => Statement::CreateUser {
                name: user.name().to_owned(),
                properties: user.properties().to_vec(),
                password: Some(password.clone()),
            },
            Self::AssignGrant(grant) => Statement::grant(grant),
            Self::AssignFutureGrant { grant, .. } => Statement::grant_future(grant),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateRole { role, acting_role } => {
                write!(formatter, "create role {role} as {acting_role}")
            }
            Self::CreateUser {
                user, acting_role, ..
            } => write!(formatter, "create user {} as {acting_role}", user.name()),
            Self::AssignGrant(grant) => write!(formatter, "grant {grant}"),
            Self::AssignFutureGrant { grant, acting_role } => {
                write!(formatter, "grant {grant} as {acting_role}")
            }
        }
    }
}
