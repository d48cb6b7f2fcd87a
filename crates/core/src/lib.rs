//! Shared primitives for all Rust crates in grantshift.

#![forbid(unsafe_code)]

/// Session context primitives shared across services.
pub mod session;

use thiserror::Error;

pub use session::{AccountKind, SessionContext};

/// Result type used across grantshift crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input, configuration or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// An object expected to have exactly one owner has zero or several.
    #[error("ambiguous ownership of '{object}': expected exactly one owner, found {owners}")]
    AmbiguousOwnership {
        /// Object whose ownership was resolved.
        object: String,
        /// Number of owners found.
        owners: usize,
    },

    /// The role ownership graph is not a forest.
    #[error("cyclic role graph detected at role '{role}'")]
    CyclicRoleGraph {
        /// Role that closed the cycle.
        role: String,
    },

    /// A session required by the migration topology is not configured.
    #[error("missing session: {0}")]
    MissingSession(String),

    /// Warehouse reported that an object does not exist or is not visible.
    #[error("object not found: {0}")]
    ObjectNotFound(String),

    /// Warehouse rejected a statement for lack of privileges.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The acting role cannot use any warehouse.
    #[error("the role '{role}' cannot use any warehouses")]
    NoWarehouse {
        /// Role without a usable warehouse.
        role: String,
    },

    /// A destructive statement was attempted under the top administrative role.
    #[error("destructive operation refused: {0}")]
    DestructiveGuard(String),

    /// Dry-run produced statements an operator must review and run manually.
    #[error("please run the {statements} logged statements on the target account manually")]
    ManualReviewRequired {
        /// Number of statements emitted by the dry run.
        statements: usize,
    },

    /// Any other statement failure reported by the warehouse.
    #[error("statement failed: {0}")]
    Statement(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns true for configuration and precondition failures that must abort
    /// before anything is written to the destination account.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::AmbiguousOwnership { .. }
                | Self::CyclicRoleGraph { .. }
                | Self::MissingSession(_)
        )
    }

    /// Returns true when the error was reported by the warehouse for a single statement.
    #[must_use]
    pub fn is_statement_failure(&self) -> bool {
        matches!(
            self,
            Self::ObjectNotFound(_) | Self::PermissionDenied(_) | Self::Statement(_)
        )
    }
}
