use std::sync::Arc;

use async_trait::async_trait;
use grantshift_core::{AccountKind, AppResult, SessionContext};
use grantshift_domain::MetadataRow;

/// Port for running statements against one warehouse account.
///
/// The adapter is stateless with respect to role and namespace: every call
/// carries the context it must run in.
#[async_trait]
pub trait WarehouseSession: Send + Sync {
    /// Runs a query and returns its rows.
    async fn fetch_all(&self, context: &SessionContext, sql: &str) -> AppResult<Vec<MetadataRow>>;

    /// Runs a statement, discarding any rows.
    async fn execute(&self, context: &SessionContext, sql: &str) -> AppResult<()>;
}

/// A connected account plus the identity it authenticated as.
#[derive(Clone)]
pub struct SessionHandle {
    /// Statement transport.
    pub connection: Arc<dyn WarehouseSession>,
    /// Connecting user.
    pub user: String,
    /// Administrative role the session starts with.
    pub default_role: String,
    /// Warehouse the session starts with.
    pub default_warehouse: Option<String>,
}

/// Port yielding the sessions a migration talks to.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Opens a session for an account, or `None` when that account is not configured.
    async fn open(&self, account: AccountKind) -> AppResult<Option<SessionHandle>>;
}
