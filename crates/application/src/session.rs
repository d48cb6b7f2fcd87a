use std::collections::HashMap;
use std::sync::Arc;

use grantshift_core::{AccountKind, AppError, AppResult, SessionContext};
use grantshift_domain::{GranteeKind, MetadataRow, Statement};
use tracing::debug;

use crate::naming::SHARE_DATABASE_SUFFIX;
use crate::session_ports::{SessionHandle, WarehouseSession};

mod metadata;
mod warehouses;

pub use warehouses::WarehouseSelection;

/// Top administrative role; requests for it resolve to the session's default role.
pub const ACCOUNT_ADMIN_ROLE: &str = "ACCOUNTADMIN";

/// One account session with an explicit, memoized role and warehouse context.
///
/// The session is owned by a single caller and mutated through `&mut self`; there
/// are no concurrent writers.
pub struct Session {
    account: AccountKind,
    connection: Arc<dyn WarehouseSession>,
    user: String,
    default_role: String,
    context: SessionContext,
    role_warehouses: HashMap<String, Vec<String>>,
    region: Option<String>,
    account_name: Option<String>,
}

impl Session {
    /// Creates a session starting in the handle's default role and warehouse.
    #[must_use]
    pub fn new(account: AccountKind, handle: SessionHandle) -> Self {
        let context = SessionContext::new(
            Some(handle.default_role.clone()),
            handle.default_warehouse.clone(),
        );

        Self {
            account,
            connection: handle.connection,
            user: handle.user,
            default_role: handle.default_role,
            context,
            role_warehouses: HashMap::new(),
            region: None,
            account_name: None,
        }
    }

    /// Returns which account this session talks to.
    #[must_use]
    pub fn account(&self) -> AccountKind {
        self.account
    }

    /// Returns the connecting user.
    #[must_use]
    pub fn user(&self) -> &str {
        self.user.as_str()
    }

    /// Returns the administrative role the session started with.
    #[must_use]
    pub fn default_role(&self) -> &str {
        self.default_role.as_str()
    }

    /// Returns the current context.
    #[must_use]
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Returns the active role, if known.
    #[must_use]
    pub fn current_role(&self) -> Option<&str> {
        self.context.current_role()
    }

    /// Forgets the cached context so the next switch is always issued.
    pub fn invalidate_context(&mut self) {
        debug!(account = %self.account, "session context invalidated");
        self.context.reset();
    }

    /// Returns true for the roles that must never run destructive statements.
    #[must_use]
    pub fn is_admin_role(&self, role: &str) -> bool {
        role.eq_ignore_ascii_case(ACCOUNT_ADMIN_ROLE) || role == self.default_role
    }

    /// Switches to a role; a no-op when it is already active.
    pub async fn use_role(&mut self, role: &str) -> AppResult<()> {
        let role = if role.eq_ignore_ascii_case(ACCOUNT_ADMIN_ROLE) {
            self.default_role.clone()
        } else {
            role.to_owned()
        };

        if self.context.is_role_active(&role) {
            return Ok(());
        }

        let context = self.context.clone().with_role(role.as_str());
        let sql = Statement::UseRole(role).to_string();
        let result = self.connection.execute(&context, &sql).await;
        self.observe(result)?;
        self.context = context;
        Ok(())
    }

    /// Switches back to the default administrative role.
    pub async fn use_default_role(&mut self) -> AppResult<()> {
        let role = self.default_role.clone();
        self.use_role(&role).await
    }

    /// Switches to a warehouse; a no-op when it is already active.
    pub async fn use_warehouse(&mut self, warehouse: &str) -> AppResult<()> {
        if self.context.current_warehouse() == Some(warehouse) {
            return Ok(());
        }

        let context = self.context.clone().with_warehouse(warehouse);
        let sql = Statement::UseWarehouse(warehouse.to_owned()).to_string();
        let result = self.connection.execute(&context, &sql).await;
        self.observe(result)?;
        self.context = context;
        Ok(())
    }

    /// Switches the active database.
    pub async fn use_database(&mut self, database: &str) -> AppResult<()> {
        let context = self.context.clone().with_database(database);
        let sql = Statement::UseDatabase(database.to_owned()).to_string();
        let result = self.connection.execute(&context, &sql).await;
        self.observe(result)?;
        self.context = context;
        Ok(())
    }

    /// Switches the active schema.
    pub async fn use_schema(&mut self, database: &str, schema: &str) -> AppResult<()> {
        let context = self.context.clone().with_schema(database, schema);
        let sql = Statement::UseSchema {
            database: database.to_owned(),
            schema: schema.to_owned(),
        }
        .to_string();
        let result = self.connection.execute(&context, &sql).await;
        self.observe(result)?;
        self.context = context;
        Ok(())
    }

    /// Runs a query in the current context.
    pub async fn fetch_all(&mut self, sql: &str) -> AppResult<Vec<MetadataRow>> {
        let result = self.connection.fetch_all(&self.context, sql).await;
        self.observe(result)
    }

    /// Runs a statement in the current context.
    ///
    /// Destructive statements are refused under the administrative role or an
    /// unknown role.
    pub async fn run(&mut self, statement: &Statement) -> AppResult<()> {
        self.guard(statement)?;
        self.run_unguarded(statement).await
    }

    /// Drops a `<DB>_SHARE` database, which is created and owned by the
    /// administrative role and is the only drop allowed under it.
    pub async fn drop_share_clone(&mut self, database: &str) -> AppResult<()> {
        if !database.ends_with(SHARE_DATABASE_SUFFIX) {
            return Err(AppError::DestructiveGuard(format!(
                "database '{database}' is not a share clone"
            )));
        }

        self.run_unguarded(&Statement::DropDatabase(database.to_owned()))
            .await
    }

    /// Grants a role to a user under the current role.
    pub async fn grant_role_to_user(&mut self, role: &str, user: &str) -> AppResult<()> {
        self.run(&Statement::GrantRole {
            role: role.to_owned(),
            grantee_kind: GranteeKind::User,
            grantee: user.to_owned(),
        })
        .await
    }

    /// Returns the account region, queried once.
    pub async fn region(&mut self) -> AppResult<String> {
        if let Some(region) = &self.region {
            return Ok(region.clone());
        }

        let region = self
            .fetch_single_value("SELECT CURRENT_REGION() AS \"region\"", "region")
            .await?;
        self.region = Some(region.clone());
        Ok(region)
    }

    /// Returns the account name, queried once.
    pub async fn account_name(&mut self) -> AppResult<String> {
        if let Some(account_name) = &self.account_name {
            return Ok(account_name.clone());
        }

        let account_name = self
            .fetch_single_value("SELECT CURRENT_ACCOUNT() AS \"account\"", "account")
            .await?;
        self.account_name = Some(account_name.clone());
        Ok(account_name)
    }

    /// Returns the account as `region.account`, the form used by replication.
    pub async fn replication_locator(&mut self) -> AppResult<String> {
        let region = self.region().await?;
        let account_name = self.account_name().await?;
        Ok(format!("{region}.{account_name}"))
    }

    async fn fetch_single_value(&mut self, sql: &str, column: &str) -> AppResult<String> {
        let rows = self.fetch_all(sql).await?;
        let row = rows.first().ok_or_else(|| {
            AppError::Internal(format!(
                "query '{sql}' returned no rows on the {} account",
                self.account
            ))
        })?;

        Ok(row.require(column)?.to_owned())
    }

    async fn run_unguarded(&mut self, statement: &Statement) -> AppResult<()> {
        debug!(
            account = %self.account,
            role = self.context.current_role().unwrap_or("<unknown>"),
            statement = %statement.redacted(),
            "executing statement"
        );
        let result = self
            .connection
            .execute(&self.context, &statement.to_string())
            .await;
        self.observe(result)
    }

    fn guard(&self, statement: &Statement) -> AppResult<()> {
        if !statement.is_destructive() {
            return Ok(());
        }

        match self.context.current_role() {
            Some(role) if !self.is_admin_role(role) => Ok(()),
            role => Err(AppError::DestructiveGuard(format!(
                "'{statement}' must run under the owning project role, not '{}'",
                role.unwrap_or("<unknown>")
            ))),
        }
    }

    // Transport failures leave the remote session state unknown.
    fn observe<T>(&mut self, result: AppResult<T>) -> AppResult<T> {
        if let Err(AppError::Internal(_)) = &result {
            self.invalidate_context();
        }

        result
    }
}
