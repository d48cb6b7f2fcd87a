use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use grantshift_core::{AccountKind, AppError, AppResult, SessionContext};
use grantshift_domain::MetadataRow;
use tokio::sync::Mutex;

use crate::Session;
use crate::session_ports::{SessionHandle, WarehouseSession};

/// Error kinds a fake statement can fail with.
#[derive(Debug, Clone, Copy)]
pub(crate) enum FakeFailure {
    NotFound,
    Denied,
    Internal,
}

impl FakeFailure {
    fn to_error(self, sql: &str) -> AppError {
        match self {
            Self::NotFound => AppError::ObjectNotFound(sql.to_owned()),
            Self::Denied => AppError::PermissionDenied(sql.to_owned()),
            Self::Internal => AppError::Internal(sql.to_owned()),
        }
    }
}

/// One executed statement together with the role it ran under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Executed {
    pub role: Option<String>,
    pub sql: String,
}

#[derive(Default)]
pub(crate) struct FakeWarehouse {
    responses: Mutex<HashMap<String, Vec<MetadataRow>>>,
    failures: Mutex<HashMap<String, FakeFailure>>,
    transient_failures: Mutex<HashMap<String, FakeFailure>>,
    executed: Mutex<Vec<Executed>>,
    queries: Mutex<Vec<String>>,
}

impl FakeWarehouse {
    pub(crate) async fn respond(&self, sql: &str, rows: Vec<MetadataRow>) {
        self.responses.lock().await.insert(sql.to_owned(), rows);
    }

    pub(crate) async fn fail(&self, sql: &str, failure: FakeFailure) {
        self.failures.lock().await.insert(sql.to_owned(), failure);
    }

    /// Fails the next execution of a statement only.
    pub(crate) async fn fail_once(&self, sql: &str, failure: FakeFailure) {
        self.transient_failures
            .lock()
            .await
            .insert(sql.to_owned(), failure);
    }

    pub(crate) async fn recover(&self, sql: &str) {
        self.failures.lock().await.remove(sql);
    }

    pub(crate) async fn executed(&self) -> Vec<Executed> {
        self.executed.lock().await.clone()
    }

    /// Executed statements without context switches.
    pub(crate) async fn statements(&self) -> Vec<String> {
        self.executed
            .lock()
            .await
            .iter()
            .filter(|executed| !executed.sql.starts_with("USE "))
            .map(|executed| executed.sql.clone())
            .collect()
    }

    pub(crate) async fn queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }
}

#[async_trait]
impl WarehouseSession for FakeWarehouse {
    async fn fetch_all(&self, _context: &SessionContext, sql: &str) -> AppResult<Vec<MetadataRow>> {
        self.queries.lock().await.push(sql.to_owned());
        if let Some(failure) = self.failures.lock().await.get(sql) {
            return Err(failure.to_error(sql));
        }

        Ok(self
            .responses
            .lock()
            .await
            .get(sql)
            .cloned()
            .unwrap_or_default())
    }

    async fn execute(&self, context: &SessionContext, sql: &str) -> AppResult<()> {
        if let Some(failure) = self.transient_failures.lock().await.remove(sql) {
            return Err(failure.to_error(sql));
        }
        if let Some(failure) = self.failures.lock().await.get(sql) {
            return Err(failure.to_error(sql));
        }

        self.executed.lock().await.push(Executed {
            role: context.current_role().map(str::to_owned),
            sql: sql.to_owned(),
        });
        Ok(())
    }
}

pub(crate) fn session(account: AccountKind, warehouse: &Arc<FakeWarehouse>) -> Session {
    Session::new(
        account,
        SessionHandle {
            connection: warehouse.clone(),
            user: "MIGRATE".to_owned(),
            default_role: "ACCOUNTADMIN".to_owned(),
            default_warehouse: Some("ADMIN_WH".to_owned()),
        },
    )
}

pub(crate) fn row(pairs: &[(&str, &str)]) -> MetadataRow {
    MetadataRow::from_pairs(pairs.iter().copied())
}

pub(crate) fn grant_row(
    privilege: &str,
    granted_on: &str,
    name: &str,
    grantee: &str,
    granted_by: &str,
) -> MetadataRow {
    row(&[
        ("privilege", privilege),
        ("granted_on", granted_on),
        ("name", name),
        ("granted_to", "ROLE"),
        ("grantee_name", grantee),
        ("grant_option", "false"),
        ("granted_by", granted_by),
    ])
}
