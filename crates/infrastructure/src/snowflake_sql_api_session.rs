//! Snowflake SQL API implementation of the warehouse session port.

use std::time::Duration;

use async_trait::async_trait;
use grantshift_application::WarehouseSession;
use grantshift_core::{AppError, AppResult, SessionContext};
use grantshift_domain::MetadataRow;
use reqwest::StatusCode;
use tracing::debug;
use url::Url;

mod errors;
mod wire;

use errors::{statement_error, transport_error};
use wire::{PartitionResponse, StatementRequest, StatementResponse, into_rows};

const STATEMENTS_PATH: &str = "/api/v2/statements";
const TOKEN_TYPE_HEADER: &str = "X-Snowflake-Authorization-Token-Type";
const INITIAL_POLL_INTERVAL: Duration = Duration::from_millis(250);
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(5);
const CONTEXT_PROBE: &str = "SELECT 1";

/// Connection settings of one Snowflake account.
#[derive(Clone)]
pub struct SnowflakeCredentials {
    /// Account host, e.g. `xy12345.eu-central-1.snowflakecomputing.com`.
    pub host: String,
    /// Connecting user.
    pub user: String,
    /// Access token sent as bearer credential.
    pub token: String,
    /// Warehouse statements start on.
    pub warehouse: Option<String>,
    /// Administrative role statements start under.
    pub role: String,
}

impl std::fmt::Debug for SnowflakeCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SnowflakeCredentials")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("token", &"<redacted>")
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .finish()
    }
}

/// Settings shared by every SQL API session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnowflakeApiSettings {
    /// Value of the token type header.
    pub token_type: String,
    /// Server-side timeout of one statement.
    pub statement_timeout_seconds: u64,
}

impl Default for SnowflakeApiSettings {
    fn default() -> Self {
        Self {
            token_type: "PROGRAMMATIC_ACCESS_TOKEN".to_owned(),
            statement_timeout_seconds: 3600,
        }
    }
}

/// Stateless SQL API client; the role and namespace travel with every statement.
pub struct SnowflakeSqlApiSession {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
    settings: SnowflakeApiSettings,
}

impl SnowflakeSqlApiSession {
    /// Creates a session for one account.
    pub fn new(
        http_client: reqwest::Client,
        credentials: &SnowflakeCredentials,
        settings: SnowflakeApiSettings,
    ) -> AppResult<Self> {
        Ok(Self {
            http_client,
            base_url: base_url(&credentials.host)?,
            token: credentials.token.clone(),
            settings,
        })
    }

    async fn submit(&self, context: &SessionContext, sql: &str) -> AppResult<Vec<MetadataRow>> {
        let url = self.resolve(STATEMENTS_PATH)?;
        let request = StatementRequest::new(sql, self.settings.statement_timeout_seconds, context);
        debug!(role = ?context.current_role(), sql = %sql, "submitting statement");

        let response = self
            .authorized(self.http_client.post(url))
            .json(&request)
            .send()
            .await
            .map_err(|error| transport_error(&error, sql))?;

        let result = match self.read_response(response, sql).await? {
            Progress::Finished(result) => result,
            Progress::Running(status_url) => self.wait_for_completion(&status_url, sql).await?,
        };
        self.collect_rows(result, sql).await
    }

    async fn wait_for_completion(
        &self,
        status_url: &str,
        sql: &str,
    ) -> AppResult<StatementResponse> {
        let url = self.resolve(status_url)?;
        let mut interval = INITIAL_POLL_INTERVAL;
        loop {
            tokio::time::sleep(interval).await;
            interval = (interval * 2).min(MAX_POLL_INTERVAL);

            let response = self
                .authorized(self.http_client.get(url.clone()))
                .send()
                .await
                .map_err(|error| transport_error(&error, sql))?;
            if let Progress::Finished(result) = self.read_response(response, sql).await? {
                return Ok(result);
            }
            debug!(sql = %sql, "statement still running");
        }
    }

    async fn collect_rows(
        &self,
        mut result: StatementResponse,
        sql: &str,
    ) -> AppResult<Vec<MetadataRow>> {
        let partitions = result.partition_count();
        let first_page = std::mem::take(&mut result.data);
        let mut rows = into_rows(result.columns(), first_page);
        if partitions == 1 {
            return Ok(rows);
        }

        let Some(handle) = result.statement_handle.as_deref() else {
            return Err(AppError::Internal(format!(
                "result of '{sql}' has {partitions} partitions but no statement handle"
            )));
        };
        for partition in 1..partitions {
            let url = partition_url(&self.resolve(STATEMENTS_PATH)?, handle, partition)?;
            let response = self
                .authorized(self.http_client.get(url))
                .send()
                .await
                .map_err(|error| transport_error(&error, sql))?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|error| transport_error(&error, sql))?;
            if status != StatusCode::OK {
                return Err(statement_error(status, &body, sql));
            }

            let page: PartitionResponse = serde_json::from_str(&body).map_err(|error| {
                AppError::Internal(format!(
                    "failed to decode partition {partition} of '{sql}': {error}"
                ))
            })?;
            rows.extend(into_rows(result.columns(), page.data));
        }

        Ok(rows)
    }

    async fn read_response(&self, response: reqwest::Response, sql: &str) -> AppResult<Progress> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| transport_error(&error, sql))?;

        match status {
            StatusCode::OK => serde_json::from_str(&body)
                .map(Progress::Finished)
                .map_err(|error| {
                    AppError::Internal(format!("failed to decode result of '{sql}': {error}"))
                }),
            StatusCode::ACCEPTED => {
                let pending: StatementResponse = serde_json::from_str(&body).unwrap_or_default();
                pending
                    .statement_status_url
                    .map(Progress::Running)
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "statement '{sql}' was accepted without a status url"
                        ))
                    })
            }
            _ => Err(statement_error(status, &body, sql)),
        }
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.token)
            .header(TOKEN_TYPE_HEADER, self.settings.token_type.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
    }

    fn resolve(&self, path: &str) -> AppResult<Url> {
        self.base_url
            .join(path)
            .map_err(|error| AppError::Internal(format!("invalid snowflake url '{path}': {error}")))
    }
}

enum Progress {
    Finished(StatementResponse),
    Running(String),
}

#[async_trait]
impl WarehouseSession for SnowflakeSqlApiSession {
    async fn fetch_all(&self, context: &SessionContext, sql: &str) -> AppResult<Vec<MetadataRow>> {
        self.submit(context, sql).await
    }

    async fn execute(&self, context: &SessionContext, sql: &str) -> AppResult<()> {
        // Context switches are carried by the request; probing validates the new context.
        let statement = if is_context_switch(sql) {
            CONTEXT_PROBE
        } else {
            sql
        };
        self.submit(context, statement).await.map(|_| ())
    }
}

fn base_url(host: &str) -> AppResult<Url> {
    let host = host.trim().trim_end_matches('/');
    let address = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("https://{host}")
    };

    Url::parse(&address)
        .map_err(|error| AppError::Validation(format!("invalid snowflake host '{host}': {error}")))
}

fn partition_url(statements: &Url, handle: &str, partition: usize) -> AppResult<Url> {
    let mut url = statements.clone();
    url.path_segments_mut()
        .map_err(|()| AppError::Internal(format!("cannot extend url '{statements}'")))?
        .push(handle);
    url.query_pairs_mut()
        .append_pair("partition", &partition.to_string());
    Ok(url)
}

fn is_context_switch(sql: &str) -> bool {
    sql.trim_start()
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("USE "))
}
