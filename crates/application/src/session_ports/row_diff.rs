use async_trait::async_trait;
use grantshift_core::AppResult;
use serde::{Deserialize, Serialize};

/// Parameters of one row-level table comparison.
///
/// Credentials are owned by the runner, not carried here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiffRequest {
    /// Source account locator, `account.region`.
    pub source_account: String,
    /// Destination account locator, `account.region`.
    pub target_account: String,
    /// Role the comparison reads as.
    pub role: String,
    /// Warehouse the comparison runs on.
    pub warehouse: String,
    /// Database name.
    pub database: String,
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Primary key columns.
    pub primary_keys: Vec<String>,
    /// Non-key columns to compare.
    pub extra_columns: Vec<String>,
}

/// Result of one row-level comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDiffOutcome {
    /// Whether both sides hold the same rows.
    pub succeeded: bool,
    /// Text summary produced by the comparison tool.
    pub report: String,
}

/// Port for the external row-level diff capability.
#[async_trait]
pub trait RowDiffRunner: Send + Sync {
    /// Compares one table between the two accounts. Runs without a timeout.
    async fn compare(&self, request: &RowDiffRequest) -> AppResult<RowDiffOutcome>;
}
