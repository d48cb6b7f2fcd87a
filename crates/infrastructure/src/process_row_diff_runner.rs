//! Row-level table comparison through an external program.

use async_trait::async_trait;
use grantshift_application::{RowDiffOutcome, RowDiffRequest, RowDiffRunner};
use grantshift_core::{AppError, AppResult};
use tokio::process::Command;
use tracing::debug;

/// User and secret one side of the comparison connects with.
#[derive(Clone)]
pub struct RowDiffCredentials {
    /// Connecting user.
    pub user: String,
    /// Password or access token.
    pub secret: String,
}

impl std::fmt::Debug for RowDiffCredentials {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RowDiffCredentials")
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Runs the configured diff program once per table, without a timeout.
#[derive(Debug, Clone)]
pub struct ProcessRowDiffRunner {
    program: String,
    source: RowDiffCredentials,
    target: RowDiffCredentials,
}

impl ProcessRowDiffRunner {
    /// Creates a runner for the given program and account credentials.
    #[must_use]
    pub fn new(
        program: impl Into<String>,
        source: RowDiffCredentials,
        target: RowDiffCredentials,
    ) -> Self {
        Self {
            program: program.into(),
            source,
            target,
        }
    }

    fn arguments(&self, request: &RowDiffRequest) -> Vec<String> {
        let options = [
            ("sourceAccount", request.source_account.clone()),
            ("sourceUser", self.source.user.clone()),
            ("sourcePassword", self.source.secret.clone()),
            ("targetAccount", request.target_account.clone()),
            ("targetUser", self.target.user.clone()),
            ("targetPassword", self.target.secret.clone()),
            ("role", request.role.clone()),
            ("warehouse", request.warehouse.clone()),
            ("database", request.database.clone()),
            ("schema", request.schema.clone()),
            ("table", request.table.clone()),
            ("extraColumns", request.extra_columns.join(",")),
            ("primaryKeys", request.primary_keys.join(",")),
        ];

        options
            .into_iter()
            .flat_map(|(name, value)| [format!("--{name}"), value])
            .collect()
    }
}

#[async_trait]
impl RowDiffRunner for ProcessRowDiffRunner {
    async fn compare(&self, request: &RowDiffRequest) -> AppResult<RowDiffOutcome> {
        debug!(
            program = %self.program,
            table = %format!("{}.{}.{}", request.database, request.schema, request.table),
            "running row diff"
        );
        let output = Command::new(&self.program)
            .args(self.arguments(request))
            .output()
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to run row diff program '{}': {error}",
                    self.program
                ))
            })?;

        let mut report = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        let errors = String::from_utf8_lossy(&output.stderr);
        if !errors.trim().is_empty() {
            if !report.is_empty() {
                report.push('\n');
            }
            report.push_str(errors.trim());
        }

        Ok(RowDiffOutcome {
            succeeded: output.status.success(),
            report,
        })
    }
}
