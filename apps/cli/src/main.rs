//! Grantshift command line: migrates a project between warehouse accounts.

#![forbid(unsafe_code)]

mod cli_config;

use std::env;
use std::sync::Arc;
use std::time::Duration;

use grantshift_application::{MigrationService, MigrationSessions};
use grantshift_core::AppError;
use grantshift_infrastructure::{ProcessRowDiffRunner, SnowflakeSessionFactory};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli_config::{CliAction, CliConfig};

// Client-side limit on top of the statement timeout the server enforces.
const HTTP_TIMEOUT_MARGIN_SECONDS: u64 = 60;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let action = CliAction::from_arg(env::args().nth(1).as_deref())?;
    let config = CliConfig::load()?;
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(
            config.api.statement_timeout_seconds + HTTP_TIMEOUT_MARGIN_SECONDS,
        ))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let factory = SnowflakeSessionFactory::new(
        http_client,
        config.api.clone(),
        config.source.clone(),
        config.destination.clone(),
    )
    .with_migration_account(config.migration.clone());
    let (source_credentials, target_credentials) = config.row_diff_credentials();
    let row_diff = ProcessRowDiffRunner::new(
        config.row_diff_command.as_str(),
        source_credentials,
        target_credentials,
    );
    let service = MigrationService::new(config.migration_settings(), Arc::new(row_diff));

    info!(
        action = action.as_str(),
        databases = ?config.databases,
        synchronize = config.synchronize,
        cross_region_account = config.migration.is_some(),
        "grantshift started"
    );
    let mut sessions = MigrationSessions::open(&factory).await?;

    match action {
        CliAction::Run => {
            let summary = service.run(&mut sessions).await?;
            info!(
                elapsed_seconds = (summary.finished_at - summary.started_at).num_seconds(),
                cleaned = summary.cleaned,
                replayed = summary.access.succeeded(),
                retried = summary.retried.attempted(),
                still_failing = summary.retried.failed().len(),
                cleanup_failures = summary.cleanup_failures,
                "migration completed"
            );
        }
        CliAction::Check => {
            let summary = service.check(&mut sessions).await?;
            if summary.is_clean() {
                info!("verification completed without differences");
            } else {
                warn!(
                    structure = summary.structure.len(),
                    data = summary.data.len(),
                    "verification found differences"
                );
            }
        }
        CliAction::Cleanup => {
            let executed = service.cleanup(&mut sessions).await?;
            info!(executed, "cleanup completed");
        }
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}
