use std::collections::HashMap;
use std::env;

use grantshift_application::MigrationSettings;
use grantshift_core::{AppError, AppResult};
use grantshift_domain::Password;
use grantshift_infrastructure::{RowDiffCredentials, SnowflakeApiSettings, SnowflakeCredentials};

const DEFAULT_ROW_DIFF_COMMAND: &str = "data-diff-snowflake";
const DEFAULT_ROLE: &str = "ACCOUNTADMIN";

/// Action selected by the first command line argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliAction {
    Run,
    Check,
    Cleanup,
}

impl CliAction {
    pub fn from_arg(argument: Option<&str>) -> AppResult<Self> {
        match argument.map(str::trim) {
            None | Some("") | Some("run") => Ok(Self::Run),
            Some("check") => Ok(Self::Check),
            Some("cleanup") => Ok(Self::Cleanup),
            Some(other) => Err(AppError::Validation(format!(
                "unknown action '{other}', expected run, check or cleanup"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Run => "run",
            Self::Check => "check",
            Self::Cleanup => "cleanup",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CliConfig {
    pub databases: Vec<String>,
    pub source: SnowflakeCredentials,
    pub destination: SnowflakeCredentials,
    pub migration: Option<SnowflakeCredentials>,
    pub api: SnowflakeApiSettings,
    pub synchronize: bool,
    pub dry_run_cleanup: bool,
    pub skip_dev_branches: bool,
    pub warehouse_size: String,
    pub passwords: HashMap<String, Password>,
    pub protected_users: Vec<String>,
    pub row_diff_command: String,
}

impl CliConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> AppResult<Self> {
        let value = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let required = |name: &str| {
            value(name).ok_or_else(|| AppError::Validation(format!("{name} is required")))
        };
        let flag = |name: &str, default: bool| match value(name) {
            None => Ok(default),
            Some(raw) => parse_bool(name, &raw),
        };
        let credentials = |prefix: &str| -> AppResult<SnowflakeCredentials> {
            Ok(SnowflakeCredentials {
                host: required(&format!("{prefix}_SNOWFLAKE_HOST"))?,
                user: required(&format!("{prefix}_SNOWFLAKE_USER"))?,
                token: required(&format!("{prefix}_SNOWFLAKE_TOKEN"))?,
                warehouse: value(&format!("{prefix}_SNOWFLAKE_WAREHOUSE")),
                role: value(&format!("{prefix}_SNOWFLAKE_ROLE"))
                    .unwrap_or_else(|| DEFAULT_ROLE.to_owned()),
            })
        };

        let databases = split_list(&required("MIGRATE_DATABASES")?);
        if databases.is_empty() {
            return Err(AppError::Validation(
                "MIGRATE_DATABASES must name at least one database".to_owned(),
            ));
        }

        let migration = if value("MIGRATION_SNOWFLAKE_HOST").is_some() {
            Some(credentials("MIGRATION")?)
        } else {
            None
        };

        let mut api = SnowflakeApiSettings::default();
        if let Some(token_type) = value("SNOWFLAKE_TOKEN_TYPE") {
            api.token_type = token_type;
        }
        if let Some(raw) = value("SNOWFLAKE_STATEMENT_TIMEOUT_SECONDS") {
            api.statement_timeout_seconds = raw.parse::<u64>().map_err(|error| {
                AppError::Validation(format!(
                    "SNOWFLAKE_STATEMENT_TIMEOUT_SECONDS must be a positive integer: {error}"
                ))
            })?;
        }

        let passwords = match value("MIGRATION_USER_PASSWORDS") {
            Some(raw) => parse_passwords(&raw)?,
            None => HashMap::new(),
        };

        Ok(Self {
            databases,
            source: credentials("SOURCE")?,
            destination: credentials("TARGET")?,
            migration,
            api,
            synchronize: flag("MIGRATION_SYNCHRONIZE", false)?,
            dry_run_cleanup: flag("MIGRATION_DRY_PREMIGRATION_CLEANUP", true)?,
            skip_dev_branches: flag("MIGRATION_SKIP_DEV_BRANCHES", false)?,
            warehouse_size: value("MIGRATION_WAREHOUSE_SIZE")
                .map(|size| size.to_uppercase())
                .unwrap_or_else(|| "SMALL".to_owned()),
            passwords,
            protected_users: value("MIGRATION_PROTECTED_USERS")
                .map(|raw| split_list(&raw))
                .unwrap_or_default(),
            row_diff_command: value("ROW_DIFF_COMMAND")
                .unwrap_or_else(|| DEFAULT_ROW_DIFF_COMMAND.to_owned()),
        })
    }

    pub fn migration_settings(&self) -> MigrationSettings {
        let mut settings = MigrationSettings::new(self.databases.clone());
        settings.synchronize = self.synchronize;
        settings.dry_run_cleanup = self.dry_run_cleanup;
        settings.skip_dev_branches = self.skip_dev_branches;
        settings.warehouse_size = self.warehouse_size.clone();
        settings.passwords = self.passwords.clone();
        settings.protected_users = self.protected_users.clone();
        settings
    }

    pub fn row_diff_credentials(&self) -> (RowDiffCredentials, RowDiffCredentials) {
        let side = |credentials: &SnowflakeCredentials| RowDiffCredentials {
            user: credentials.user.clone(),
            secret: credentials.token.clone(),
        };
        (side(&self.source), side(&self.destination))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .collect()
}

fn parse_bool(name: &str, raw: &str) -> AppResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(AppError::Validation(format!(
            "{name} must be true or false, got '{raw}'"
        ))),
    }
}

fn parse_passwords(raw: &str) -> AppResult<HashMap<String, Password>> {
    let values: HashMap<String, String> = serde_json::from_str(raw).map_err(|error| {
        AppError::Validation(format!(
            "MIGRATION_USER_PASSWORDS must be a JSON object of user to password: {error}"
        ))
    })?;

    values
        .into_iter()
        .map(|(user, password)| Ok((user, Password::new(password)?)))
        .collect()
}
