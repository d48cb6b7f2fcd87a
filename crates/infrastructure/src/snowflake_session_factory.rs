//! Session factory over the Snowflake SQL API.

use std::sync::Arc;

use async_trait::async_trait;
use grantshift_application::{SessionFactory, SessionHandle};
use grantshift_core::{AccountKind, AppResult};

use crate::{SnowflakeApiSettings, SnowflakeCredentials, SnowflakeSqlApiSession};

/// Builds SQL API sessions for the configured accounts.
pub struct SnowflakeSessionFactory {
    http_client: reqwest::Client,
    settings: SnowflakeApiSettings,
    source: SnowflakeCredentials,
    destination: SnowflakeCredentials,
    migration: Option<SnowflakeCredentials>,
}

impl SnowflakeSessionFactory {
    /// Creates a factory for the source and destination accounts.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        settings: SnowflakeApiSettings,
        source: SnowflakeCredentials,
        destination: SnowflakeCredentials,
    ) -> Self {
        Self {
            http_client,
            settings,
            source,
            destination,
            migration: None,
        }
    }

    /// Adds the account used for cross-region replication.
    #[must_use]
    pub fn with_migration_account(mut self, migration: Option<SnowflakeCredentials>) -> Self {
        self.migration = migration;
        self
    }

    fn credentials(&self, account: AccountKind) -> Option<&SnowflakeCredentials> {
        match account {
            AccountKind::Source => Some(&self.source),
            AccountKind::Destination => Some(&self.destination),
            AccountKind::Migration => self.migration.as_ref(),
        }
    }
}

#[async_trait]
impl SessionFactory for SnowflakeSessionFactory {
    async fn open(&self, account: AccountKind) -> AppResult<Option<SessionHandle>> {
        let Some(credentials) = self.credentials(account) else {
            return Ok(None);
        };

        let connection = SnowflakeSqlApiSession::new(
            self.http_client.clone(),
            credentials,
            self.settings.clone(),
        )?;
        Ok(Some(SessionHandle {
            connection: Arc::new(connection),
            user: credentials.user.clone(),
            default_role: credentials.role.clone(),
            default_warehouse: credentials.warehouse.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use grantshift_application::SessionFactory;
    use grantshift_core::AccountKind;

    use super::SnowflakeSessionFactory;
    use crate::{SnowflakeApiSettings, SnowflakeCredentials};

    fn credentials(host: &str, user: &str) -> SnowflakeCredentials {
        SnowflakeCredentials {
            host: host.to_owned(),
            user: user.to_owned(),
            token: "token".to_owned(),
            warehouse: Some("ADMIN_WH".to_owned()),
            role: "ACCOUNTADMIN".to_owned(),
        }
    }

    fn factory() -> SnowflakeSessionFactory {
        SnowflakeSessionFactory::new(
            reqwest::Client::new(),
            SnowflakeApiSettings::default(),
            credentials("source.snowflakecomputing.com", "SOURCE_USER"),
            credentials("target.snowflakecomputing.com", "TARGET_USER"),
        )
    }

    #[tokio::test]
    async fn unconfigured_migration_account_yields_no_session() {
        let opened = factory().open(AccountKind::Migration).await;
        assert!(matches!(opened, Ok(None)));
    }

    #[tokio::test]
    async fn destination_session_uses_destination_identity() {
        let handle = factory()
            .open(AccountKind::Destination)
            .await
            .unwrap_or_else(|_| unreachable!())
            .unwrap_or_else(|| unreachable!());
        assert_eq!(handle.user, "TARGET_USER");
        assert_eq!(handle.default_role, "ACCOUNTADMIN");
        assert_eq!(handle.default_warehouse.as_deref(), Some("ADMIN_WH"));
    }

    #[tokio::test]
    async fn migration_account_is_opened_when_configured() {
        let factory = factory().with_migration_account(Some(credentials(
            "migration.snowflakecomputing.com",
            "MIGRATION_USER",
        )));
        let handle = factory
            .open(AccountKind::Migration)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(handle.is_some_and(|handle| handle.user == "MIGRATION_USER"));
    }

    #[test]
    fn credentials_debug_hides_token() {
        let rendered = format!("{:?}", credentials("acme.snowflakecomputing.com", "U"));
        assert!(rendered.contains("<redacted>"));
        assert!(!rendered.contains("\"token\""));
    }
}
