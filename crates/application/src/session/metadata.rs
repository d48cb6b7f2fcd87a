use std::collections::BTreeMap;

use grantshift_core::{AppError, AppResult};
use grantshift_domain::{
    FutureGrantRecord, GrantRecord, MetadataRow, OWNERSHIP, ObjectName, RoutineDefinition,
    RoutineKind, UserGrantRecord, quote_identifier, quote_literal,
};

use super::Session;
use crate::naming::TIMESTAMP_COLUMN;

impl Session {
    /// Returns `SHOW DATABASES` rows.
    pub async fn show_databases(&mut self) -> AppResult<Vec<MetadataRow>> {
        self.fetch_all("SHOW DATABASES").await
    }

    /// Returns the `SHOW DATABASES` row of one database.
    pub async fn find_database(&mut self, database: &str) -> AppResult<Option<MetadataRow>> {
        let sql = format!("SHOW DATABASES LIKE {}", quote_literal(database));
        Ok(exact_name_match(self.fetch_all(&sql).await?, database))
    }

    /// Returns the single role owning a database.
    ///
    /// Fails with `AmbiguousOwnership` unless exactly one `OWNERSHIP` grant exists.
    /// Only `OWNERSHIP` rows are parsed; shares may be grantees of the others.
    pub async fn ownership_role_on_database(&mut self, database: &str) -> AppResult<String> {
        let sql = format!("SHOW GRANTS ON DATABASE {}", quote_identifier(database));
        let owners: Vec<String> = self
            .fetch_all(&sql)
            .await?
            .iter()
            .filter(|row| row.get("privilege") == Some(OWNERSHIP))
            .map(GrantRecord::from_row)
            .map(|grant| grant.map(|grant| grant.grantee_name().to_owned()))
            .collect::<AppResult<_>>()?;

        match owners.as_slice() {
            [owner] => Ok(owner.clone()),
            _ => Err(AppError::AmbiguousOwnership {
                object: database.to_owned(),
                owners: owners.len(),
            }),
        }
    }

    /// Returns grants held by a role, without personal `USER$` objects.
    pub async fn grants_to_role(&mut self, role: &str) -> AppResult<Vec<GrantRecord>> {
        let sql = format!("SHOW GRANTS TO ROLE {}", quote_identifier(role));
        Ok(parse_grants(&self.fetch_all(&sql).await?)?
            .into_iter()
            .filter(|grant| !grant.is_personal_user_object())
            .collect())
    }

    /// Returns future grant rules held by a role.
    pub async fn future_grants_to_role(&mut self, role: &str) -> AppResult<Vec<FutureGrantRecord>> {
        let sql = format!("SHOW FUTURE GRANTS TO ROLE {}", quote_identifier(role));
        self.fetch_all(&sql)
            .await?
            .iter()
            .map(FutureGrantRecord::from_row)
            .collect()
    }

    /// Returns roles granted to a user, in grant order.
    pub async fn grants_to_user(&mut self, user: &str) -> AppResult<Vec<UserGrantRecord>> {
        let sql = format!("SHOW GRANTS TO USER {}", quote_identifier(user));
        self.fetch_all(&sql)
            .await?
            .iter()
            .map(UserGrantRecord::from_row)
            .collect()
    }

    /// Returns the `SHOW ROLES` row of one role.
    pub async fn find_role(&mut self, role: &str) -> AppResult<Option<MetadataRow>> {
        let sql = format!("SHOW ROLES LIKE {}", quote_literal(role));
        Ok(exact_name_match(self.fetch_all(&sql).await?, role))
    }

    /// Returns the `SHOW USERS` row of one user.
    pub async fn find_user(&mut self, user: &str) -> AppResult<Option<MetadataRow>> {
        let sql = format!("SHOW USERS LIKE {}", quote_literal(user));
        Ok(exact_name_match(self.fetch_all(&sql).await?, user))
    }

    /// Returns the `SHOW WAREHOUSES` row of one warehouse.
    pub async fn find_warehouse(&mut self, warehouse: &str) -> AppResult<Option<MetadataRow>> {
        let sql = format!("SHOW WAREHOUSES LIKE {}", quote_literal(warehouse));
        Ok(exact_name_match(self.fetch_all(&sql).await?, warehouse))
    }

    /// Returns `SHOW SCHEMAS` rows of a database.
    pub async fn schemas_in(&mut self, database: &str) -> AppResult<Vec<MetadataRow>> {
        let sql = format!("SHOW SCHEMAS IN DATABASE {}", quote_identifier(database));
        self.fetch_all(&sql).await
    }

    /// Returns `SHOW TABLES` rows of a schema.
    pub async fn tables_in(&mut self, database: &str, schema: &str) -> AppResult<Vec<MetadataRow>> {
        let sql = format!(
            "SHOW TABLES IN SCHEMA {}",
            ObjectName::from_parts([database, schema])
        );
        self.fetch_all(&sql).await
    }

    /// Returns primary key columns per table of a schema, in key order.
    pub async fn primary_keys_in_schema(
        &mut self,
        database: &str,
        schema: &str,
    ) -> AppResult<BTreeMap<String, Vec<String>>> {
        let sql = format!(
            "SHOW PRIMARY KEYS IN SCHEMA {}",
            ObjectName::from_parts([database, schema])
        );
        group_primary_keys(&self.fetch_all(&sql).await?)
    }

    /// Returns primary key columns of one table, in key order.
    pub async fn primary_keys_in_table(&mut self, table: &ObjectName) -> AppResult<Vec<String>> {
        let sql = format!("SHOW PRIMARY KEYS IN TABLE {table}");
        Ok(group_primary_keys(&self.fetch_all(&sql).await?)?
            .into_values()
            .next()
            .unwrap_or_default())
    }

    /// Returns `SHOW VIEWS` rows of a database.
    pub async fn views_in(&mut self, database: &str) -> AppResult<Vec<MetadataRow>> {
        let sql = format!("SHOW VIEWS IN DATABASE {}", quote_identifier(database));
        self.fetch_all(&sql).await
    }

    /// Returns user-defined routines of a database, described and ready to render.
    ///
    /// `SHOW` also lists built-in routines; only rows whose catalog is the database are kept.
    pub async fn routines_in(
        &mut self,
        kind: RoutineKind,
        database: &str,
    ) -> AppResult<Vec<RoutineDefinition>> {
        let sql = format!("SHOW {} IN DATABASE {}", kind.plural(), quote_identifier(database));
        let mut routines = Vec::new();
        for row in self.fetch_all(&sql).await? {
            if row.get("catalog_name") != Some(database) {
                continue;
            }
            let routine = RoutineDefinition::from_show_row(kind, &row)?;
            let description = self.fetch_all(&routine.describe_sql()).await?;
            routines.push(routine.with_description(&description)?);
        }

        Ok(routines)
    }

    /// Returns the latest `_timestamp` value of a table, if it has rows.
    pub async fn max_timestamp(&mut self, table: &ObjectName) -> AppResult<Option<String>> {
        let sql = format!(
            "SELECT MAX({}) AS \"max_timestamp\" FROM {table}",
            quote_identifier(TIMESTAMP_COLUMN)
        );
        Ok(self
            .fetch_all(&sql)
            .await?
            .first()
            .and_then(|row| row.get("max_timestamp"))
            .map(str::to_owned))
    }

    /// Returns column names of one table.
    pub async fn columns_in(&mut self, table: &ObjectName) -> AppResult<Vec<String>> {
        let sql = format!("SHOW COLUMNS IN TABLE {table}");
        self.fetch_all(&sql)
            .await?
            .iter()
            .map(|row| row.require("column_name").map(str::to_owned))
            .collect()
    }
}

fn parse_grants(rows: &[MetadataRow]) -> AppResult<Vec<GrantRecord>> {
    rows.iter().map(GrantRecord::from_row).collect()
}

// LIKE treats `_` as a wildcard and ignores case.
fn exact_name_match(rows: Vec<MetadataRow>, name: &str) -> Option<MetadataRow> {
    rows.into_iter().find(|row| row.get("name") == Some(name))
}

fn group_primary_keys(rows: &[MetadataRow]) -> AppResult<BTreeMap<String, Vec<String>>> {
    let mut keyed: BTreeMap<String, Vec<(u32, String)>> = BTreeMap::new();
    for row in rows {
        let sequence = row
            .get("key_sequence")
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(u32::MAX);
        keyed
            .entry(row.require("table_name")?.to_owned())
            .or_default()
            .push((sequence, row.require("column_name")?.to_owned()));
    }

    Ok(keyed
        .into_iter()
        .map(|(table, mut columns)| {
            columns.sort_by_key(|(sequence, _)| *sequence);
            (table, columns.into_iter().map(|(_, column)| column).collect())
        })
        .collect())
}
