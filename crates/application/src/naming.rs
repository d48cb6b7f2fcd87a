/// Suffix of databases created from a migration share.
pub const SHARE_DATABASE_SUFFIX: &str = "_SHARE";

/// Suffix of databases renamed aside by pre-migration cleanup.
pub const OLD_DATABASE_SUFFIX: &str = "_OLD";

/// Schemas that are never cloned.
pub const SKIPPED_SCHEMAS: &[&str] = &["INFORMATION_SCHEMA", "PUBLIC"];

/// Column holding the last-change timestamp of replicated tables.
pub const TIMESTAMP_COLUMN: &str = "_timestamp";

/// Returns the name of the database created from a database's share.
#[must_use]
pub fn share_database(database: &str) -> String {
    format!("{database}{SHARE_DATABASE_SUFFIX}")
}

/// Returns the name a database is renamed to before migration.
#[must_use]
pub fn old_database(database: &str) -> String {
    format!("{database}{OLD_DATABASE_SUFFIX}")
}

/// Returns the name of the share exposing a database.
#[must_use]
pub fn migration_share(database: &str) -> String {
    format!("MIGRATION_SHARE_{database}")
}

/// Returns true for development branch schemas, named `{branchId}_{bucket}`.
#[must_use]
pub fn is_dev_branch_schema(schema: &str) -> bool {
    schema.split_once('_').is_some_and(|(branch, rest)| {
        !branch.is_empty()
            && !rest.is_empty()
            && branch.chars().all(|character| character.is_ascii_digit())
    })
}

/// Returns true for schemas that are never cloned.
#[must_use]
pub fn is_skipped_schema(schema: &str) -> bool {
    SKIPPED_SCHEMAS.contains(&schema)
}

#[cfg(test)]
mod tests {
    use super::{is_dev_branch_schema, migration_share, old_database, share_database};

    #[test]
    fn derived_names_use_fixed_suffixes() {
        assert_eq!(share_database("SALES"), "SALES_SHARE");
        assert_eq!(old_database("SALES"), "SALES_OLD");
        assert_eq!(migration_share("SALES"), "MIGRATION_SHARE_SALES");
    }

    #[test]
    fn dev_branch_schemas_start_with_digits() {
        assert!(is_dev_branch_schema("1234_in.c-main"));
        assert!(!is_dev_branch_schema("in.c-main"));
        assert!(!is_dev_branch_schema("1234_"));
        assert!(!is_dev_branch_schema("12a_x"));
    }
}
