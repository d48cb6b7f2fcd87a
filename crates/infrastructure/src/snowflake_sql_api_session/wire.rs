use grantshift_core::SessionContext;
use grantshift_domain::{MetadataRow, quote_identifier};
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// Body of a statement submission.
#[derive(Debug, Serialize)]
pub(super) struct StatementRequest<'a> {
    pub statement: &'a str,
    pub timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
}

impl<'a> StatementRequest<'a> {
    pub fn new(statement: &'a str, timeout: u64, context: &SessionContext) -> Self {
        Self {
            statement,
            timeout,
            role: context.current_role().map(quote_identifier),
            warehouse: context.current_warehouse().map(quote_identifier),
            database: context.current_database().map(quote_identifier),
            schema: context.current_schema().map(quote_identifier),
        }
    }
}

/// Statement result, pending status or error body; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct StatementResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub sql_state: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub statement_handle: Option<String>,
    #[serde(default)]
    pub statement_status_url: Option<String>,
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

impl StatementResponse {
    pub fn columns(&self) -> &[ColumnType] {
        self.result_set_meta_data
            .as_ref()
            .map(|meta| meta.row_type.as_slice())
            .unwrap_or_default()
    }

    pub fn partition_count(&self) -> usize {
        self.result_set_meta_data
            .as_ref()
            .map_or(1, |meta| meta.partition_info.len().max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct ResultSetMetaData {
    #[serde(default)]
    pub row_type: Vec<ColumnType>,
    #[serde(default)]
    pub partition_info: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ColumnType {
    pub name: String,
}

/// Body of a follow-up partition fetch.
#[derive(Debug, Default, Deserialize)]
pub(super) struct PartitionResponse {
    #[serde(default)]
    pub data: Vec<Vec<Option<String>>>,
}

/// Converts result rows to metadata rows keyed by lower-case column name; NULLs are omitted.
pub(super) fn into_rows(columns: &[ColumnType], data: Vec<Vec<Option<String>>>) -> Vec<MetadataRow> {
    data.into_iter()
        .map(|values| {
            let mut row = MetadataRow::new();
            for (column, value) in columns.iter().zip(values) {
                if let Some(value) = value {
                    row.insert(&column.name, value);
                }
            }
            row
        })
        .collect()
}
