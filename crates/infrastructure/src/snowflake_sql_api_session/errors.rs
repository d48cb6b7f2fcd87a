use grantshift_core::AppError;
use reqwest::StatusCode;

use super::wire::StatementResponse;

const OBJECT_NOT_FOUND_SQL_STATE: &str = "02000";
const OBJECT_NOT_FOUND_CODE: &str = "002003";
const PERMISSION_DENIED_CODES: [&str; 2] = ["003001", "003011"];

/// Maps a failed statement response to an application error.
pub(super) fn statement_error(status: StatusCode, body: &str, sql: &str) -> AppError {
    let response: StatementResponse = serde_json::from_str(body).unwrap_or_default();
    let message = response
        .message
        .clone()
        .unwrap_or_else(|| body.trim().to_owned());
    let detail = format!("{message} (statement: {sql})");

    if status.is_server_error() {
        return AppError::Internal(format!("snowflake returned {status}: {detail}"));
    }

    let code = response.code.as_deref();
    if response.sql_state.as_deref() == Some(OBJECT_NOT_FOUND_SQL_STATE)
        || code == Some(OBJECT_NOT_FOUND_CODE)
    {
        return AppError::ObjectNotFound(detail);
    }
    if code.is_some_and(|code| PERMISSION_DENIED_CODES.contains(&code)) {
        return AppError::PermissionDenied(detail);
    }
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        return AppError::Statement(detail);
    }

    AppError::Internal(format!("snowflake returned {status}: {detail}"))
}

/// Maps a transport failure to an application error.
pub(super) fn transport_error(error: &reqwest::Error, sql: &str) -> AppError {
    AppError::Internal(format!("failed to reach snowflake for statement '{sql}': {error}"))
}
