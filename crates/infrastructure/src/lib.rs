//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod process_row_diff_runner;
mod snowflake_session_factory;
mod snowflake_sql_api_session;

pub use process_row_diff_runner::{ProcessRowDiffRunner, RowDiffCredentials};
pub use snowflake_session_factory::SnowflakeSessionFactory;
pub use snowflake_sql_api_session::{
    SnowflakeApiSettings, SnowflakeCredentials, SnowflakeSqlApiSession,
};
