mod row_diff;
mod warehouse;

pub use row_diff::{RowDiffOutcome, RowDiffRequest, RowDiffRunner};
pub use warehouse::{SessionFactory, SessionHandle, WarehouseSession};
