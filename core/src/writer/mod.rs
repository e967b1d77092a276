//! The batch-write path: records in, parameterized statements out, flushed in bounded batches.

mod batch;
mod error;
mod identity;
mod materialize;
mod orchestrator;
mod table;

pub use batch::{Batch, BatchAccumulator, BatchExecutor, QueuedStatement};
pub use error::{classify, BackendErrorDetail, Classification, ExecuteBatchError, WriteError};
pub use identity::{rehash_identity, rehash_row_identities};
pub use materialize::{
    check_record_columns, materialize, record_table_name, MaterializeError, RowTuple,
    TABLE_NAME_METADATA_KEY,
};
pub use orchestrator::{WriteMessage, WriteSummary, Writer, WriterSettings};
pub use table::{
    ColumnDefinition, ColumnRole, ListTablesError, PrimaryKeyConstraint, TableDefinition,
    TableLister, TableRegistry, PARENT_ROW_ID_COLUMN, ROW_ID_COLUMN,
};
