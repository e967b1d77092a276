use std::fmt;

use bb8::RunError;
use tokio_postgres::error::{DbError, ErrorPosition};

use crate::writer::{materialize::MaterializeError, table::ListTablesError};

/// Diagnostics reported by the destination when it rejects a statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackendErrorDetail {
    pub severity: String,
    pub code: String,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
    pub position: Option<u32>,
    pub internal_position: Option<u32>,
    pub internal_query: Option<String>,
    pub where_: Option<String>,
    pub schema_name: Option<String>,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub data_type_name: Option<String>,
    pub constraint_name: Option<String>,
    pub file: Option<String>,
    pub line: Option<u32>,
    pub routine: Option<String>,
}

impl From<&DbError> for BackendErrorDetail {
    fn from(err: &DbError) -> Self {
        let (position, internal_position, internal_query) = match err.position() {
            Some(ErrorPosition::Original(position)) => (Some(*position), None, None),
            Some(ErrorPosition::Internal { position, query }) => {
                (None, Some(*position), Some(query.clone()))
            }
            None => (None, None, None),
        };

        BackendErrorDetail {
            severity: err.severity().to_string(),
            code: err.code().code().to_string(),
            message: err.message().to_string(),
            detail: err.detail().map(str::to_string),
            hint: err.hint().map(str::to_string),
            position,
            internal_position,
            internal_query,
            where_: err.where_().map(str::to_string),
            schema_name: err.schema().map(str::to_string),
            table_name: err.table().map(str::to_string),
            column_name: err.column().map(str::to_string),
            data_type_name: err.datatype().map(str::to_string),
            constraint_name: err.constraint().map(str::to_string),
            file: err.file().map(str::to_string),
            line: err.line(),
            routine: err.routine().map(str::to_string),
        }
    }
}

impl fmt::Display for BackendErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn text(value: &Option<String>) -> &str {
            value.as_deref().unwrap_or("")
        }

        write!(
            f,
            "severity: {}, code: {}, message: {}, detail: {}, hint: {}, position: {}, \
             internal_position: {}, internal_query: {}, where: {}, schema_name: {}, \
             table_name: {}, column_name: {}, data_type_name: {}, constraint_name: {}, file: {}, \
             line: {}, routine: {}",
            self.severity,
            self.code,
            self.message,
            text(&self.detail),
            text(&self.hint),
            self.position.unwrap_or(0),
            self.internal_position.unwrap_or(0),
            text(&self.internal_query),
            text(&self.where_),
            text(&self.schema_name),
            text(&self.table_name),
            text(&self.column_name),
            text(&self.data_type_name),
            text(&self.constraint_name),
            text(&self.file),
            self.line.unwrap_or(0),
            text(&self.routine),
        )
    }
}

/// Failure of a destination while executing one batch.
#[derive(thiserror::Error, Debug)]
pub enum ExecuteBatchError {
    /// The statement at `index` within the batch failed.
    #[error("statement {index} of the batch failed: {source}")]
    Statement {
        index: usize,
        #[source]
        source: tokio_postgres::Error,
    },

    #[error("PgError {0}")]
    PgError(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),

    /// A destination that is not Postgres reporting a structured rejection.
    #[error("destination rejected statement: {detail}")]
    Rejected { index: Option<usize>, detail: BackendErrorDetail },

    #[error("{0}")]
    Transport(String),
}

/// What a flush failure means for the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// The destination rejected a statement; `statement_index` points into the flushed batch when
    /// known.
    Backend { statement_index: Option<usize>, detail: BackendErrorDetail },
    /// Connectivity or protocol failure, not recoverable by this write.
    Transport,
}

pub fn classify(err: &ExecuteBatchError) -> Classification {
    fn from_pg(err: &tokio_postgres::Error, statement_index: Option<usize>) -> Classification {
        match err.as_db_error() {
            Some(db_error) => Classification::Backend {
                statement_index,
                detail: BackendErrorDetail::from(db_error),
            },
            None => Classification::Transport,
        }
    }

    match err {
        ExecuteBatchError::Statement { index, source } => from_pg(source, Some(*index)),
        ExecuteBatchError::PgError(source) => from_pg(source, None),
        ExecuteBatchError::ConnectionPoolError(RunError::User(source)) => from_pg(source, None),
        ExecuteBatchError::ConnectionPoolError(RunError::TimedOut) => Classification::Transport,
        ExecuteBatchError::Rejected { index, detail } => {
            Classification::Backend { statement_index: *index, detail: detail.clone() }
        }
        ExecuteBatchError::Transport(_) => Classification::Transport,
    }
}

#[derive(thiserror::Error, Debug)]
pub enum WriteError {
    #[error("table name not found in record metadata (key `{0}`)")]
    MissingTableMetadata(&'static str),

    #[error("table {0} not found")]
    UnknownTable(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(#[from] MaterializeError),

    #[error("could not list destination tables: {0}")]
    TableLookup(#[from] ListTablesError),

    #[error("failed to execute batch with backend error: {detail} (table: {}, statement: {})",
        .table.as_deref().unwrap_or("unknown"),
        .statement.as_deref().unwrap_or("unknown"))]
    StructuredBackend {
        table: Option<String>,
        statement: Option<String>,
        detail: BackendErrorDetail,
        #[source]
        source: ExecuteBatchError,
    },

    #[error("failed to execute batch: {source}")]
    Transport {
        #[source]
        source: ExecuteBatchError,
    },

    #[error("write cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique_violation() -> BackendErrorDetail {
        BackendErrorDetail {
            severity: "ERROR".to_string(),
            code: "23505".to_string(),
            message: "duplicate key value violates unique constraint \"test_data_pkey\""
                .to_string(),
            detail: Some("Key (id)=(1) already exists.".to_string()),
            schema_name: Some("public".to_string()),
            table_name: Some("test_data".to_string()),
            constraint_name: Some("test_data_pkey".to_string()),
            file: Some("nbtinsert.c".to_string()),
            line: Some(664),
            routine: Some("_bt_check_unique".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_backend_detail_formats_every_field() {
        let formatted = unique_violation().to_string();

        assert_eq!(
            formatted,
            "severity: ERROR, code: 23505, message: duplicate key value violates unique constraint \
             \"test_data_pkey\", detail: Key (id)=(1) already exists., hint: , position: 0, \
             internal_position: 0, internal_query: , where: , schema_name: public, \
             table_name: test_data, column_name: , data_type_name: , \
             constraint_name: test_data_pkey, file: nbtinsert.c, line: 664, \
             routine: _bt_check_unique"
        );
    }

    #[test]
    fn test_classify_rejection_as_backend() {
        let err = ExecuteBatchError::Rejected { index: Some(3), detail: unique_violation() };

        match classify(&err) {
            Classification::Backend { statement_index, detail } => {
                assert_eq!(statement_index, Some(3));
                assert_eq!(detail.constraint_name.as_deref(), Some("test_data_pkey"));
            }
            Classification::Transport => panic!("expected backend classification"),
        }
    }

    #[test]
    fn test_classify_transport() {
        assert_eq!(
            classify(&ExecuteBatchError::Transport("connection reset by peer".to_string())),
            Classification::Transport
        );
        assert_eq!(
            classify(&ExecuteBatchError::ConnectionPoolError(RunError::TimedOut)),
            Classification::Transport
        );
    }

    #[test]
    fn test_structured_backend_message_carries_context() {
        let detail = unique_violation();
        let err = WriteError::StructuredBackend {
            table: Some("test_data".to_string()),
            statement: Some("insert into \"test_data\" (\"id\") values ($1)".to_string()),
            detail: detail.clone(),
            source: ExecuteBatchError::Rejected { index: Some(0), detail },
        };

        let message = err.to_string();
        assert!(message.contains("constraint_name: test_data_pkey"));
        assert!(message.contains("duplicate key value violates unique constraint"));
        assert!(message.contains("table: test_data"));
        assert!(message.contains("insert into \"test_data\""));
    }
}
