use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::writer::{
    error::{classify, Classification, ExecuteBatchError, WriteError},
    materialize::RowTuple,
};

/// One parameterized statement waiting in a batch.
#[derive(Debug, Clone)]
pub struct QueuedStatement {
    /// Owning table, kept for error context.
    pub table: Arc<str>,
    pub sql: Arc<str>,
    pub params: RowTuple,
}

#[derive(Debug, Default)]
pub struct Batch {
    statements: Vec<QueuedStatement>,
}

impl Batch {
    pub fn with_capacity(capacity: usize) -> Self {
        Batch { statements: Vec::with_capacity(capacity) }
    }

    pub fn push(&mut self, statement: QueuedStatement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    pub fn statements(&self) -> &[QueuedStatement] {
        &self.statements
    }

    /// The table every statement belongs to, if there is exactly one.
    fn single_table(&self) -> Option<&Arc<str>> {
        let first = &self.statements.first()?.table;
        self.statements.iter().all(|s| &s.table == first).then_some(first)
    }
}

/// Submits a whole batch to the destination and waits for the outcome.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute_batch(&self, batch: &Batch) -> Result<(), ExecuteBatchError>;
}

/// Owns the open batch of one write and flushes it when it reaches `max_batch_size`.
pub struct BatchAccumulator<'a, E: BatchExecutor + ?Sized> {
    executor: &'a E,
    max_batch_size: usize,
    batch: Batch,
    flushes: usize,
    cancellation_token: CancellationToken,
}

impl<'a, E: BatchExecutor + ?Sized> BatchAccumulator<'a, E> {
    pub fn new(
        executor: &'a E,
        max_batch_size: usize,
        cancellation_token: CancellationToken,
    ) -> Self {
        let max_batch_size = max_batch_size.max(1);
        BatchAccumulator {
            executor,
            max_batch_size,
            batch: Batch::with_capacity(max_batch_size),
            flushes: 0,
            cancellation_token,
        }
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub async fn queue(&mut self, statement: QueuedStatement) -> Result<(), WriteError> {
        self.batch.push(statement);
        if self.batch.len() >= self.max_batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Sends the open batch. The batch is only replaced once the destination acknowledged it.
    pub async fn flush(&mut self) -> Result<(), WriteError> {
        if self.cancellation_token.is_cancelled() {
            return Err(WriteError::Cancelled);
        }

        let size = self.batch.len();
        let result = tokio::select! {
            biased;
            _ = self.cancellation_token.cancelled() => return Err(WriteError::Cancelled),
            result = self.executor.execute_batch(&self.batch) => result,
        };

        match result {
            Ok(()) => {
                self.flushes += 1;
                debug!("Flushed batch {} with {} statements", self.flushes, size);
                self.batch = Batch::with_capacity(self.max_batch_size);
                Ok(())
            }
            Err(err) => Err(self.classify_failure(err)),
        }
    }

    /// Flushes what is left, if anything, and returns how many batches were sent in total.
    pub async fn finish(mut self) -> Result<usize, WriteError> {
        if !self.batch.is_empty() {
            self.flush().await?;
        }
        Ok(self.flushes)
    }

    fn classify_failure(&self, err: ExecuteBatchError) -> WriteError {
        match classify(&err) {
            Classification::Backend { statement_index, detail } => {
                let failed = statement_index.and_then(|i| self.batch.statements().get(i));
                let table = failed
                    .map(|s| s.table.to_string())
                    .or_else(|| self.batch.single_table().map(|t| t.to_string()));
                let statement = failed.map(|s| s.sql.to_string());

                error!(
                    "Batch of {} statements rejected - table: {} - query: {} - {}",
                    self.batch.len(),
                    table.as_deref().unwrap_or("unknown"),
                    statement.as_deref().unwrap_or("unknown"),
                    detail
                );

                WriteError::StructuredBackend { table, statement, detail, source: err }
            }
            Classification::Transport => {
                error!("Batch of {} statements failed: {}", self.batch.len(), err);
                WriteError::Transport { source: err }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        database::postgres::sql_type_wrapper::PgValue, writer::error::BackendErrorDetail,
    };

    /// Records the size of every batch it receives; optionally fails the n-th call.
    #[derive(Default)]
    struct RecordingExecutor {
        sizes: Mutex<Vec<usize>>,
        fail_on_call: Option<(usize, fn() -> ExecuteBatchError)>,
    }

    #[async_trait]
    impl BatchExecutor for RecordingExecutor {
        async fn execute_batch(&self, batch: &Batch) -> Result<(), ExecuteBatchError> {
            let mut sizes = self.sizes.lock().unwrap();
            if let Some((call, make_error)) = self.fail_on_call {
                if sizes.len() == call {
                    sizes.push(batch.len());
                    return Err(make_error());
                }
            }
            sizes.push(batch.len());
            Ok(())
        }
    }

    struct PendingExecutor;

    #[async_trait]
    impl BatchExecutor for PendingExecutor {
        async fn execute_batch(&self, _batch: &Batch) -> Result<(), ExecuteBatchError> {
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn statement(table: &str, id: i64) -> QueuedStatement {
        QueuedStatement {
            table: Arc::from(table),
            sql: Arc::from(format!("insert into \"{}\" (\"id\") values ($1)", table)),
            params: vec![PgValue::Int(id)],
        }
    }

    fn rejected() -> ExecuteBatchError {
        ExecuteBatchError::Rejected {
            index: Some(1),
            detail: BackendErrorDetail {
                severity: "ERROR".to_string(),
                code: "23505".to_string(),
                message: "duplicate key value violates unique constraint \"b_pkey\"".to_string(),
                constraint_name: Some("b_pkey".to_string()),
                ..Default::default()
            },
        }
    }

    fn connection_reset() -> ExecuteBatchError {
        ExecuteBatchError::Transport("connection reset by peer".to_string())
    }

    #[tokio::test]
    async fn test_flushes_at_threshold_and_once_at_end() {
        let executor = RecordingExecutor::default();
        let mut accumulator = BatchAccumulator::new(&executor, 2, CancellationToken::new());

        for id in 0..5 {
            accumulator.queue(statement("a", id)).await.unwrap();
        }
        assert_eq!(accumulator.len(), 1);

        let flushes = accumulator.finish().await.unwrap();
        assert_eq!(flushes, 3);
        assert_eq!(*executor.sizes.lock().unwrap(), vec![2, 2, 1]);
    }

    #[tokio::test]
    async fn test_no_final_flush_when_batch_is_empty() {
        let executor = RecordingExecutor::default();
        let mut accumulator = BatchAccumulator::new(&executor, 2, CancellationToken::new());

        for id in 0..4 {
            accumulator.queue(statement("a", id)).await.unwrap();
        }
        assert!(accumulator.is_empty());

        assert_eq!(accumulator.finish().await.unwrap(), 2);
        assert_eq!(*executor.sizes.lock().unwrap(), vec![2, 2]);
    }

    #[tokio::test]
    async fn test_backend_rejection_carries_statement_context() {
        let executor =
            RecordingExecutor { fail_on_call: Some((0, rejected)), ..Default::default() };
        let mut accumulator = BatchAccumulator::new(&executor, 3, CancellationToken::new());

        accumulator.queue(statement("a", 1)).await.unwrap();
        accumulator.queue(statement("b", 2)).await.unwrap();
        let err = accumulator.queue(statement("a", 3)).await.unwrap_err();

        match err {
            WriteError::StructuredBackend { table, statement, detail, .. } => {
                assert_eq!(table.as_deref(), Some("b"));
                assert_eq!(statement.as_deref(), Some("insert into \"b\" (\"id\") values ($1)"));
                assert_eq!(detail.constraint_name.as_deref(), Some("b_pkey"));
            }
            other => panic!("unexpected error {other}"),
        }
        // failed batch is kept, not swapped
        assert_eq!(accumulator.len(), 3);
        assert_eq!(accumulator.flushes(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_stops_flushing() {
        let executor =
            RecordingExecutor { fail_on_call: Some((1, connection_reset)), ..Default::default() };
        let mut accumulator = BatchAccumulator::new(&executor, 1, CancellationToken::new());

        accumulator.queue(statement("a", 1)).await.unwrap();
        let err = accumulator.queue(statement("a", 2)).await.unwrap_err();

        assert!(matches!(err, WriteError::Transport { .. }));
        assert_eq!(*executor.sizes.lock().unwrap(), vec![1, 1]);
    }

    #[tokio::test]
    async fn test_cancelled_before_flush() {
        let executor = RecordingExecutor::default();
        let token = CancellationToken::new();
        token.cancel();
        let mut accumulator = BatchAccumulator::new(&executor, 1, token);

        let err = accumulator.queue(statement("a", 1)).await.unwrap_err();
        assert!(matches!(err, WriteError::Cancelled));
        assert!(executor.sizes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_while_flush_in_flight() {
        let token = CancellationToken::new();
        let mut accumulator = BatchAccumulator::new(&PendingExecutor, 1, token.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            token.cancel();
        });

        let err = accumulator.queue(statement("a", 1)).await.unwrap_err();
        assert!(matches!(err, WriteError::Cancelled));
        canceller.await.unwrap();
    }
}
