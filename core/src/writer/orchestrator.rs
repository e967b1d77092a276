use std::{collections::HashMap, sync::Arc};

use arrow::{error::ArrowError, record_batch::RecordBatch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    database::postgres::query_builder::build_write_statement,
    writer::{
        batch::{BatchAccumulator, BatchExecutor, QueuedStatement},
        error::WriteError,
        identity::rehash_row_identities,
        materialize::{
            check_record_columns, materialize, record_table_name, TABLE_NAME_METADATA_KEY,
        },
        table::{TableDefinition, TableLister, TableRegistry},
    },
};

/// One schema-tagged record batch bound for a destination table.
#[derive(Debug, Clone)]
pub struct WriteMessage {
    pub record: RecordBatch,
}

impl WriteMessage {
    pub fn new(record: RecordBatch) -> Self {
        WriteMessage { record }
    }

    /// Tags `record` with the destination table name.
    pub fn for_table(table_name: &str, record: RecordBatch) -> Result<Self, ArrowError> {
        let mut metadata = record.schema_ref().metadata().clone();
        metadata.insert(TABLE_NAME_METADATA_KEY.to_string(), table_name.to_string());
        let schema = record.schema_ref().as_ref().clone().with_metadata(metadata);

        Ok(WriteMessage { record: record.with_schema(Arc::new(schema))? })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterSettings {
    /// Statements per batch before a flush is forced.
    pub batch_size: usize,
    /// Mixed into every identity column of the run.
    pub identity_salt: String,
}

impl Default for WriterSettings {
    fn default() -> Self {
        WriterSettings { batch_size: 10_000, identity_salt: String::new() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub rows: usize,
    pub batches: usize,
}

/// Drives incoming records into a destination for the lifetime of one sync run.
pub struct Writer<D> {
    destination: D,
    settings: WriterSettings,
    registry: Option<TableRegistry>,
}

impl<D: BatchExecutor + TableLister> Writer<D> {
    /// The destination tables are looked up the first time a write needs them.
    pub fn new(destination: D, settings: WriterSettings) -> Self {
        Writer { destination, settings, registry: None }
    }

    /// Uses tables that are already resolved, for example right after a migration.
    pub fn with_tables(
        destination: D,
        settings: WriterSettings,
        tables: Vec<TableDefinition>,
    ) -> Self {
        Writer { destination, settings, registry: Some(TableRegistry::new(tables)) }
    }

    pub fn destination(&self) -> &D {
        &self.destination
    }

    pub fn settings(&self) -> &WriterSettings {
        &self.settings
    }

    pub fn registry(&self) -> Option<&TableRegistry> {
        self.registry.as_ref()
    }

    pub async fn write(
        &mut self,
        messages: &[WriteMessage],
        cancellation_token: &CancellationToken,
    ) -> Result<WriteSummary, WriteError> {
        let groups = group_by_table(messages)?;
        if groups.is_empty() {
            return Ok(WriteSummary::default());
        }

        let registry: &TableRegistry = match self.registry {
            Some(ref registry) => registry,
            None => {
                let tables = self.destination.list_tables().await?;
                info!("Resolved {} destination tables", tables.len());
                self.registry.insert(TableRegistry::new(tables))
            }
        };

        // every record is reconciled before the first statement is queued
        let resolved = groups
            .into_iter()
            .map(|(name, records)| {
                let table =
                    registry.get(name).ok_or_else(|| WriteError::UnknownTable(name.to_string()))?;
                for record in &records {
                    check_record_columns(record, table)?;
                }
                Ok((table, records))
            })
            .collect::<Result<Vec<_>, WriteError>>()?;

        let mut accumulator = BatchAccumulator::new(
            &self.destination,
            self.settings.batch_size,
            cancellation_token.clone(),
        );
        let mut rows = 0;

        for (table, records) in resolved {
            let sql: Arc<str> = Arc::from(build_write_statement(table));
            let table_name: Arc<str> = Arc::from(table.name.as_str());
            let identity_positions = table.identity_positions();
            debug!("{} - {}", table.name, sql);

            for record in records {
                for mut row in materialize(record, table)? {
                    rehash_row_identities(
                        &mut row,
                        &identity_positions,
                        &self.settings.identity_salt,
                    );
                    accumulator
                        .queue(QueuedStatement {
                            table: Arc::clone(&table_name),
                            sql: Arc::clone(&sql),
                            params: row,
                        })
                        .await?;
                    rows += 1;
                }
            }
        }

        let batches = accumulator.finish().await?;
        info!("Wrote {} rows in {} batches", rows, batches);

        Ok(WriteSummary { rows, batches })
    }
}

/// Groups records by destination table, tables ordered by first arrival.
fn group_by_table(messages: &[WriteMessage]) -> Result<Vec<(&str, Vec<&RecordBatch>)>, WriteError> {
    let mut groups: Vec<(&str, Vec<&RecordBatch>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for message in messages {
        let name = record_table_name(&message.record)
            .ok_or(WriteError::MissingTableMetadata(TABLE_NAME_METADATA_KEY))?;

        match index.get(name) {
            Some(&i) => groups[i].1.push(&message.record),
            None => {
                index.insert(name, groups.len());
                groups.push((name, vec![&message.record]));
            }
        }
    }

    Ok(groups)
}
