use std::collections::HashMap;

use async_trait::async_trait;

/// Reserved column carrying the synthetic identity of a row.
pub const ROW_ID_COLUMN: &str = "_row_id";

/// Reserved column carrying the synthetic identity of the parent row.
pub const PARENT_ROW_ID_COLUMN: &str = "_parent_row_id";

/// How the write path treats a column's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Regular,
    /// Identity of the row itself, rehashed with the run salt before it is written.
    RowIdentity,
    /// Identity of the parent row, rehashed with the run salt before it is written.
    ParentRowIdentity,
}

impl ColumnRole {
    pub fn from_column_name(name: &str) -> Self {
        match name {
            ROW_ID_COLUMN => ColumnRole::RowIdentity,
            PARENT_ROW_ID_COLUMN => ColumnRole::ParentRowIdentity,
            _ => ColumnRole::Regular,
        }
    }

    pub fn is_identity(&self) -> bool {
        !matches!(self, ColumnRole::Regular)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub position: usize,
    /// Destination type name as reported by the catalog (`udt_name`), e.g. `int4`, `uuid`, `jsonb`.
    pub data_type: Option<String>,
    pub role: ColumnRole,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, position: usize, data_type: Option<&str>) -> Self {
        let name = name.into();
        let role = ColumnRole::from_column_name(&name);
        ColumnDefinition { name, position, data_type: data_type.map(|t| t.to_string()), role }
    }

    pub fn has_data_type(&self, candidates: &[&str]) -> bool {
        self.data_type.as_deref().is_some_and(|t| candidates.contains(&t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimaryKeyConstraint {
    pub name: String,
    /// Positions into the owning table's column list.
    pub column_positions: Vec<usize>,
}

/// A destination table as resolved for one sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Option<PrimaryKeyConstraint>,
}

impl TableDefinition {
    /// Builds a table from ordered `(name, data_type)` pairs, assigning positions and roles.
    pub fn new(name: impl Into<String>, columns: &[(&str, Option<&str>)]) -> Self {
        let columns = columns
            .iter()
            .enumerate()
            .map(|(position, (column, data_type))| {
                ColumnDefinition::new(*column, position, *data_type)
            })
            .collect();

        TableDefinition { name: name.into(), columns, primary_key: None }
    }

    /// Declares the primary key by constraint name and column names. Unknown names are ignored.
    pub fn with_primary_key(
        mut self,
        constraint_name: impl Into<String>,
        columns: &[&str],
    ) -> Self {
        let column_positions =
            columns.iter().filter_map(|name| self.column_position(name)).collect::<Vec<_>>();
        self.primary_key =
            Some(PrimaryKeyConstraint { name: constraint_name.into(), column_positions });
        self
    }

    pub fn column_position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Constraint name to resolve conflicts on, only when at least one primary key column exists.
    pub fn conflict_target(&self) -> Option<&str> {
        self.primary_key
            .as_ref()
            .filter(|pk| !pk.column_positions.is_empty())
            .map(|pk| pk.name.as_str())
    }

    pub fn identity_positions(&self) -> Vec<usize> {
        self.columns.iter().filter(|c| c.role.is_identity()).map(|c| c.position).collect()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ListTablesError {
    #[error("PgError {0}")]
    PgError(#[from] tokio_postgres::Error),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] bb8::RunError<tokio_postgres::Error>),
}

/// Lists the tables that already exist in the destination.
#[async_trait]
pub trait TableLister: Send + Sync {
    async fn list_tables(&self) -> Result<Vec<TableDefinition>, ListTablesError>;
}

/// Run-scoped cache of resolved destination tables keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<String, TableDefinition>,
}

impl TableRegistry {
    pub fn new(tables: Vec<TableDefinition>) -> Self {
        TableRegistry { tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect() }
    }

    pub fn get(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }
}
