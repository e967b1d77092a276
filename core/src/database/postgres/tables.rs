use async_trait::async_trait;
use tracing::debug;

use crate::{
    database::postgres::client::{PostgresClient, PostgresError},
    writer::{ListTablesError, TableDefinition, TableLister},
};

const LIST_TABLES_SQL: &str = r#"
select c.table_name::text,
       c.column_name::text,
       c.udt_name::text,
       tc.constraint_name::text,
       kcu.column_name is not null as is_primary_key
from information_schema.columns c
left join information_schema.table_constraints tc
       on tc.table_schema = c.table_schema
      and tc.table_name = c.table_name
      and tc.constraint_type = 'PRIMARY KEY'
left join information_schema.key_column_usage kcu
       on kcu.constraint_schema = tc.constraint_schema
      and kcu.constraint_name = tc.constraint_name
      and kcu.table_name = c.table_name
      and kcu.column_name = c.column_name
where c.table_schema::text = coalesce($1::text, current_schema()::text)
order by c.table_name, c.ordinal_position
"#;

/// One row of the catalog query, in table then column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogColumn {
    pub table_name: String,
    pub column_name: String,
    pub udt_name: Option<String>,
    pub primary_key_constraint: Option<String>,
    pub is_primary_key: bool,
}

struct CatalogTable<'a> {
    name: &'a str,
    columns: Vec<(&'a str, Option<&'a str>)>,
    primary_key_constraint: Option<&'a str>,
    primary_key_columns: Vec<&'a str>,
}

impl CatalogTable<'_> {
    fn into_definition(self) -> TableDefinition {
        let table = TableDefinition::new(self.name, &self.columns);
        match self.primary_key_constraint {
            Some(constraint) if !self.primary_key_columns.is_empty() => {
                table.with_primary_key(constraint, &self.primary_key_columns)
            }
            _ => table,
        }
    }
}

/// Folds catalog rows into table definitions. Rows of one table must be contiguous.
pub fn tables_from_catalog(columns: &[CatalogColumn]) -> Vec<TableDefinition> {
    let mut tables: Vec<CatalogTable> = Vec::new();

    for column in columns {
        if tables.last().map_or(true, |table| table.name != column.table_name) {
            tables.push(CatalogTable {
                name: &column.table_name,
                columns: Vec::new(),
                primary_key_constraint: None,
                primary_key_columns: Vec::new(),
            });
        }
        let Some(table) = tables.last_mut() else { continue };

        table.columns.push((&column.column_name, column.udt_name.as_deref()));
        if table.primary_key_constraint.is_none() {
            table.primary_key_constraint = column.primary_key_constraint.as_deref();
        }
        if column.is_primary_key {
            table.primary_key_columns.push(&column.column_name);
        }
    }

    tables.into_iter().map(CatalogTable::into_definition).collect()
}

impl From<PostgresError> for ListTablesError {
    fn from(err: PostgresError) -> Self {
        match err {
            PostgresError::PgError(e) => ListTablesError::PgError(e),
            PostgresError::ConnectionPoolError(e) => ListTablesError::ConnectionPoolError(e),
        }
    }
}

#[async_trait]
impl TableLister for PostgresClient {
    async fn list_tables(&self) -> Result<Vec<TableDefinition>, ListTablesError> {
        let rows = self.query(LIST_TABLES_SQL, &[&self.schema()]).await?;

        let columns = rows
            .iter()
            .map(|row| -> Result<CatalogColumn, tokio_postgres::Error> {
                Ok(CatalogColumn {
                    table_name: row.try_get(0)?,
                    column_name: row.try_get(1)?,
                    udt_name: row.try_get(2)?,
                    primary_key_constraint: row.try_get(3)?,
                    is_primary_key: row.try_get(4)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let tables = tables_from_catalog(&columns);
        debug!("Listed {} tables from {} catalog columns", tables.len(), columns.len());
        Ok(tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(table: &str, name: &str, udt: &str, pk: Option<&str>, is_pk: bool) -> CatalogColumn {
        CatalogColumn {
            table_name: table.to_string(),
            column_name: name.to_string(),
            udt_name: Some(udt.to_string()),
            primary_key_constraint: pk.map(str::to_string),
            is_primary_key: is_pk,
        }
    }

    #[test]
    fn test_tables_from_catalog() {
        let catalog = vec![
            column("test_data", "id", "int4", None, false),
            column("test_data", "name", "text", None, false),
            column("test_data", "_row_id", "uuid", None, false),
            column("users", "tenant", "text", Some("users_pkey"), true),
            column("users", "email", "text", Some("users_pkey"), false),
            column("users", "id", "int8", Some("users_pkey"), true),
        ];

        let tables = tables_from_catalog(&catalog);
        assert_eq!(tables.len(), 2);

        let test_data = &tables[0];
        assert_eq!(test_data.name, "test_data");
        assert_eq!(
            test_data.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["id", "name", "_row_id"]
        );
        assert_eq!(test_data.primary_key, None);
        assert_eq!(test_data.identity_positions(), vec![2]);

        let users = &tables[1];
        assert_eq!(users.conflict_target(), Some("users_pkey"));
        assert_eq!(
            users.primary_key.as_ref().map(|pk| pk.column_positions.clone()),
            Some(vec![0, 2])
        );
        assert!(users.columns[2].has_data_type(&["int8"]));
    }

    #[test]
    fn test_empty_catalog() {
        assert!(tables_from_catalog(&[]).is_empty());
    }
}
