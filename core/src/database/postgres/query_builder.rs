//! SQL generation for the insert and upsert statements of a table.
//!
//! Every identifier is sanitized before it is placed into a statement, and the column list and the
//! placeholder list are produced by the same pass over the columns so their order always agrees
//! with the order rows are bound in.

use crate::writer::TableDefinition;

/// Quotes an identifier: wraps it in double quotes, doubles embedded quotes and drops NUL bytes.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    let mut quoted = String::with_capacity(name.len() + 2);
    quoted.push('"');
    for c in name.chars() {
        match c {
            '\0' => {}
            '"' => quoted.push_str("\"\""),
            _ => quoted.push(c),
        }
    }
    quoted.push('"');
    quoted
}

/// Column and placeholder lists of an insert, built together.
struct ColumnBindings {
    columns: String,
    placeholders: String,
}

impl ColumnBindings {
    fn new<'a>(names: impl Iterator<Item = &'a str>) -> Self {
        let mut bindings = ColumnBindings { columns: String::new(), placeholders: String::new() };
        for (i, name) in names.enumerate() {
            if i > 0 {
                bindings.columns.push(',');
                bindings.placeholders.push(',');
            }
            bindings.columns.push_str(&quote_identifier(name));
            bindings.placeholders.push_str(&format!("${}", i + 1));
        }
        bindings
    }
}

/// Builds `insert into "<table>" ("c1",...) values ($1,...)`.
pub fn build_insert(table: &TableDefinition) -> String {
    let bindings = ColumnBindings::new(table.columns.iter().map(|c| c.name.as_str()));

    format!(
        "insert into {} ({}) values ({})",
        quote_identifier(&table.name),
        bindings.columns,
        bindings.placeholders
    )
}

/// Builds the insert followed by an update of every column on primary key conflict.
///
/// Primary key columns are assigned too, which leaves them unchanged. Returns `None` when the
/// table has no primary key columns to resolve conflicts on.
pub fn build_upsert(table: &TableDefinition) -> Option<String> {
    let constraint_name = table.conflict_target()?;

    let set_clause = table
        .columns
        .iter()
        .map(|c| {
            let column = quote_identifier(&c.name);
            format!("{}=excluded.{}", column, column)
        })
        .collect::<Vec<_>>()
        .join(",");

    Some(format!(
        "{} on conflict on constraint {} do update set {}",
        build_insert(table),
        quote_identifier(constraint_name),
        set_clause
    ))
}

/// The statement rows of `table` are written with: upsert when it has a primary key, insert
/// otherwise.
pub fn build_write_statement(table: &TableDefinition) -> String {
    build_upsert(table).unwrap_or_else(|| build_insert(table))
}
