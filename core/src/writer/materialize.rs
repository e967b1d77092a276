//! Turns columnar record batches into row tuples aligned with a destination table.

use arrow::{
    array::{Array, ArrayRef, AsArray},
    datatypes::{
        DataType, Date32Type, Date64Type, Decimal128Type, Float16Type, Float32Type, Float64Type,
        Int16Type, Int32Type, Int64Type, Int8Type, TimeUnit, TimestampMicrosecondType,
        TimestampMillisecondType, TimestampNanosecondType, TimestampSecondType, UInt16Type,
        UInt32Type, UInt64Type, UInt8Type,
    },
    record_batch::RecordBatch,
    temporal_conversions::{date32_to_datetime, date64_to_datetime},
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    database::postgres::sql_type_wrapper::PgValue,
    writer::table::{ColumnDefinition, TableDefinition},
};

/// Schema metadata key naming the destination table of a record batch.
pub const TABLE_NAME_METADATA_KEY: &str = "sink:table_name";

/// One value per table column, in table column order.
pub type RowTuple = Vec<PgValue>;

#[derive(thiserror::Error, Debug)]
pub enum MaterializeError {
    #[error("record has no table name in its schema metadata (key `{0}`)")]
    MissingTableName(&'static str),

    #[error("record is tagged for table {found} but was materialized for table {expected}")]
    TableNameMismatch { expected: String, found: String },

    #[error("column {column} of table {table} is missing from the record")]
    MissingColumn { table: String, column: String },

    #[error("record column {column} does not exist in destination table {table}")]
    UnknownColumn { table: String, column: String },

    #[error("column {column} of table {table} has unsupported type {data_type}")]
    UnsupportedType { table: String, column: String, data_type: String },

    #[error("invalid value in column {column} of table {table} at row {row}: {reason}")]
    InvalidValue { table: String, column: String, row: usize, reason: String },
}

pub fn record_table_name(record: &RecordBatch) -> Option<&str> {
    record.schema_ref().metadata().get(TABLE_NAME_METADATA_KEY).map(String::as_str)
}

/// Fails when the record carries a field the destination table does not have, or lacks one of
/// the table's columns.
pub fn check_record_columns(
    record: &RecordBatch,
    table: &TableDefinition,
) -> Result<(), MaterializeError> {
    let schema = record.schema_ref();
    for field in schema.fields() {
        if table.column(field.name()).is_none() {
            return Err(MaterializeError::UnknownColumn {
                table: table.name.clone(),
                column: field.name().clone(),
            });
        }
    }

    if let Some(column) = table.columns.iter().find(|c| schema.index_of(&c.name).is_err()) {
        return Err(MaterializeError::MissingColumn {
            table: table.name.clone(),
            column: column.name.clone(),
        });
    }

    Ok(())
}

/// Extracts every row of `record` in the column order of `table`.
pub fn materialize(
    record: &RecordBatch,
    table: &TableDefinition,
) -> Result<Vec<RowTuple>, MaterializeError> {
    match record_table_name(record) {
        None => return Err(MaterializeError::MissingTableName(TABLE_NAME_METADATA_KEY)),
        Some(found) if found != table.name => {
            return Err(MaterializeError::TableNameMismatch {
                expected: table.name.clone(),
                found: found.to_string(),
            })
        }
        Some(_) => {}
    }

    let schema = record.schema_ref();
    let columns = table
        .columns
        .iter()
        .map(|column| {
            schema.index_of(&column.name).map(|index| (column, record.column(index))).map_err(|_| {
                MaterializeError::MissingColumn {
                    table: table.name.clone(),
                    column: column.name.clone(),
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    (0..record.num_rows())
        .map(|row| {
            columns
                .iter()
                .map(|(column, array)| value_at(array, row, &table.name, column))
                .collect::<Result<RowTuple, _>>()
        })
        .collect()
}

fn value_at(
    array: &ArrayRef,
    row: usize,
    table: &str,
    column: &ColumnDefinition,
) -> Result<PgValue, MaterializeError> {
    if array.is_null(row) {
        return Ok(PgValue::Null);
    }

    let invalid = |reason: String| MaterializeError::InvalidValue {
        table: table.to_string(),
        column: column.name.clone(),
        row,
        reason,
    };

    let value = match array.data_type() {
        DataType::Boolean => PgValue::Bool(array.as_boolean().value(row)),
        DataType::Int8 => PgValue::Int(array.as_primitive::<Int8Type>().value(row).into()),
        DataType::Int16 => PgValue::Int(array.as_primitive::<Int16Type>().value(row).into()),
        DataType::Int32 => PgValue::Int(array.as_primitive::<Int32Type>().value(row).into()),
        DataType::Int64 => PgValue::Int(array.as_primitive::<Int64Type>().value(row)),
        DataType::UInt8 => PgValue::Int(array.as_primitive::<UInt8Type>().value(row).into()),
        DataType::UInt16 => PgValue::Int(array.as_primitive::<UInt16Type>().value(row).into()),
        DataType::UInt32 => PgValue::Int(array.as_primitive::<UInt32Type>().value(row).into()),
        DataType::UInt64 => PgValue::UInt(array.as_primitive::<UInt64Type>().value(row)),
        DataType::Float16 => {
            PgValue::Float(array.as_primitive::<Float16Type>().value(row).to_f64())
        }
        DataType::Float32 => PgValue::Float(array.as_primitive::<Float32Type>().value(row).into()),
        DataType::Float64 => PgValue::Float(array.as_primitive::<Float64Type>().value(row)),
        DataType::Decimal128(_, scale) => {
            let raw = array.as_primitive::<Decimal128Type>().value(row);
            let scale = u32::try_from(*scale)
                .map_err(|_| invalid(format!("negative decimal scale {}", scale)))?;
            PgValue::Numeric(
                Decimal::try_from_i128_with_scale(raw, scale).map_err(|e| invalid(e.to_string()))?,
            )
        }
        DataType::Utf8 => text_value(array.as_string::<i32>().value(row), column, &invalid)?,
        DataType::LargeUtf8 => text_value(array.as_string::<i64>().value(row), column, &invalid)?,
        DataType::Binary => PgValue::Bytes(array.as_binary::<i32>().value(row).to_vec()),
        DataType::LargeBinary => PgValue::Bytes(array.as_binary::<i64>().value(row).to_vec()),
        DataType::FixedSizeBinary(16) => PgValue::Uuid(
            Uuid::from_slice(array.as_fixed_size_binary().value(row))
                .map_err(|e| invalid(e.to_string()))?,
        ),
        DataType::FixedSizeBinary(_) => {
            PgValue::Bytes(array.as_fixed_size_binary().value(row).to_vec())
        }
        DataType::Timestamp(unit, _) => {
            let timestamp = timestamp_at(array, row, unit)
                .ok_or_else(|| invalid("timestamp out of range".to_string()))?;
            PgValue::Timestamp(timestamp)
        }
        DataType::Date32 => PgValue::Date(
            date32_to_datetime(array.as_primitive::<Date32Type>().value(row))
                .ok_or_else(|| invalid("date out of range".to_string()))?
                .date(),
        ),
        DataType::Date64 => PgValue::Date(
            date64_to_datetime(array.as_primitive::<Date64Type>().value(row))
                .ok_or_else(|| invalid("date out of range".to_string()))?
                .date(),
        ),
        DataType::List(field) if field.data_type() == &DataType::Utf8 => {
            let items = array.as_list::<i32>().value(row);
            PgValue::TextArray(
                items.as_string::<i32>().iter().map(|item| item.map(str::to_string)).collect(),
            )
        }
        other => {
            return Err(MaterializeError::UnsupportedType {
                table: table.to_string(),
                column: column.name.clone(),
                data_type: other.to_string(),
            })
        }
    };

    Ok(value)
}

/// Text is kept as text unless the destination column needs it parsed.
fn text_value(
    value: &str,
    column: &ColumnDefinition,
    invalid: &dyn Fn(String) -> MaterializeError,
) -> Result<PgValue, MaterializeError> {
    if column.has_data_type(&["uuid"]) {
        return Uuid::parse_str(value).map(PgValue::Uuid).map_err(|e| invalid(e.to_string()));
    }
    if column.has_data_type(&["json", "jsonb"]) {
        return serde_json::from_str(value).map(PgValue::Json).map_err(|e| invalid(e.to_string()));
    }
    Ok(PgValue::Text(value.to_string()))
}

fn timestamp_at(array: &ArrayRef, row: usize, unit: &TimeUnit) -> Option<DateTime<Utc>> {
    match unit {
        TimeUnit::Second => {
            DateTime::from_timestamp(array.as_primitive::<TimestampSecondType>().value(row), 0)
        }
        TimeUnit::Millisecond => DateTime::from_timestamp_millis(
            array.as_primitive::<TimestampMillisecondType>().value(row),
        ),
        TimeUnit::Microsecond => DateTime::from_timestamp_micros(
            array.as_primitive::<TimestampMicrosecondType>().value(row),
        ),
        TimeUnit::Nanosecond => {
            let nanos = array.as_primitive::<TimestampNanosecondType>().value(row);
            DateTime::from_timestamp(
                nanos.div_euclid(1_000_000_000),
                nanos.rem_euclid(1_000_000_000) as u32,
            )
        }
    }
}
