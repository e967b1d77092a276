use std::sync::Arc;

use anyhow::Result;
use pgsink::{
    arrow::{
        array::{FixedSizeBinaryArray, Int32Array, StringArray},
        datatypes::{DataType, Field, Schema},
        record_batch::RecordBatch,
    },
    writer::WriteMessage,
};

/// One input row: id, name, age and the upstream identity of the row.
pub struct Person<'a> {
    pub id: i32,
    pub name: &'a str,
    pub age: i32,
    pub row_id: [u8; 16],
}

/// Builds a message for `table` with columns `id`, `name`, `age`, `_row_id`.
pub fn people_message(table: &str, people: &[Person]) -> Result<WriteMessage> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("age", DataType::Int32, false),
        Field::new("_row_id", DataType::FixedSizeBinary(16), false),
    ]));

    let record = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(people.iter().map(|p| p.id).collect::<Vec<_>>())),
            Arc::new(StringArray::from(people.iter().map(|p| p.name).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(people.iter().map(|p| p.age).collect::<Vec<_>>())),
            Arc::new(FixedSizeBinaryArray::try_from_iter(people.iter().map(|p| p.row_id))?),
        ],
    )?;

    Ok(WriteMessage::for_table(table, record)?)
}

/// Builds a message for `table` with columns `id`, `name`, `_row_id`.
pub fn users_message(table: &str, users: &[(i32, &str, [u8; 16])]) -> Result<WriteMessage> {
    let schema = Arc::new(Schema::new(vec![
        Field::new("id", DataType::Int32, false),
        Field::new("name", DataType::Utf8, false),
        Field::new("_row_id", DataType::FixedSizeBinary(16), false),
    ]));

    let record = RecordBatch::try_new(
        schema,
        vec![
            Arc::new(Int32Array::from(users.iter().map(|u| u.0).collect::<Vec<_>>())),
            Arc::new(StringArray::from(users.iter().map(|u| u.1).collect::<Vec<_>>())),
            Arc::new(FixedSizeBinaryArray::try_from_iter(users.iter().map(|u| u.2))?),
        ],
    )?;

    Ok(WriteMessage::for_table(table, record)?)
}
