use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
};

use pgsink::{
    arrow::{
        datatypes::{DataType, Field, Schema, TimeUnit},
        error::ArrowError,
        json::ReaderBuilder,
    },
    manifest::yaml::{read_manifest, YAML_CONFIG_NAME},
    setup_postgres,
    writer::{ColumnDefinition, TableDefinition, TableLister, WriteMessage, Writer},
    CancellationToken,
};

use crate::console::{print_error_message, print_success_message, print_warn_message};

pub struct WriteDetails {
    pub table: String,
    pub input: PathBuf,
    pub salt: Option<String>,
    pub batch_size: Option<usize>,
}

fn arrow_type_for(column: &ColumnDefinition) -> Result<DataType, String> {
    let Some(udt_name) = column.data_type.as_deref() else {
        return Ok(DataType::Utf8);
    };

    match udt_name {
        "bool" => Ok(DataType::Boolean),
        "int2" | "int4" | "int8" => Ok(DataType::Int64),
        "float4" | "float8" => Ok(DataType::Float64),
        // parsed by the destination parameter type when bound
        "numeric" | "text" | "varchar" | "bpchar" | "name" | "uuid" | "json" | "jsonb" => {
            Ok(DataType::Utf8)
        }
        "timestamp" | "timestamptz" => {
            Ok(DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())))
        }
        "date" => Ok(DataType::Date32),
        "_text" | "_varchar" => {
            Ok(DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))))
        }
        other => Err(format!(
            "Column {} has type {} which can not be loaded from JSON",
            column.name, other
        )),
    }
}

/// Arrow schema JSON rows are decoded with, one nullable field per destination column.
pub fn arrow_schema_for(table: &TableDefinition) -> Result<Schema, String> {
    let fields = table
        .columns
        .iter()
        .map(|column| Ok(Field::new(&column.name, arrow_type_for(column)?, true)))
        .collect::<Result<Vec<_>, String>>()?;

    Ok(Schema::new(fields))
}

/// Decodes newline-delimited JSON into messages tagged for `table`.
pub fn read_json_lines<R: BufRead>(
    reader: R,
    table: &TableDefinition,
    batch_size: usize,
) -> Result<Vec<WriteMessage>, Box<dyn std::error::Error>> {
    let schema = Arc::new(arrow_schema_for(table)?);

    let decoder = ReaderBuilder::new(schema)
        .with_batch_size(batch_size)
        .with_coerce_primitive(true)
        .build(reader)?;

    let messages = decoder
        .map(|record| record.and_then(|record| WriteMessage::for_table(&table.name, record)))
        .collect::<Result<Vec<_>, ArrowError>>()?;

    Ok(messages)
}

pub async fn handle_write_command(
    project_path: PathBuf,
    details: WriteDetails,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = read_manifest(&project_path.join(YAML_CONFIG_NAME)).map_err(|e| {
        print_error_message(&format!(
            "Could not read the pgsink.yaml please make sure you are running the command with \
             pgsink.yaml in root: trace: {}",
            e
        ));
        e
    })?;

    let mut settings = manifest.writer_settings();
    if let Some(salt) = details.salt {
        settings.identity_salt = salt;
    }
    if let Some(batch_size) = details.batch_size {
        if batch_size == 0 {
            let message = "--batch-size must be greater than 0".to_string();
            print_error_message(&message);
            return Err(message.into());
        }
        settings.batch_size = batch_size;
    }

    let client = setup_postgres(&manifest).await.map_err(|e| {
        print_error_message(&format!(
            "Could not connect to Postgres, make sure your connection string is mapping in the \
             .env correctly: trace: {}",
            e
        ));
        e
    })?;

    let tables = client.list_tables().await.map_err(|e| {
        print_error_message(&format!("Could not list tables: trace: {}", e));
        e
    })?;

    let Some(table) = tables.iter().find(|t| t.name == details.table).cloned() else {
        let message = format!("Table {} does not exist in the destination", details.table);
        print_error_message(&message);
        return Err(message.into());
    };

    let file = File::open(&details.input).map_err(|e| {
        print_error_message(&format!("Could not open {}: trace: {}", details.input.display(), e));
        e
    })?;
    let messages =
        read_json_lines(BufReader::new(file), &table, settings.batch_size).map_err(|e| {
            print_error_message(&format!(
                "Could not decode {}: trace: {}",
                details.input.display(),
                e
            ));
            e
        })?;

    let cancellation_token = CancellationToken::new();
    let ctrl_c_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warn_message("Cancelling write...");
            ctrl_c_token.cancel();
        }
    });

    let mut writer = Writer::with_tables(client, settings, tables);
    let summary = writer.write(&messages, &cancellation_token).await.map_err(|e| {
        print_error_message(&format!("Write to {} failed: {}", table.name, e));
        e
    })?;

    print_success_message(&format!(
        "Wrote {} rows to {} in {} batches",
        summary.rows, table.name, summary.batches
    ));

    Ok(())
}
