use std::path::PathBuf;

use pgsink::{
    manifest::yaml::{read_manifest, YAML_CONFIG_NAME},
    setup_postgres,
    writer::{ColumnRole, TableLister},
};

use crate::console::{print_error_message, print_success_message, print_warn_message};

pub async fn handle_tables_command(
    project_path: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = read_manifest(&project_path.join(YAML_CONFIG_NAME)).map_err(|e| {
        print_error_message(&format!(
            "Could not read the pgsink.yaml please make sure you are running the command with \
             pgsink.yaml in root: trace: {}",
            e
        ));
        e
    })?;

    let client = setup_postgres(&manifest).await.map_err(|e| {
        print_error_message(&format!(
            "Could not connect to Postgres, make sure your connection string is mapping in the \
             .env correctly: trace: {}",
            e
        ));
        e
    })?;

    let mut tables = client.list_tables().await.map_err(|e| {
        print_error_message(&format!("Could not list tables: trace: {}", e));
        e
    })?;

    if tables.is_empty() {
        print_warn_message("No tables found in the destination schema.");
        return Ok(());
    }

    tables.sort_by(|a, b| a.name.cmp(&b.name));
    for table in &tables {
        let mode = match table.conflict_target() {
            Some(constraint) => format!("upsert on {}", constraint),
            None => "insert".to_string(),
        };
        print_success_message(&format!("{} ({})", table.name, mode));

        for column in &table.columns {
            let role = match column.role {
                ColumnRole::Regular => "",
                ColumnRole::RowIdentity => " [row identity]",
                ColumnRole::ParentRowIdentity => " [parent row identity]",
            };
            println!(
                "  - {}: {}{}",
                column.name,
                column.data_type.as_deref().unwrap_or("unknown"),
                role
            );
        }
    }

    Ok(())
}
