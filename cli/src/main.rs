mod cli_interface;
mod commands;
mod console;

use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use pgsink::{level_from_verbosity, setup_logger};

use crate::{
    cli_interface::{Commands, CLI},
    commands::{
        tables::handle_tables_command,
        write::{handle_write_command, WriteDetails},
    },
    console::print_error_message,
};

fn resolve_path(override_path: &Option<String>) -> Result<PathBuf, String> {
    match override_path {
        Some(path) => {
            let path = PathBuf::from_str(path).map_err(|_| "Invalid path provided.".to_string())?;
            Ok(path)
        }
        None => {
            Ok(std::env::current_dir()
                .map_err(|_| "Failed to get current directory.".to_string())?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CLI::parse();
    setup_logger(level_from_verbosity(cli.verbose));

    match cli.command {
        Commands::Tables { path } => {
            let resolved_path = resolve_path(&path).map_err(|e| {
                print_error_message(&e);
                e
            })?;
            handle_tables_command(resolved_path).await
        }
        Commands::Write { table, input, salt, batch_size, path } => {
            let resolved_path = resolve_path(&path).map_err(|e| {
                print_error_message(&e);
                e
            })?;
            handle_write_command(
                resolved_path,
                WriteDetails { table, input: PathBuf::from(input), salt, batch_size },
            )
            .await
        }
    }
}
