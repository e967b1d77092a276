use tracing::info;

use crate::{
    database::postgres::client::{connection_string, PostgresClient, PostgresConnectionError},
    manifest::core::Manifest,
};

#[derive(thiserror::Error, Debug)]
pub enum SetupPostgresError {
    #[error("{0}")]
    PostgresConnection(#[from] PostgresConnectionError),
}

/// Connects to the destination described by the manifest, `DATABASE_URL` filling in a missing
/// connection string.
pub async fn setup_postgres(manifest: &Manifest) -> Result<PostgresClient, SetupPostgresError> {
    info!("Setting up postgres for {}", manifest.name);

    let connection_str = match &manifest.postgres.connection_string {
        Some(connection_str) => connection_str.clone(),
        None => connection_string().map_err(PostgresConnectionError::from)?,
    };

    let client = PostgresClient::new(
        &connection_str,
        manifest.postgres.disable_ssl(),
        manifest.postgres.schema.clone(),
    )
    .await?;

    info!("Connected to postgres for {}", manifest.name);
    Ok(client)
}
