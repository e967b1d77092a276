use anyhow::Result;
use pgsink::{writer::Writer, writer::WriterSettings, PostgresClient};
use tracing::{info, warn};

use crate::{
    docker::{
        start_postgres_container, stop_postgres_container, wait_for_postgres, POSTGRES_DB,
        POSTGRES_PASSWORD, POSTGRES_USER,
    },
    tests::test_runner::SkipTest,
};

/// Per-test infrastructure: a fresh Postgres container and a client connected to it.
pub struct TestContext {
    pub container_name: Option<String>,
    pub port: u16,
    pub database_url: String,
    pub client: PostgresClient,
}

impl TestContext {
    pub async fn new() -> Result<Self> {
        let (container_name, port) = start_postgres_container()
            .await
            .map_err(|e| SkipTest(format!("Docker not available: {}", e)))?;

        if let Err(e) = wait_for_postgres(port).await {
            let _ = stop_postgres_container(&container_name).await;
            return Err(e);
        }

        let database_url = format!(
            "postgres://{}:{}@localhost:{}/{}",
            POSTGRES_USER, POSTGRES_PASSWORD, port, POSTGRES_DB
        );
        let client = PostgresClient::new(&database_url, true, None).await?;

        info!("Postgres ready in container {} on port {}", container_name, port);
        Ok(TestContext { container_name: Some(container_name), port, database_url, client })
    }

    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    /// A writer with its own connection pool that resolves tables lazily, like a fresh sync run.
    pub async fn writer(&self, salt: &str, batch_size: usize) -> Result<Writer<PostgresClient>> {
        let client = PostgresClient::new(&self.database_url, true, None).await?;
        Ok(Writer::new(client, WriterSettings { batch_size, identity_salt: salt.to_string() }))
    }

    pub async fn stop_database(&mut self) -> Result<()> {
        if let Some(name) = self.container_name.take() {
            stop_postgres_container(&name).await?;
        }
        Ok(())
    }

    pub async fn cleanup(&mut self) -> Result<()> {
        info!("Cleaning up test context...");
        if let Err(e) = self.stop_database().await {
            warn!("Error stopping postgres container: {}", e);
        }
        Ok(())
    }
}
