use std::{collections::HashMap, env, time::Duration};

use async_trait::async_trait;
use bb8::{Pool, RunError};
use bb8_postgres::PostgresConnectionManager;
use dotenv::dotenv;
use futures::future::try_join_all;
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio::{task, time::timeout};
pub use tokio_postgres::types::{ToSql, Type as PgType};
use tokio_postgres::{config::SslMode, Config, Error as PgError, Row, Statement, ToStatement};
use tracing::{debug, error};

use crate::writer::{Batch, BatchExecutor, ExecuteBatchError};

pub fn connection_string() -> Result<String, env::VarError> {
    dotenv().ok();
    let connection = env::var("DATABASE_URL")?;
    Ok(connection)
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresConnectionError {
    #[error("The database connection string is wrong please check your environment: {0}")]
    DatabaseConnectionConfigWrong(#[from] env::VarError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] tokio_postgres::Error),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,

    #[error("Could not parse connection string make sure it is correctly formatted")]
    CouldNotParseConnectionString,

    #[error("Could not create tls connector")]
    CouldNotCreateTlsConnector,
}

#[derive(thiserror::Error, Debug)]
pub enum PostgresError {
    #[error("PgError {0}")]
    PgError(#[from] PgError),

    #[error("Connection pool error: {0}")]
    ConnectionPoolError(#[from] RunError<tokio_postgres::Error>),
}

pub struct PostgresClient {
    pool: Pool<PostgresConnectionManager<MakeTlsConnector>>,
    schema: Option<String>,
}

impl PostgresClient {
    /// Connects and probes the server once before the pool is built. TLS is dropped when the server
    /// refuses it, unless the connection string insists with `sslmode=require`.
    pub async fn new(
        connection_str: &str,
        disable_ssl: bool,
        schema: Option<String>,
    ) -> Result<Self, PostgresConnectionError> {
        async fn _new(
            connection_str: &str,
            disable_ssl: bool,
            schema: Option<String>,
        ) -> Result<PostgresClient, PostgresConnectionError> {
            let mut config: Config = connection_str
                .parse()
                .map_err(|_| PostgresConnectionError::CouldNotParseConnectionString)?;

            if disable_ssl {
                config.ssl_mode(SslMode::Disable);
            }

            let connector = TlsConnector::builder()
                .build()
                .map_err(|_| PostgresConnectionError::CouldNotCreateTlsConnector)?;
            let tls_connector = MakeTlsConnector::new(connector);

            let (client, connection) =
                match timeout(Duration::from_millis(5000), config.connect(tls_connector.clone()))
                    .await
                {
                    Ok(Ok((client, connection))) => (client, connection),
                    Ok(Err(e)) => {
                        if !disable_ssl
                            && config.get_ssl_mode() != SslMode::Disable
                            && !connection_str.contains("sslmode=require")
                        {
                            return Box::pin(_new(connection_str, true, schema)).await;
                        }
                        error!("Error connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                    Err(e) => {
                        error!("Timeout connecting to database: {}", e);
                        return Err(PostgresConnectionError::CanNotConnectToDatabase);
                    }
                };

            let connection_handle = task::spawn(connection);

            if client.query_one("SELECT 1", &[]).await.is_err() {
                return Err(PostgresConnectionError::CanNotConnectToDatabase);
            }

            drop(client);
            match connection_handle.await {
                Ok(Ok(())) => (),
                Ok(Err(_)) | Err(_) => return Err(PostgresConnectionError::CanNotConnectToDatabase),
            }

            let manager = PostgresConnectionManager::new(config, tls_connector);

            let pool = Pool::builder().build(manager).await?;

            Ok(PostgresClient { pool, schema })
        }

        _new(connection_str, disable_ssl, schema).await
    }

    /// Schema destination tables are listed from, `None` meaning the session's current schema.
    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), PostgresError> {
        let conn = self.pool.get().await?;
        conn.batch_execute(sql).await.map_err(PostgresError::PgError)
    }

    pub async fn query<T>(
        &self,
        query: &T,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<Row>, PostgresError>
    where
        T: ?Sized + ToStatement,
    {
        let conn = self.pool.get().await?;
        let rows = conn.query(query, params).await.map_err(PostgresError::PgError)?;
        Ok(rows)
    }
}

#[async_trait]
impl BatchExecutor for PostgresClient {
    /// Runs the batch in one transaction. Each distinct statement text is prepared once, then all
    /// statements are pipelined over the connection.
    async fn execute_batch(&self, batch: &Batch) -> Result<(), ExecuteBatchError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut conn = self.pool.get().await?;
        let transaction = conn.transaction().await?;

        let mut prepared: HashMap<&str, Statement> = HashMap::new();
        let mut statements = Vec::with_capacity(batch.len());
        for (index, queued) in batch.statements().iter().enumerate() {
            let statement = match prepared.get(queued.sql.as_ref()) {
                Some(statement) => statement.clone(),
                None => {
                    let statement = transaction
                        .prepare(&queued.sql)
                        .await
                        .map_err(|source| ExecuteBatchError::Statement { index, source })?;
                    prepared.insert(queued.sql.as_ref(), statement.clone());
                    statement
                }
            };
            statements.push(statement);
        }

        debug!(
            "Executing batch of {} statements ({} distinct)",
            batch.len(),
            prepared.len()
        );

        let open_transaction = &transaction;
        let executions = batch.statements().iter().zip(&statements).enumerate().map(
            |(index, (queued, statement))| async move {
                let params: Vec<&(dyn ToSql + Sync)> =
                    queued.params.iter().map(|param| param as &(dyn ToSql + Sync)).collect();
                open_transaction
                    .execute(statement, &params)
                    .await
                    .map_err(|source| ExecuteBatchError::Statement { index, source })
            },
        );
        try_join_all(executions).await?;

        transaction.commit().await?;
        Ok(())
    }
}
