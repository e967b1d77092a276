// public
pub mod manifest;
pub mod writer;

mod database;
pub use database::postgres::{
    client::{connection_string, PostgresClient, PostgresConnectionError, PostgresError},
    query_builder::{build_insert, build_upsert, build_write_statement, quote_identifier},
    setup::{setup_postgres, SetupPostgresError},
    sql_type_wrapper::PgValue,
    tables::{tables_from_catalog, CatalogColumn},
};

mod logger;
pub use logger::{level_from_verbosity, setup_info_logger, setup_logger};

// export 3rd party dependencies
pub use arrow;
pub use async_trait::async_trait;
pub use tokio_postgres::types::Type as PgType;
pub use tokio_util::sync::CancellationToken;
pub use tracing::{error as pgsink_error, info as pgsink_info};
