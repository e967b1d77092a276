pub mod client;
pub mod query_builder;
pub mod setup;
pub mod sql_type_wrapper;
pub mod tables;
