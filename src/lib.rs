pub mod auth;
pub mod config;
pub mod ingest;
pub mod kusto;
pub mod schema;
pub mod sequence;
