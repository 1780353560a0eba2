//! SQLite-backed job repository and Parquet export of job results.

mod open;
mod models;
mod insert;
mod query;
mod schema;
mod repository;
mod arrow_schemas;
mod export_parquet;

pub use open::Db;
pub use export_parquet::{export_job_table, ExportTable};
