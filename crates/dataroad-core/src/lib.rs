pub mod calculator;
pub mod config;
pub mod enricher;
pub mod error;
pub mod ingestion;
pub mod mortality;
pub mod normalize;
pub mod outputs;
pub mod pipelines;
pub mod schema;
pub mod summary;
pub mod types;
