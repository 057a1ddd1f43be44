pub mod app;
pub mod cache;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fasta;
pub mod ncbi;
pub mod output;
pub mod presets;
pub mod query;
pub mod report;
