//! CLI command implementations.

pub mod config;
pub mod count;
pub mod delete_index;
pub mod ingest;
pub mod search;
pub mod settings;
