// Infrastructure layer - Settings loading and data source adapters
pub mod config;
pub mod fixture_source;
