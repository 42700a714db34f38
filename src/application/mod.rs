// Application layer - Chart evaluation use cases
pub mod builders;
pub mod configuration;
pub mod data_source;
pub mod evaluation;
pub mod load_series;
