// Domain layer - Chart value types and pure transformations
pub mod chart_definition;
pub mod color_generator;
pub mod point;
pub mod series;
pub mod state;
pub mod template;
pub mod time_series;
pub mod transform;
pub mod unit_format;
