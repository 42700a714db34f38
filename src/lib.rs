// Time series chart engine - chart definitions evaluated into chart states
pub mod application;
pub mod domain;
pub mod error;
pub mod infrastructure;
