pub mod bench;
pub mod buffer;
pub mod config;
pub mod engine;
pub mod errors;
pub mod monitoring;
pub mod safety;
pub mod series;
pub mod stress;
