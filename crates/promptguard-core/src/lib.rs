pub mod config;
pub mod error;
pub mod segment;
pub mod settings;
pub mod traits;
pub mod types;
