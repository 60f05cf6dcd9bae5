//! Subcommand implementations.

pub mod config;
pub mod ensure;
pub mod filter;
pub mod find;
pub mod helpers;
pub mod schema;

pub use helpers::{Context, error_entry};
