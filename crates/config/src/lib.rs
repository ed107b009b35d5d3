//! Configuration types for tipwatch.

pub mod btcio;
mod config;

pub use config::*;
