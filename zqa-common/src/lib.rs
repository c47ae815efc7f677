//! # ZQA Common Library
//!
//! Shared code for the ZQA services:
//! - Error type shared by configuration and database setup
//! - Layered configuration loading (CLI/ENV → TOML → compiled defaults)
//! - SQLite pool initialization and schema migrations

pub mod config;
pub mod db;
pub mod error;

pub use error::{Error, Result};
