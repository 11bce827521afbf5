//! modelforge CLI
//!
//! Thin terminal front end over `modelforge-core`: login, logout, status
//! and one-shot chat.

pub mod cli;
pub mod commands;
pub mod console;

pub use cli::{Cli, Commands};
