//! I/O helpers: configuration files and prompt templates.

pub mod config;
pub mod prompt;
