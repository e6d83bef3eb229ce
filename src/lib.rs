//! Readly - web page to PDF and EPUB conversion service
//!
//! This library crate exposes the core functionality for integration testing.

pub mod analytics;
pub mod config;
pub mod conversion;
pub mod rate_limit;
pub mod retention;
pub mod server;
