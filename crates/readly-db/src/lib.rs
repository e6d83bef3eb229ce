//! Readly-DB: the conversion tracking store.
//!
//! This crate provides durable storage for finished conversion jobs using
//! SQLite with rusqlite and r2d2 connection pooling, plus the read-side
//! queries the analytics layer aggregates.
//!
//! # Modules
//!
//! - `migrations` - Database schema migrations
//! - `pool` - Connection pool management
//! - `models` - Rust models matching database schema
//! - `queries` - Database query operations
//!
//! # Example
//!
//! ```no_run
//! use chrono::Utc;
//! use readly_db::models::NewConversion;
//! use readly_db::pool::{get_conn, init_pool};
//! use readly_db::queries::conversions;
//!
//! let pool = init_pool("/var/lib/readly/readly.db").unwrap();
//! let conn = get_conn(&pool).unwrap();
//!
//! let job = NewConversion::failed("https://example.com/a", "Timeout 30000ms exceeded", Utc::now());
//! conversions::insert_conversion(&conn, &job).unwrap();
//! ```

pub mod migrations;
pub mod models;
pub mod pool;
pub mod queries;
