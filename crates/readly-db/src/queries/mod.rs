//! Database query modules.
//!
//! - conversions: inserting, resolving, listing and deleting conversion records
//! - analytics: read-only aggregates for statistics and reporting

pub mod analytics;
pub mod conversions;
