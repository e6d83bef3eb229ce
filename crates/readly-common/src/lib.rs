//! Readly-Common: Shared types, IDs, and errors.
//!
//! This crate provides common functionality used across readly:
//!
//! - **Typed IDs**: [`JobId`], the opaque identifier assigned to every conversion job
//! - **Core Types**: job status and downloadable document formats
//! - **Error Handling**: the common error type and result alias
//!
//! # Examples
//!
//! ```
//! use readly_common::{DocumentFormat, Error, JobId, Result};
//!
//! let job_id = JobId::new();
//! assert_eq!(job_id.as_str().len(), 32);
//!
//! let format: DocumentFormat = "epub".parse().unwrap();
//! assert_eq!(format.media_type(), "application/epub+zip");
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("job"))
//! }
//! ```

pub mod error;
pub mod ids;
pub mod types;

pub use error::{Error, Result};
pub use ids::*;
pub use types::*;
