//! Page conversion jobs.
//!
//! This module covers everything between a submitted URL and a recorded job:
//!
//! - [`PageConverter`]: the external renderer, run as a child process by
//!   [`CommandConverter`]
//! - [`ProgressEvent`]: the ordered updates a client sees while it waits
//! - [`JobCache`]: the fast path used to resolve just-finished jobs
//! - [`Orchestrator`]: quota check, conversion, recording and resolution

mod cache;
mod converter;
mod events;
mod orchestrator;

pub use cache::{BoundedJobCache, JobCache, NoopJobCache};
pub use converter::{
    CommandConverter, ConversionError, ConversionOutput, ConversionRequest, PageConverter,
    ProgressReporter, DEFAULT_VIEWPORT_HEIGHT, DEFAULT_VIEWPORT_WIDTH,
};
pub use events::{CompletedJob, ProgressEvent};
pub use orchestrator::{Orchestrator, Submission};
