//! Issue cache library
//!
//! Downloads issues of a periodical, with their articles, pages and shared
//! resources, into local storage and keeps track of what is present.
//! Every download and deletion runs as a deduplicated, observable cache
//! operation; see [`app::cache`].

pub mod app;
pub mod cli;
pub mod config;
pub mod constants;
pub mod errors;
pub mod prelude;

// Re-export commonly used types for convenience
pub use errors::{AppError, Result};
