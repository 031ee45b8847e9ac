//! Civicload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Ambient pieces shared by the civicload workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` environment variables
//! - **Formatting**: human-readable row counts, rates and durations for progress lines
//!
//! # Example
//!
//! ```no_run
//! use civicload_common::logging::{init_logging, LogConfig};
//! use civicload_common::format::format_count;
//!
//! fn main() -> anyhow::Result<()> {
//!     init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!(rows = %format_count(1_250_000), "Loaded");
//!     Ok(())
//! }
//! ```

pub mod format;
pub mod logging;

pub use logging::{init_logging, LogConfig};
