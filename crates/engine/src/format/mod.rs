//! Turns `$placeholder` log-format templates into
//! line-matching patterns.
//!
//! - `compile.rs`: template compiler and the primary/retry pattern pair
//! - `nginx.rs`: `log_format` extraction from nginx configuration text
//! - `error.rs`: construction-time errors

pub mod compile;
pub mod error;
pub mod nginx;

pub use compile::{compile, CompiledFormat, LinePattern};
pub use error::FormatError;
pub use nginx::extract_log_format;

/// Template used when no format is configured.
pub const DEFAULT_TEMPLATE: &str = "$remote_addr [$time_local] \"$request\"";
