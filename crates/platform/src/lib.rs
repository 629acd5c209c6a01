//! # Moorage Platform
//!
//! Core platform types for the moorage SSH server library.
//!
//! This crate provides the unified error types (`MoorageError`,
//! `MoorageResult`) shared by every moorage crate.
//!
//! # Examples
//!
//! ```
//! use moorage_platform::{MoorageError, MoorageResult};
//!
//! fn example_function() -> MoorageResult<String> {
//!     Ok("Hello, moorage!".to_string())
//! }
//!
//! # fn main() -> MoorageResult<()> {
//! let result = example_function()?;
//! assert_eq!(result, "Hello, moorage!");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod error;

pub use error::{MoorageError, MoorageResult};

/// Platform version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
