//! Storefront Shared Types and Utilities
//!
//! This crate contains types and utilities shared by the storefront edge
//! binaries.

pub mod error;
pub mod redact;
pub mod types;

pub use error::StorefrontError;
pub use redact::{redact_path, redact_paths, REDACTED};
pub use types::*;
