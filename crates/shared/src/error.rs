//! Error types for storefront shared values

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorefrontError {
    #[error("Invalid theme: {0}")]
    InvalidTheme(String),

    #[error("Invalid domain status: {0}")]
    InvalidStatus(String),
}
