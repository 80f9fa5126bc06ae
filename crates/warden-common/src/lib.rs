//! # Warden Common
//!
//! Shared types, errors, and constants used across Warden components.
//!
//! ## Modules
//! - `types` - Domain data structures (Challenge, Session, NodeRole, etc.)
//! - `error` - Storage and verification error types
//! - `constants` - Defaults and key layout

pub mod constants;
pub mod error;
pub mod types;

pub use error::{StoreError, VerifyError};
pub use types::*;
