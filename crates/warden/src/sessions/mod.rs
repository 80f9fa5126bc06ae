//! Session issuance and validation.
//!
//! Sessions are created only after a successful challenge verification and
//! are never extended: validation is read-only until expiry.

mod manager;

pub use manager::SessionManager;
