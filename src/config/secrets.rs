//! Secret handling utilities.
//!
//! Re-exports secrecy types used for the database URL and the vision
//! service API key.

pub use secrecy::{ExposeSecret, SecretString};
