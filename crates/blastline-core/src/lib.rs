//! # Blastline Core
//!
//! Shared foundation for the Blastline campaign engine: configuration,
//! the error taxonomy, campaign/contact/send-record types, the phone
//! normalizer and the retry backoff policy.

pub mod backoff;
pub mod config;
pub mod error;
pub mod phone;
pub mod types;

pub use error::{BlastlineError, Result};
