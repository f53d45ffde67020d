//! # Newsfeed Core
//!
//! The domain layer of the newsfeed backend.
//! Articles, query fingerprints, client keys and the ports that
//! infrastructure implements. No infrastructure dependencies live here.

pub mod domain;
pub mod error;
pub mod ports;

pub use error::DomainError;
