//! Database module for the Webscan auth server
//!
//! Holds the row models and the data access layer. All writes that span
//! more than one row go through an explicit transaction owned by the
//! caller.

pub mod models;
pub mod operations;

pub use models::{Session, TokenPurpose, User, VerificationToken};
pub use operations::DbOperations;
