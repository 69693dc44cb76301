//! Authentication module for the Webscan server
//!
//! This module handles credential hashing, bearer token issuance,
//! email verification tokens and the auth state machine.

pub mod handlers;
pub mod password;
pub mod service;
pub mod tokens;
pub mod verification;

pub use service::{AuthService, TokenPair, VerifyOutcome};
pub use tokens::{Claims, TokenCodec};
pub use verification::{TokenValidation, VerificationTokenStore};
