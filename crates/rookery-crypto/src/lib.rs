//! Rookery crypto helpers.
//!
//! - Argon2id password hashing
//! - Purpose-tagged, time-limited signed tokens (HS256 JWT)
//! - Gravatar URLs derived from an email hash

pub mod gravatar;
pub mod password;
pub mod token;
