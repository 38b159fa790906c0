//! Session token subsystem.

pub mod token;

pub use token::{SessionClaims, TokenConfig, mint_session_token, verify_session_token};
