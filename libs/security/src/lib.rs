//! Request and webhook signing for the ACP gateway.
//!
//! Signatures are HMAC-SHA256 over the literal string `"{timestamp}.{body}"`
//! with hex output; verification is constant-time and bounded by a
//! freshness window to stop replays.
pub mod middleware;
pub mod signature;

pub use middleware::*;
pub use signature::*;
