//! ACP checkout engine core contracts and value types.
//!
//! This crate exposes the data structures exchanged between the gateway,
//! the session and idempotency stores, and the external adapters. It also
//! provides the session state machine, the protocol error taxonomy, and
//! validation for inbound request bodies.
pub mod adapters;
pub mod error;
pub mod requests;
pub mod state;
pub mod types;

pub use adapters::*;
pub use error::*;
pub use requests::*;
pub use state::*;
pub use types::*;
