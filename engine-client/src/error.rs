//! The client-facing failure taxonomy.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use call_protocol::ProtocolError;
use err_derive::Error;

/// Every failure an invocation can produce.  Exactly one of these, or a
/// decoded value, reaches the caller; failures are reported, never
/// escalated.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The engine could not execute the operation: not found, trap during
    /// execution, resource exhaustion.
    #[error(display = "EngineClient: dispatch failed: {}.", _0)]
    Dispatch(String),
    /// The operation executed but its payload does not decode as the
    /// requested type.
    #[error(display = "EngineClient: payload did not decode as requested: {}.", _0)]
    Decode(#[error(source)] ProtocolError),
    /// The guest executed the operation and reported a structured error
    /// event in place of a result.
    #[error(display = "EngineClient: engine reported error {}: {}.", _0, _1)]
    Engine(i32, String),
    /// The request could not be encoded for dispatch.
    #[error(display = "EngineClient: request could not be encoded: {}.", _0)]
    Request(ProtocolError),
    /// The operation reference was empty or otherwise unusable.
    #[error(display = "EngineClient: invalid operation reference.")]
    InvalidOperation,
}

impl ClientError {
    /// Whether this failure belongs to the dispatch class (the engine
    /// never produced a usable payload) rather than the decode class.
    pub fn is_dispatch(&self) -> bool {
        !matches!(self, ClientError::Decode(_))
    }
}
