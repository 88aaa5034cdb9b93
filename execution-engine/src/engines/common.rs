//! Common code for any implementation of the guest call convention.
//!
//! This module contains:
//! - The interface a session (one module instantiation) exposes to the
//!   rest of this library.
//! - The fatal error cases a session can raise outside of ordinary guest
//!   traps.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use anyhow::Result;
use err_derive::Error;
use std::vec::Vec;

////////////////////////////////////////////////////////////////////////////////
// The session trait.
////////////////////////////////////////////////////////////////////////////////

/// One instantiation of the guest module, able to run one call at a time.
/// This is what an execution strategy exposes to the rest of this library:
/// submit the serialized command, receive the raw result payload.  If any
/// functionality is missing that the pool or the engine front-end require,
/// it should be added here and implemented for all strategies.
pub trait EngineSession: Send {
    /// Runs one command through the guest's `call` export.  Returns the
    /// raw payload the guest produced, or an error if the guest trapped,
    /// violated the call convention, or left the call unresolved.
    fn call(&mut self, command: &[u8]) -> Result<Vec<u8>>;
}

////////////////////////////////////////////////////////////////////////////////
// Fatal engine errors.
////////////////////////////////////////////////////////////////////////////////

/// Call-convention violations raised by the host.  Guest traps are not
/// listed here; they surface as `wasmtime::Trap` values.
#[derive(Debug, Error)]
pub enum FatalEngineError {
    /// The module does not export something the call convention requires.
    #[error(display = "ExecutionEngine: missing required guest export: {}.", _0)]
    MissingExport(&'static str),
    /// The guest returned a future that still carries a continuation; the
    /// host does not service guest-side asyncify continuations.
    #[error(
        display = "ExecutionEngine: guest returned a pending future (callback {}, index {}).",
        _0,
        _1
    )]
    PendingFuture(u32, u32),
    /// A pointer/length pair reached outside of linear memory.
    #[error(
        display = "ExecutionEngine: linear memory transfer out of bounds at {}+{}.",
        _0,
        _1
    )]
    MemoryOutOfBounds(u32, u32),
    /// The out-cell did not hold a well-formed future struct.
    #[error(display = "ExecutionEngine: malformed guest future cell.")]
    MalformedFuture,
}
