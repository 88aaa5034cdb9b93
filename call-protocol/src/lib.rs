//! The engine call protocol library
//!
//! Message types and wire-format helpers shared between the WebAssembly
//! engine host and the clients that invoke operations on it.  The command
//! envelope is always encoded with `postcard`; the payload a call produces
//! is decoded according to the content type carried in the call options.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

pub mod command;
pub mod custom;
pub use crate::command::*;
pub use crate::custom::*;
