//! Wire-format helpers and derived functionality for the call protocol.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use crate::command::{Command, ContentType, Event};
use err_derive::Error;
use serde::{de::DeserializeOwned, Serialize};
use std::result::Result;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error(display = "CallProtocol: PostcardError: {:?}.", _0)]
    PostcardError(#[error(source)] postcard::Error),
    #[error(display = "CallProtocol: JsonError: {:?}.", _0)]
    JsonError(#[error(source)] serde_json::Error),
    #[error(display = "CallProtocol: invalid operation identifier: {:?}.", _0)]
    InvalidOperationId(String),
}

type ProtocolResult = Result<std::vec::Vec<u8>, ProtocolError>;

/// Serialize a command envelope for the guest's `call` export.
pub fn encode_command(command: &Command) -> ProtocolResult {
    Ok(postcard::to_allocvec(command)?)
}

/// Parse a command envelope, as the guest side of the boundary does.
pub fn parse_command(buffer: &[u8]) -> Result<Command, ProtocolError> {
    Ok(postcard::from_bytes::<Command>(buffer)?)
}

/// Parse a guest-produced event out of a result payload.
pub fn parse_event(buffer: &[u8], content_type: ContentType) -> Result<Event, ProtocolError> {
    decode_payload::<Event>(buffer, content_type)
}

/// Serialize a result payload in the given content type.
pub fn encode_payload<T: Serialize>(value: &T, content_type: ContentType) -> ProtocolResult {
    match content_type {
        ContentType::Postcard => Ok(postcard::to_allocvec(value)?),
        ContentType::Json => Ok(serde_json::to_vec(value)?),
    }
}

/// Decode a result payload into the requested shape.  Never panics on
/// arbitrary input; a mismatch is reported as an error.
pub fn decode_payload<T: DeserializeOwned>(
    buffer: &[u8],
    content_type: ContentType,
) -> Result<T, ProtocolError> {
    match content_type {
        ContentType::Postcard => Ok(postcard::from_bytes::<T>(buffer)?),
        ContentType::Json => Ok(serde_json::from_slice::<T>(buffer)?),
    }
}

/// Derive a wire operation identifier from a module scope and a CamelCase
/// operation name: `operation_id("music", "GetTrending")` yields
/// `MUSIC_GET_TRENDING`.
pub fn operation_id(scope: &str, name: &str) -> Result<String, ProtocolError> {
    if scope.is_empty() || name.is_empty() {
        return Err(ProtocolError::InvalidOperationId(format!(
            "{}/{}",
            scope, name
        )));
    }
    Ok(format!(
        "{}_{}",
        snakecased(scope).to_uppercase(),
        snakecased(name).to_uppercase()
    ))
}

/// Insert an underscore at every lower-to-upper case boundary.
fn snakecased(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_lower = false;
    for c in value.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('_');
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        out.push(c);
    }
    out
}
