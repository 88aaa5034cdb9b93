//! The engine client library
//!
//! A typed, asynchronous call facade over the WebAssembly execution
//! engine.  Calling code names an exported operation, supplies an ordered
//! argument list, and receives exactly one outcome: a value decoded into
//! the requested type, or a structured failure.  Delivery is asynchronous
//! and never reenters the caller before the initiating call returns.
//!
//! The facade issues each call exactly once, retries nothing, and holds
//! no state across calls; ordering between independent invocations is
//! whatever the engine provides.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

pub mod error;
pub use error::ClientError;

use async_trait::async_trait;
use call_protocol::{
    decode_payload, encode_command, parse_event, ArgValue, Call, CallOptions, Command,
    CommandKind, ContentType, EngineCallId, EngineVersion, Event, EventData,
};
use log::debug;
use serde::de::DeserializeOwned;
use std::{collections::BTreeMap, sync::Arc};
use uuid::Uuid;

////////////////////////////////////////////////////////////////////////////////
// The engine seam.
////////////////////////////////////////////////////////////////////////////////

/// The one capability the facade requires of an engine: execute a
/// serialized command once and return the raw payload or a dispatch
/// error.  Implemented by `execution_engine::WasmEngine`; tests implement
/// it in-process.
#[async_trait]
pub trait AsyncEngine: Send + Sync {
    async fn call(&self, command: Vec<u8>) -> anyhow::Result<Vec<u8>>;
}

#[async_trait]
impl AsyncEngine for execution_engine::WasmEngine {
    async fn call(&self, command: Vec<u8>) -> anyhow::Result<Vec<u8>> {
        execution_engine::WasmEngine::call(self, command).await
    }
}

////////////////////////////////////////////////////////////////////////////////
// The client.
////////////////////////////////////////////////////////////////////////////////

/// The call facade.  Cheap to clone; clones share the engine and carry
/// their own copy of the client-level call options.
pub struct EngineClient<E> {
    engine: Arc<E>,
    options: CallOptions,
}

impl<E> Clone for EngineClient<E> {
    fn clone(&self) -> Self {
        EngineClient {
            engine: Arc::clone(&self.engine),
            options: self.options.clone(),
        }
    }
}

impl<E: AsyncEngine + 'static> EngineClient<E> {
    pub fn new(engine: Arc<E>) -> Self {
        EngineClient {
            engine,
            options: CallOptions::default(),
        }
    }

    pub fn with_options(engine: Arc<E>, options: CallOptions) -> Self {
        EngineClient { engine, options }
    }

    /// Marks subsequent calls as carrying a premium entitlement.
    pub fn set_premium(&mut self, premium: bool) {
        self.options.premium = premium;
    }

    /// Replaces the serialized per-module options forwarded with every
    /// call.
    pub fn set_module_options(&mut self, extra: BTreeMap<String, String>) {
        self.options.extra = extra;
    }

    /// Invokes `operation` with `args` and decodes the result payload as
    /// `T`.  One dispatch, one decode, one outcome.
    pub async fn invoke<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<ArgValue>,
    ) -> Result<T, ClientError> {
        self.invoke_as(operation, args, ContentType::Postcard).await
    }

    /// `invoke`, with the result payload carried as JSON.
    pub async fn invoke_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<ArgValue>,
    ) -> Result<T, ClientError> {
        self.invoke_as(operation, args, ContentType::Json).await
    }

    /// Completion-handler form of `invoke`: spawns the call and hands the
    /// outcome to `continuation`.  The continuation runs exactly once,
    /// for failures as much as for values, and never before this method
    /// has returned.  Must be called within a tokio runtime.
    pub fn invoke_with<T, F>(&self, operation: &str, args: Vec<ArgValue>, continuation: F)
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce(Result<T, ClientError>) + Send + 'static,
    {
        let client = self.clone();
        let operation = operation.to_string();
        tokio::spawn(async move {
            continuation(
                client
                    .invoke_as::<T>(&operation, args, ContentType::Postcard)
                    .await,
            );
        });
    }

    /// The well-known version call every compliant engine answers.
    pub async fn version(&self) -> Result<EngineVersion, ClientError> {
        self.invoke(EngineCallId::GetVersion.id(), Vec::new()).await
    }

    async fn invoke_as<T: DeserializeOwned>(
        &self,
        operation: &str,
        args: Vec<ArgValue>,
        content_type: ContentType,
    ) -> Result<T, ClientError> {
        if operation.trim().is_empty() {
            return Err(ClientError::InvalidOperation);
        }
        let mut options = self.options.clone();
        options.content_type = content_type;
        let command = Command {
            request_id: Uuid::new_v4().to_string(),
            kind: CommandKind::Call,
            call: Call::new(operation, args),
            options,
        };
        debug!("dispatching {} ({})", command.call.id, command.request_id);
        let encoded = encode_command(&command).map_err(ClientError::Request)?;
        let payload = self
            .engine
            .call(encoded)
            .await
            .map_err(|e| ClientError::Dispatch(format!("{:?}", e)))?;
        cast::<T>(&payload, content_type)
    }
}

/// Decodes a result payload as `T`.  When that fails, the payload is
/// given one chance to explain itself as a guest error event before the
/// decode mismatch is surfaced.
fn cast<T: DeserializeOwned>(payload: &[u8], content_type: ContentType) -> Result<T, ClientError> {
    match decode_payload::<T>(payload, content_type) {
        Ok(value) => Ok(value),
        Err(decode_err) => match parse_event(payload, content_type) {
            Ok(Event {
                data: EventData::Error { code, reason },
            }) => Err(ClientError::Engine(code, reason)),
            _ => Err(ClientError::Decode(decode_err)),
        },
    }
}
