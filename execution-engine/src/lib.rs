//! The asynchronous WebAssembly execution engine
//!
//! This library hosts an asyncify-style WebAssembly compute module and
//! exposes a single byte-level operation to clients: submit a serialized
//! command, receive the raw result payload.  Calls run on a fixed-size pool
//! of module instantiations; a call that traps discards its instantiation
//! and a fresh one takes its place, so one bad call never poisons the pool.
//!
//! The `call` here is deliberately opaque: command framing and payload
//! decoding belong to the `call-protocol` and `engine-client` crates.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

pub mod engines;
pub mod memory;
pub mod pool;
// Expose the error to the external.
pub use engines::common::{EngineSession, FatalEngineError};

use crate::pool::SessionPool;
use anyhow::{anyhow, Result};
use log::info;
use std::{path::Path, sync::Arc};
use tokio::sync::watch;
use wasmtime::{Config, Engine, Module};

/// Construction parameters for a `WasmEngine`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EngineConfig {
    /// Number of module instantiations kept warm in the pool.
    pub pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig { pool_size: 5 }
    }
}

/// Lifecycle of the engine, published through a watch channel so callers
/// can observe it without polling the engine itself.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Failed(String),
}

/// The top-level engine host: one compiled module, a pool of
/// instantiations, and a lifecycle signal.
pub struct WasmEngine {
    pool: Arc<SessionPool>,
    state: watch::Sender<EngineState>,
}

impl WasmEngine {
    /// Compiles `binary` (WASM or WAT) and fills the instantiation pool.
    pub fn new(binary: &[u8], config: EngineConfig) -> Result<Self> {
        let (state, _) = watch::channel(EngineState::Starting);
        let mut wasm_config = Config::default();
        wasm_config.wasm_simd(true);
        let engine = Engine::new(&wasm_config)?;
        let module = Module::new(&engine, binary)?;
        let pool = match SessionPool::new(engine, module, config.pool_size) {
            Ok(pool) => Arc::new(pool),
            Err(e) => {
                let _ = state.send(EngineState::Failed(e.to_string()));
                return Err(e);
            }
        };
        info!("engine pool of {} instantiation(s) ready", config.pool_size);
        let _ = state.send(EngineState::Running);
        Ok(WasmEngine { pool, state })
    }

    /// Compiles the module stored at `path` and fills the pool.
    pub fn from_file<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self> {
        let binary = std::fs::read(path)?;
        Self::new(&binary, config)
    }

    /// Subscribes to the engine lifecycle.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// Submits one serialized command to the guest and returns the raw
    /// result payload.  The guest call runs on a blocking worker thread;
    /// the caller's task is only suspended, never blocked.
    ///
    /// A call that traps discards the instantiation it ran on and a
    /// replacement is instantiated before the error is returned.
    pub async fn call(&self, command: Vec<u8>) -> Result<Vec<u8>> {
        let mut session = self.pool.acquire().await;
        let joined = tokio::task::spawn_blocking(move || {
            let result = session.call(&command);
            (session, result)
        })
        .await;
        let (session, result) = match joined {
            Ok(pair) => pair,
            Err(join_err) => {
                // The worker died holding its instantiation; refill the
                // slot before reporting the failure.
                info!("engine worker thread failed: {}", join_err);
                if let Err(recreate_err) = self.pool.recreate().await {
                    let _ = self
                        .state
                        .send(EngineState::Failed(recreate_err.to_string()));
                    return Err(recreate_err.context(join_err));
                }
                return Err(anyhow!("engine worker thread failed: {}", join_err));
            }
        };
        match result {
            Ok(payload) => {
                self.pool.restore(session).await;
                Ok(payload)
            }
            Err(e) => {
                if e.downcast_ref::<wasmtime::Trap>().is_some() {
                    info!("guest trapped, discarding its instantiation: {:?}", e);
                    drop(session);
                    if let Err(recreate_err) = self.pool.recreate().await {
                        let _ = self
                            .state
                            .send(EngineState::Failed(recreate_err.to_string()));
                        return Err(recreate_err.context(e));
                    }
                } else {
                    self.pool.restore(session).await;
                }
                Err(e)
            }
        }
    }
}

impl Drop for WasmEngine {
    fn drop(&mut self) {
        let _ = self.state.send(EngineState::Stopped);
    }
}
