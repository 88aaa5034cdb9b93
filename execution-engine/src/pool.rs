//! A fixed-size pool of guest module instantiations.
//!
//! The module is compiled once; each pool slot is an independent
//! instantiation with its own store and linear memory, so calls on
//! distinct slots share nothing.  A caller that finds the pool empty
//! parks and retries; the interval matches the original host's pool.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use crate::engines::wasmtime::WasmtimeSession;
use anyhow::Result;
use std::time::Duration;
use tokio::sync::Mutex;
use wasmtime::{Engine, Module};

/// Retry interval when every session is checked out.
const ACQUIRE_RETRY: Duration = Duration::from_millis(100);

pub struct SessionPool {
    engine: Engine,
    module: Module,
    available: Mutex<Vec<WasmtimeSession>>,
}

impl SessionPool {
    /// Instantiates `size` sessions from one compiled module.
    pub fn new(engine: Engine, module: Module, size: usize) -> Result<Self> {
        let mut available = Vec::with_capacity(size);
        for _ in 0..size {
            available.push(WasmtimeSession::new(&engine, &module)?);
        }
        Ok(SessionPool {
            engine,
            module,
            available: Mutex::new(available),
        })
    }

    /// Takes a session out of the pool, waiting until one is returned if
    /// every slot is checked out.
    pub async fn acquire(&self) -> WasmtimeSession {
        loop {
            if let Some(session) = self.available.lock().await.pop() {
                return session;
            }
            tokio::time::sleep(ACQUIRE_RETRY).await;
        }
    }

    /// Returns a healthy session to the pool.
    pub async fn restore(&self, session: WasmtimeSession) {
        self.available.lock().await.push(session);
    }

    /// Replaces a discarded session with a fresh instantiation.
    pub async fn recreate(&self) -> Result<()> {
        let session = WasmtimeSession::new(&self.engine, &self.module)?;
        self.available.lock().await.push(session);
        Ok(())
    }
}
