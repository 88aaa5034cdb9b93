//! An implementation of the guest call convention for Wasmtime.
//!
//! One `WasmtimeSession` is one instantiation of the guest module: its own
//! store, linear memory, and host imports.  The call convention, end to
//! end:
//!
//! 1. allocate a 24-byte out-cell through the guest's `allocate` export;
//! 2. copy the serialized command into guest memory;
//! 3. invoke `call(out_ptr, input_ptr, input_len)`;
//! 4. read the future struct back out of the out-cell and lift the
//!    `data`/`len` payload out of linear memory;
//! 5. release the allocations back to the guest.
//!
//! A future that still carries a continuation (`callback`/`index`
//! non-zero) is a dispatch failure: the host does not service guest-side
//! asyncify continuations.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use crate::{
    engines::common::{EngineSession, FatalEngineError},
    memory::{self, GUEST_FUTURE_SIZE},
};
use anyhow::Result;
use log::debug;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use wasmtime::{Caller, Engine, Instance, Linker, Memory, Module, Store, TypedFunc};

/// The module name under which the utility imports are provided.
const HOST_MODULE: &str = "asyncify";

////////////////////////////////////////////////////////////////////////////////
// The Wasmtime session.
////////////////////////////////////////////////////////////////////////////////

/// One instantiation of the guest module.
pub struct WasmtimeSession {
    store: Store<()>,
    memory: Memory,
    allocate: TypedFunc<u32, u32>,
    release: TypedFunc<u32, ()>,
    call: TypedFunc<(u32, u32, u32), ()>,
}

impl WasmtimeSession {
    /// Instantiates `module` with the host utility imports and resolves
    /// the exports the call convention requires.
    pub fn new(engine: &Engine, module: &Module) -> Result<Self> {
        let mut store = Store::new(engine, ());
        let mut linker = Linker::new(engine);
        add_host_imports(&mut linker)?;
        let instance = linker.instantiate(&mut store, module)?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or(FatalEngineError::MissingExport("memory"))?;
        let allocate = typed_export::<u32, u32>(&instance, &mut store, "allocate")?;
        let release = typed_export::<u32, ()>(&instance, &mut store, "release")?;
        let call = typed_export::<(u32, u32, u32), ()>(&instance, &mut store, "call")?;
        debug!("guest module instantiated");
        Ok(WasmtimeSession {
            store,
            memory,
            allocate,
            release,
            call,
        })
    }
}

impl EngineSession for WasmtimeSession {
    fn call(&mut self, command: &[u8]) -> Result<Vec<u8>> {
        let out_ptr = self.allocate.call(&mut self.store, GUEST_FUTURE_SIZE)?;
        let input_ptr =
            match memory::write_bytes(&self.memory, &mut self.store, &self.allocate, command) {
                Ok(ptr) => ptr,
                Err(e) => {
                    let _ = self.release.call(&mut self.store, out_ptr);
                    return Err(e);
                }
            };
        let outcome = self.dispatch(out_ptr, input_ptr, command.len() as u32);
        // The out-cell and the input are host allocations; they go back to
        // the guest whichever way the call went, so a session returned to
        // the pool after a failure carries nothing forward.  Release
        // failures are survivable: the allocation dies with the
        // instantiation.
        let _ = self.release.call(&mut self.store, out_ptr);
        let _ = self.release.call(&mut self.store, input_ptr);
        outcome
    }
}

impl WasmtimeSession {
    /// Runs the guest call and lifts the resolved payload out of linear
    /// memory.  The caller owns the out-cell and input allocations.
    fn dispatch(&mut self, out_ptr: u32, input_ptr: u32, input_len: u32) -> Result<Vec<u8>> {
        self.call
            .call(&mut self.store, (out_ptr, input_ptr, input_len))?;
        let future = memory::read_future(&self.memory, &self.store, out_ptr)?;
        if future.is_pending() {
            return Err(FatalEngineError::PendingFuture(future.callback, future.index).into());
        }
        let payload = memory::read_bytes(&self.memory, &self.store, future.data, future.len)?;
        if future.data != 0 {
            let _ = self.release.call(&mut self.store, future.data);
        }
        Ok(payload)
    }
}

/// Resolves a typed export, distinguishing a missing export from a
/// mistyped one.
fn typed_export<P, R>(
    instance: &Instance,
    store: &mut Store<()>,
    name: &'static str,
) -> Result<TypedFunc<P, R>>
where
    P: wasmtime::WasmParams,
    R: wasmtime::WasmResults,
{
    let func = instance
        .get_func(&mut *store, name)
        .ok_or(FatalEngineError::MissingExport(name))?;
    Ok(func.typed::<P, R>(store)?)
}

////////////////////////////////////////////////////////////////////////////////
// Host imports.
////////////////////////////////////////////////////////////////////////////////

/// Registers the `asyncify` utility imports.  Guests that do not import
/// them are unaffected; the linker only supplies what a module asks for.
fn add_host_imports(linker: &mut Linker<()>) -> Result<()> {
    linker.func_wrap(
        HOST_MODULE,
        "log",
        |mut caller: Caller<'_, ()>, ptr: u32, len: u32| -> Result<()> {
            let memory = guest_memory(&mut caller)?;
            let bytes = memory::read_bytes(&memory, &caller, ptr, len)?;
            debug!(target: "guest", "{}", String::from_utf8_lossy(&bytes));
            Ok(())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        "epoch_time",
        |mut caller: Caller<'_, ()>, out_ptr: u32| -> Result<()> {
            let memory = guest_memory(&mut caller)?;
            let allocate = guest_allocator(&mut caller)?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs_f64();
            memory::write_string_cell(&memory, &mut caller, &allocate, out_ptr, &now.to_string())
        },
    )?;
    linker.func_wrap(
        HOST_MODULE,
        "uuid_v4",
        |mut caller: Caller<'_, ()>, out_ptr: u32| -> Result<()> {
            let memory = guest_memory(&mut caller)?;
            let allocate = guest_allocator(&mut caller)?;
            let id = uuid::Uuid::new_v4().to_string();
            memory::write_string_cell(&memory, &mut caller, &allocate, out_ptr, &id)
        },
    )?;
    linker.func_wrap(HOST_MODULE, "usleep", |micros: u32| {
        std::thread::sleep(Duration::from_micros(micros as u64));
    })?;
    Ok(())
}

/// The guest's exported memory, seen from inside a host import.
fn guest_memory(caller: &mut Caller<'_, ()>) -> Result<Memory> {
    caller
        .get_export("memory")
        .and_then(|export| export.into_memory())
        .ok_or_else(|| FatalEngineError::MissingExport("memory").into())
}

/// The guest's exported allocator, seen from inside a host import.
fn guest_allocator(caller: &mut Caller<'_, ()>) -> Result<TypedFunc<u32, u32>> {
    let func = caller
        .get_export("allocate")
        .and_then(|export| export.into_func())
        .ok_or(FatalEngineError::MissingExport("allocate"))?;
    Ok(func.typed::<u32, u32>(&*caller)?)
}
