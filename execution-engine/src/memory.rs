//! Linear-memory structures and access helpers for the guest call
//! convention.
//!
//! The guest communicates results through a small future struct written
//! into an out-cell the host allocates before each call: six little-endian
//! `u32` fields, 24 bytes in total.  The `data`/`len` pair addresses the
//! result payload; `callback`/`index` are only non-zero when the guest
//! parked a continuation, and `context`/`context_len` belong to the guest.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use crate::engines::common::FatalEngineError;
use anyhow::Result;
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Cursor;
use wasmtime::{AsContext, AsContextMut, Memory, TypedFunc};

/// Size in bytes of the future struct in guest memory.
pub const GUEST_FUTURE_SIZE: u32 = 24;

/// The future struct as the guest lays it out in linear memory.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct GuestFuture {
    /// Pointer to the result payload.
    pub data: u32,
    /// Length of the result payload.
    pub len: u32,
    /// Guest-side continuation function pointer, zero when resolved.
    pub callback: u32,
    /// Guest-owned context pointer; the host never interprets it.
    pub context: u32,
    pub context_len: u32,
    /// Host-side task key used by asyncify guests, zero when resolved.
    pub index: u32,
}

impl GuestFuture {
    /// Parses the 24-byte out-cell contents.
    pub fn parse(bytes: &[u8]) -> Result<Self, FatalEngineError> {
        if bytes.len() < GUEST_FUTURE_SIZE as usize {
            return Err(FatalEngineError::MalformedFuture);
        }
        let mut cursor = Cursor::new(bytes);
        let mut field = || {
            cursor
                .read_u32::<LittleEndian>()
                .map_err(|_| FatalEngineError::MalformedFuture)
        };
        Ok(GuestFuture {
            data: field()?,
            len: field()?,
            callback: field()?,
            context: field()?,
            context_len: field()?,
            index: field()?,
        })
    }

    /// Whether the guest still holds a continuation for this call.
    pub fn is_pending(&self) -> bool {
        self.callback != 0 || self.index != 0
    }
}

/// Copies `len` bytes out of linear memory.  The range is checked against
/// the memory size before the copy buffer is allocated; `ptr` and `len`
/// come straight from the guest and a bad future must not cost the host a
/// multi-gigabyte allocation.
pub fn read_bytes(
    memory: &Memory,
    store: impl AsContext,
    ptr: u32,
    len: u32,
) -> Result<Vec<u8>> {
    let ctx = store.as_context();
    let in_bounds = (ptr as usize)
        .checked_add(len as usize)
        .map_or(false, |end| end <= memory.data_size(&ctx));
    if !in_bounds {
        return Err(FatalEngineError::MemoryOutOfBounds(ptr, len).into());
    }
    let mut buffer = vec![0u8; len as usize];
    memory
        .read(&ctx, ptr as usize, &mut buffer)
        .map_err(|_| FatalEngineError::MemoryOutOfBounds(ptr, len))?;
    Ok(buffer)
}

/// Reads the future struct out of the out-cell at `ptr`.
pub fn read_future(memory: &Memory, store: impl AsContext, ptr: u32) -> Result<GuestFuture> {
    let bytes = read_bytes(memory, store, ptr, GUEST_FUTURE_SIZE)?;
    Ok(GuestFuture::parse(&bytes)?)
}

/// Copies `bytes` into guest memory through the guest's own allocator and
/// returns the pointer.  Ownership of the allocation passes to the caller,
/// who must `release` it.
pub fn write_bytes(
    memory: &Memory,
    mut store: impl AsContextMut,
    allocate: &TypedFunc<u32, u32>,
    bytes: &[u8],
) -> Result<u32> {
    let ptr = allocate.call(&mut store, bytes.len() as u32)?;
    memory
        .write(&mut store, ptr as usize, bytes)
        .map_err(|_| FatalEngineError::MemoryOutOfBounds(ptr, bytes.len() as u32))?;
    Ok(ptr)
}

/// Allocates `text` in guest memory and writes a pointer/length pair for
/// it at `out_ptr`, the shape guests expect from string-producing host
/// imports.
pub fn write_string_cell(
    memory: &Memory,
    mut store: impl AsContextMut,
    allocate: &TypedFunc<u32, u32>,
    out_ptr: u32,
    text: &str,
) -> Result<()> {
    let ptr = write_bytes(memory, &mut store, allocate, text.as_bytes())?;
    let mut cell = [0u8; 8];
    cell[..4].copy_from_slice(&ptr.to_le_bytes());
    cell[4..].copy_from_slice(&(text.len() as u32).to_le_bytes());
    memory
        .write(&mut store, out_ptr as usize, &cell)
        .map_err(|_| FatalEngineError::MemoryOutOfBounds(out_ptr, 8))?;
    Ok(())
}
