//! Integration tests for the wasmtime host, driven by hand-written WAT
//! guests that implement the call convention.
//!
//! ## Authors
//!
//! The AsyncWasm Host Development Team.
//!
//! ## Licensing and copyright notice
//!
//! See the `LICENSE_MIT.markdown` file in the repository root for
//! information on licensing and copyright.

use execution_engine::{EngineConfig, EngineState, FatalEngineError, WasmEngine};
use std::{sync::Arc, time::Duration};

/// A guest that logs the command and echoes it back as the result.
const ECHO_GUEST: &str = r#"
(module
  (import "asyncify" "log" (func $log (param i32 i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "release") (param i32))
  (func (export "call") (param $out i32) (param $input i32) (param $len i32)
    (call $log (local.get $input) (local.get $len))
    (i32.store (local.get $out) (local.get $input))
    (i32.store offset=4 (local.get $out) (local.get $len))
    (i32.store offset=8 (local.get $out) (i32.const 0))
    (i32.store offset=12 (local.get $out) (i32.const 0))
    (i32.store offset=16 (local.get $out) (i32.const 0))
    (i32.store offset=20 (local.get $out) (i32.const 0))))
"#;

/// A guest whose `call` export always traps.
const TRAP_GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "release") (param i32))
  (func (export "call") (param i32) (param i32) (param i32)
    unreachable))
"#;

/// A guest that parks a continuation instead of resolving its future.
const PENDING_GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "release") (param i32))
  (func (export "call") (param $out i32) (param $input i32) (param $len i32)
    (i32.store (local.get $out) (i32.const 0))
    (i32.store offset=4 (local.get $out) (i32.const 0))
    (i32.store offset=8 (local.get $out) (i32.const 1))
    (i32.store offset=12 (local.get $out) (i32.const 0))
    (i32.store offset=16 (local.get $out) (i32.const 0))
    (i32.store offset=20 (local.get $out) (i32.const 7))))
"#;

/// A guest that asks the host for a UUID and returns it as the result.
const UUID_GUEST: &str = r#"
(module
  (import "asyncify" "uuid_v4" (func $uuid (param i32)))
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "release") (param i32))
  (func (export "call") (param $out i32) (param $input i32) (param $len i32)
    (call $uuid (i32.const 256))
    (i32.store (local.get $out) (i32.load (i32.const 256)))
    (i32.store offset=4 (local.get $out) (i32.load (i32.const 260)))
    (i32.store offset=8 (local.get $out) (i32.const 0))
    (i32.store offset=12 (local.get $out) (i32.const 0))
    (i32.store offset=16 (local.get $out) (i32.const 0))
    (i32.store offset=20 (local.get $out) (i32.const 0))))
"#;

/// A guest that counts its live allocations.  The first call resolves its
/// future with an out-of-bounds payload pointer; every later call reports
/// the allocation balance observed on entry.
const LEDGER_GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (global $heap (mut i32) (i32.const 1024))
  (global $live (mut i32) (i32.const 0))
  (global $poisoned (mut i32) (i32.const 0))
  (func (export "allocate") (param $len i32) (result i32)
    (local $ptr i32)
    (global.set $live (i32.add (global.get $live) (i32.const 1)))
    (local.set $ptr (global.get $heap))
    (global.set $heap (i32.add (global.get $heap) (local.get $len)))
    (local.get $ptr))
  (func (export "release") (param i32)
    (global.set $live (i32.sub (global.get $live) (i32.const 1))))
  (func (export "call") (param $out i32) (param $input i32) (param $len i32)
    (if (i32.eqz (global.get $poisoned))
      (then
        (global.set $poisoned (i32.const 1))
        (i32.store (local.get $out) (i32.const 0x7ffffff0))
        (i32.store offset=4 (local.get $out) (i32.const 16)))
      (else
        (i32.store (i32.const 512) (global.get $live))
        (i32.store (local.get $out) (i32.const 512))
        (i32.store offset=4 (local.get $out) (i32.const 4))))
    (i32.store offset=8 (local.get $out) (i32.const 0))
    (i32.store offset=12 (local.get $out) (i32.const 0))
    (i32.store offset=16 (local.get $out) (i32.const 0))
    (i32.store offset=20 (local.get $out) (i32.const 0))))
"#;

/// A guest missing the `call` export entirely.
const INCOMPLETE_GUEST: &str = r#"
(module
  (memory (export "memory") 1)
  (func (export "allocate") (param i32) (result i32) (i32.const 1024))
  (func (export "release") (param i32)))
"#;

fn engine(wat: &str, pool_size: usize) -> WasmEngine {
    let _ = env_logger::builder().is_test(true).try_init();
    WasmEngine::new(wat.as_bytes(), EngineConfig { pool_size }).expect("engine construction")
}

#[tokio::test]
async fn echo_guest_roundtrips_the_command() {
    let engine = engine(ECHO_GUEST, 1);
    let payload = engine.call(b"hello guest".to_vec()).await.unwrap();
    assert_eq!(payload, b"hello guest");
}

#[tokio::test]
async fn engine_reports_its_lifecycle() {
    let engine = engine(ECHO_GUEST, 1);
    let rx = engine.state();
    assert_eq!(*rx.borrow(), EngineState::Running);
    drop(engine);
    assert_eq!(*rx.borrow(), EngineState::Stopped);
}

#[tokio::test]
async fn trap_is_reported_and_the_pool_recovers() {
    let engine = engine(TRAP_GUEST, 1);
    let first = engine.call(b"boom".to_vec()).await;
    assert!(first.is_err());
    assert!(first
        .unwrap_err()
        .downcast_ref::<wasmtime::Trap>()
        .is_some());
    // The single slot was discarded; if no replacement was instantiated
    // this second call would park forever on an empty pool.
    let second = tokio::time::timeout(Duration::from_secs(5), engine.call(b"boom".to_vec()))
        .await
        .expect("pool did not recover after a trap");
    assert!(second.is_err());
}

#[tokio::test]
async fn pending_future_is_a_dispatch_failure() {
    let engine = engine(PENDING_GUEST, 1);
    let err = engine.call(b"park".to_vec()).await.unwrap_err();
    match err.downcast_ref::<FatalEngineError>() {
        Some(FatalEngineError::PendingFuture(callback, index)) => {
            assert_eq!((*callback, *index), (1, 7));
        }
        other => panic!("expected PendingFuture, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_copy_out_still_releases_the_call_allocations() {
    let engine = engine(LEDGER_GUEST, 1);
    let err = engine.call(b"first".to_vec()).await.unwrap_err();
    match err.downcast_ref::<FatalEngineError>() {
        Some(FatalEngineError::MemoryOutOfBounds(ptr, len)) => {
            assert_eq!((*ptr, *len), (0x7fff_fff0, 16));
        }
        other => panic!("expected MemoryOutOfBounds, got {:?}", other),
    }
    // The same instantiation serves the next call; only that call's own
    // out-cell and input may still be allocated when the guest runs.
    let payload = engine.call(b"second".to_vec()).await.unwrap();
    assert_eq!(payload.len(), 4);
    let live = u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]);
    assert_eq!(live, 2, "allocations leaked across a failed call");
}

#[tokio::test]
async fn pool_refills_a_slot_lost_with_its_worker() {
    use execution_engine::pool::SessionPool;
    let _ = env_logger::builder().is_test(true).try_init();
    let engine = wasmtime::Engine::default();
    let module = wasmtime::Module::new(&engine, ECHO_GUEST.as_bytes()).unwrap();
    let pool = SessionPool::new(engine, module, 1).unwrap();
    // A worker that never comes back loses the session it was holding.
    drop(pool.acquire().await);
    pool.recreate().await.unwrap();
    let session = tokio::time::timeout(Duration::from_secs(5), pool.acquire())
        .await
        .expect("pool was not refilled");
    drop(session);
}

#[tokio::test]
async fn concurrent_calls_get_their_own_results() {
    let engine = Arc::new(engine(ECHO_GUEST, 2));
    let a = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.call(b"first".to_vec()).await.unwrap() }
    });
    let b = tokio::spawn({
        let engine = Arc::clone(&engine);
        async move { engine.call(b"second".to_vec()).await.unwrap() }
    });
    assert_eq!(a.await.unwrap(), b"first");
    assert_eq!(b.await.unwrap(), b"second");
}

#[tokio::test]
async fn uuid_host_import_reaches_the_guest() {
    let engine = engine(UUID_GUEST, 1);
    let payload = engine.call(Vec::new()).await.unwrap();
    let text = String::from_utf8(payload).unwrap();
    assert!(uuid::Uuid::parse_str(&text).is_ok(), "not a uuid: {}", text);
}

#[tokio::test]
async fn missing_call_export_fails_construction() {
    let _ = env_logger::builder().is_test(true).try_init();
    let err = match WasmEngine::new(INCOMPLETE_GUEST.as_bytes(), EngineConfig { pool_size: 1 }) {
        Ok(_) => panic!("construction should fail without a call export"),
        Err(e) => e,
    };
    match err.downcast_ref::<FatalEngineError>() {
        Some(FatalEngineError::MissingExport(name)) => assert_eq!(*name, "call"),
        other => panic!("expected MissingExport, got {:?}", other),
    }
}
