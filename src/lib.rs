//! Dllbridge - Native Extension Bridge for an Embedding Script Console
//!
//! Loads compiled shared libraries into a running script host, publishes
//! their exports as callable script globals, and supports unloading and
//! hot-reloading them without corrupting running script state.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐
//! │  Script Engine   │  external collaborator (parsing, GC, REPL)
//! └────────┬─────────┘
//!          │ loadDll / unloadDll / reloadDll / listDlls / fib(10)
//!          ▼
//! ┌──────────────────┐
//! │  ExtensionHost   │  api: path resolution, error translation
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐     ┌───────────────────┐
//! │ LibraryRegistry  │────▶│ ImageLoader       │  libloading
//! │ (path→record,    │     │ (dll_exports      │
//! │  version counter)│     │  manifest)        │
//! └────────┬─────────┘     └───────────────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Call Bridge    │  arity/type/domain checks, 64-bit slot dispatch
//! └──────────────────┘
//! ```
//!
//! Script-visible callables reference bindings by `(canonical path, symbol)`
//! with a per-library generation counter, so a callable that outlives an
//! `unloadDll` or a hot reload fails with a catchable stale-binding error
//! instead of calling unmapped memory.
//!
//! # Example
//!
//! ```rust,no_run
//! use dllbridge::api::ExtensionHost;
//! use dllbridge::script::ScriptValue;
//!
//! let mut host = ExtensionHost::new();
//! let exports = host.load_dll("demos/libfib_extension.so")?;
//! println!("now callable: {exports}");
//!
//! let sum = host.call("fib", &[ScriptValue::Number(10.0)])?;
//! assert_eq!(sum, ScriptValue::Number(88.0));
//!
//! host.unload_dll("demos/libfib_extension.so")?;
//! # Ok::<(), dllbridge::bridge::BridgeError>(())
//! ```

pub mod api;
pub mod bridge;
pub mod config;
pub mod script;

pub use api::ExtensionHost;
pub use bridge::{BridgeError, LibraryRegistry};
pub use script::{Globals, NativeCallable, ScriptValue};
