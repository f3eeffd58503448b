//! Native extension bridge.
//!
//! Loads compiled shared libraries at runtime, discovers their
//! script-callable exports through a manifest, and marshals calls between
//! dynamically typed script values and `extern "C"` entry points.
//!
//! # Architecture
//!
//! ```text
//! script: loadDll("libfib.so")
//!       │
//!       ▼
//! LibraryRegistry (canonical path -> LibraryRecord, version counter)
//!       │
//!       ▼
//! ImageLoader / DlopenLoader (libloading)
//!       │
//!       ▼
//! dll_exports manifest -> NativeBinding per export
//!       │
//!       ▼
//! script: fib(10)  ──►  call bridge  ──►  native entry point
//! ```
//!
//! Script-visible callables never hold raw entry pointers; they reference
//! bindings by `(canonical path, symbol)` and every call re-validates the
//! owning record's version, so unload and hot-reload can never route a call
//! into unmapped memory.

pub mod call;
pub mod loader;
pub mod manifest;
pub mod registry;
pub mod types;

pub use loader::{DlopenLoader, ImageLoader, LibraryImage};
pub use manifest::{ExportDecl, ExportManifest};
pub use registry::{LibraryRecord, LibraryRegistry, NativeBinding};
pub use types::{NativeType, NativeValue, Signature, MANIFEST_SYMBOL, MAX_ARITY};

#[cfg(test)]
pub(crate) mod testutil;


use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the bridge.
///
/// Every variant is re-thrown into the script environment as a catchable
/// value; none of them terminate the host. [`BridgeError::kind`] gives the
/// stable machine-readable name.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The library file is missing, not a valid image for the platform, or
    /// has unresolved link-time dependencies.
    #[error("failed to load library '{}': {reason}", .path.display())]
    LoadFailure { path: PathBuf, reason: String },

    /// The library loaded but its export manifest is missing, malformed, or
    /// names a symbol the image does not contain.
    #[error("failed to resolve exports of '{}': {reason}", .path.display())]
    SymbolResolution { path: PathBuf, reason: String },

    /// The operation targets a path with no active record.
    #[error("library not loaded: '{}'", .path.display())]
    NotLoaded { path: PathBuf },

    /// An export name is already bound to a global the registry does not own.
    #[error("cannot bind '{name}' from '{}': name is already in use", .path.display())]
    NameCollision { name: String, path: PathBuf },

    /// A call went through a binding whose owning library has been unloaded
    /// or reloaded since the binding was created.
    #[error("stale binding '{name}': {reason}")]
    StaleBinding { name: String, reason: String },

    /// A call-site argument violates the export's declared signature:
    /// wrong arity, wrong kind, or an out-of-domain value.
    #[error("bad call to '{function}': {reason}")]
    ArgumentTypeMismatch { function: String, reason: String },

    /// Call to a name that was never bound or has since been removed.
    #[error("unknown function: '{name}'")]
    UnknownFunction { name: String },

    /// Unload or reload was attempted while a call into the library is
    /// still on the stack.
    #[error("library '{}' is busy: a native call is still in flight", .path.display())]
    LibraryInUse { path: PathBuf },
}

impl BridgeError {
    /// Stable machine-readable error kind, for inspection from script.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::LoadFailure { .. } => "LoadFailure",
            BridgeError::SymbolResolution { .. } => "SymbolResolutionFailure",
            BridgeError::NotLoaded { .. } => "NotLoaded",
            BridgeError::NameCollision { .. } => "NameCollision",
            BridgeError::StaleBinding { .. } => "StaleBinding",
            BridgeError::ArgumentTypeMismatch { .. } => "ArgumentTypeMismatch",
            BridgeError::UnknownFunction { .. } => "UnknownFunction",
            BridgeError::LibraryInUse { .. } => "LibraryInUse",
        }
    }
}
