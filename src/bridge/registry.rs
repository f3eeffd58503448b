//! Library registry
//!
//! Process-wide table of loaded libraries, keyed by canonical path. The
//! registry is the single owner of every mapped image: it enforces
//! at-most-one-loaded-copy-per-path, publishes and withdraws script
//! globals, and coordinates unload and hot-reload against live bindings
//! through a per-record monotonic version counter.
//!
//! The registry is built for a single-threaded, cooperative host: all
//! mutation happens on one logical thread of control and nothing here
//! locks. A multi-threaded embedding must serialize every registry call
//! behind one mutex, which keeps the version re-check in `invoke` correct.

use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use indexmap::IndexMap;

use super::call;
use super::loader::{DlopenLoader, ImageLoader, LibraryImage};
use super::manifest::ExportManifest;
use super::types::Signature;
use super::BridgeError;
use crate::script::{Globals, NativeCallable, ScriptValue};

/// One resolved export: raw entry address plus its declared signature.
///
/// The entry address is only valid while the owning record's image stays
/// mapped; `owner_version` pins which incarnation of the library resolved
/// it, and the call bridge refuses to dereference a binding whose version
/// no longer matches.
#[derive(Debug, Clone)]
pub struct NativeBinding {
    /// Exported symbol name
    pub symbol: String,
    /// Declared call signature
    pub signature: Signature,
    /// Raw address inside the mapped image
    pub entry: usize,
    /// Owning record's version at binding time
    pub owner_version: u64,
    /// Manifest description, shown by the console's help output
    pub description: String,
}

/// Per-library record: the mapped image, its exports, and its lifecycle
/// counters.
pub struct LibraryRecord {
    canonical_path: PathBuf,
    image: Option<Box<dyn LibraryImage>>,
    exports: IndexMap<String, NativeBinding>,
    version: u64,
    loaded_at: SystemTime,
    active_calls: usize,
}

impl LibraryRecord {
    pub fn canonical_path(&self) -> &Path {
        &self.canonical_path
    }

    /// Monotonic reload counter; starts at 1 and increments on every
    /// successful reload.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    pub fn export_names(&self) -> Vec<String> {
        self.exports.keys().cloned().collect()
    }

    pub fn binding(&self, symbol: &str) -> Option<&NativeBinding> {
        self.exports.get(symbol)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &NativeBinding> {
        self.exports.values()
    }

    /// Unmap the image. Safe to call twice; the second call is a no-op.
    fn close(&mut self) {
        self.image.take();
    }

    pub(crate) fn begin_call(&mut self) {
        self.active_calls += 1;
    }

    pub(crate) fn end_call(&mut self) {
        self.active_calls -= 1;
    }
}

/// Process-wide table of loaded libraries.
pub struct LibraryRegistry {
    loader: Box<dyn ImageLoader>,
    records: IndexMap<PathBuf, LibraryRecord>,
}

impl LibraryRegistry {
    /// Registry backed by the OS loader.
    pub fn new() -> Self {
        Self::with_loader(Box::new(DlopenLoader))
    }

    /// Registry with an explicit image-loading backend.
    pub fn with_loader(loader: Box<dyn ImageLoader>) -> Self {
        Self {
            loader,
            records: IndexMap::new(),
        }
    }

    /// Normalize a path into the registry's identity form.
    ///
    /// Relative paths resolve against the working directory. When the file
    /// no longer exists (deleted after loading), canonicalization falls back
    /// to lexical normalization so the record can still be addressed by the
    /// same path string.
    pub fn canonical(path: &Path) -> PathBuf {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        };
        std::fs::canonicalize(&absolute).unwrap_or_else(|_| lexical_normalize(&absolute))
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.records.contains_key(&Self::canonical(path))
    }

    pub fn record(&self, path: &Path) -> Option<&LibraryRecord> {
        self.records.get(&Self::canonical(path))
    }

    /// Load a library and publish its exports as script globals.
    ///
    /// Re-entrant: loading an already-loaded path is a cheap success that
    /// returns the existing export list without reopening the image or
    /// touching the globals. A failure at any step leaves the registry and
    /// the globals exactly as they were.
    pub fn load(&mut self, path: &Path, globals: &mut Globals) -> Result<Vec<String>, BridgeError> {
        let canonical = Self::canonical(path);

        if let Some(record) = self.records.get(&canonical) {
            tracing::debug!("Library already loaded: {}", canonical.display());
            return Ok(record.export_names());
        }

        let image = self.loader.open(&canonical)?;
        tracing::debug!("Resolving exports of {}", image.path().display());
        let manifest = image.manifest()?;
        let exports = resolve_bindings(image.as_ref(), &manifest, 1)?;

        // Collision policy: never overwrite a global the registry does not
        // own. Checked for every export before anything is installed, so a
        // failed load has no partial effect.
        for name in exports.keys() {
            if globals.contains(name) {
                return Err(BridgeError::NameCollision {
                    name: name.clone(),
                    path: canonical.clone(),
                });
            }
        }

        let names = exports.keys().cloned().collect::<Vec<_>>();
        for name in &names {
            globals.define_native(
                name.clone(),
                NativeCallable {
                    library: canonical.clone(),
                    symbol: name.clone(),
                },
            );
        }

        tracing::info!(
            "Loaded library {} ({} exports)",
            canonical.display(),
            names.len()
        );

        self.records.insert(
            canonical.clone(),
            LibraryRecord {
                canonical_path: canonical,
                image: Some(image),
                exports,
                version: 1,
                loaded_at: SystemTime::now(),
                active_calls: 0,
            },
        );

        Ok(names)
    }

    /// Unload a library, withdrawing every global it owns.
    ///
    /// Bindings under the record become permanently stale; a callable the
    /// script still holds fails with `StaleBinding` instead of reaching
    /// unmapped memory.
    pub fn unload(&mut self, path: &Path, globals: &mut Globals) -> Result<(), BridgeError> {
        let canonical = Self::canonical(path);

        match self.records.get(&canonical) {
            None => {
                return Err(BridgeError::NotLoaded { path: canonical });
            }
            Some(record) if record.active_calls > 0 => {
                return Err(BridgeError::LibraryInUse { path: canonical });
            }
            Some(_) => {}
        }

        let Some(mut record) = self.records.shift_remove(&canonical) else {
            return Err(BridgeError::NotLoaded { path: canonical });
        };

        for name in record.export_names() {
            if globals.is_owned_by(&name, &canonical) {
                globals.remove(&name);
            }
        }

        record.close();
        tracing::info!("Unloaded library {}", canonical.display());
        Ok(())
    }

    /// Replace a loaded library with the current on-disk image.
    ///
    /// The replacement is opened and fully resolved before the live record
    /// is touched; if the new image fails to load or resolve, the previous
    /// working bindings stay intact. On success the record's version
    /// increments, exports that disappeared are withdrawn from the globals,
    /// new exports are published, and surviving names keep serving the
    /// same script-side callables.
    pub fn reload(
        &mut self,
        path: &Path,
        globals: &mut Globals,
    ) -> Result<Vec<String>, BridgeError> {
        let canonical = Self::canonical(path);

        let (version, old_names) = match self.records.get(&canonical) {
            None => {
                return Err(BridgeError::NotLoaded { path: canonical });
            }
            Some(record) if record.active_calls > 0 => {
                return Err(BridgeError::LibraryInUse { path: canonical });
            }
            Some(record) => (record.version, record.export_names()),
        };
        let next_version = version + 1;

        let image = self.loader.open(&canonical)?;
        let manifest = image.manifest()?;
        let exports = resolve_bindings(image.as_ref(), &manifest, next_version)?;

        // Newly appearing names obey the same collision policy as `load`.
        for name in exports.keys() {
            if !old_names.iter().any(|n| n == name) && globals.contains(name) {
                return Err(BridgeError::NameCollision {
                    name: name.clone(),
                    path: canonical.clone(),
                });
            }
        }

        let Some(record) = self.records.get_mut(&canonical) else {
            return Err(BridgeError::NotLoaded { path: canonical });
        };

        let removed: Vec<String> = old_names
            .iter()
            .filter(|n| !exports.contains_key(n.as_str()))
            .cloned()
            .collect();
        let added: Vec<String> = exports
            .keys()
            .filter(|n| !old_names.iter().any(|o| o == *n))
            .cloned()
            .collect();

        record.close();
        record.image = Some(image);
        record.exports = exports;
        record.version = next_version;
        let names = record.export_names();

        for name in &removed {
            if globals.is_owned_by(name, &canonical) {
                globals.remove(name);
            }
        }
        for name in &added {
            globals.define_native(
                name.clone(),
                NativeCallable {
                    library: canonical.clone(),
                    symbol: name.clone(),
                },
            );
        }

        tracing::info!(
            "Reloaded library {} (version {}, {} exports)",
            canonical.display(),
            next_version,
            names.len()
        );

        Ok(names)
    }

    /// Snapshot of loaded canonical paths, stable across repeated calls
    /// with no intervening load/unload.
    pub fn list(&self) -> Vec<&Path> {
        self.records.keys().map(PathBuf::as_path).collect()
    }

    pub fn records(&self) -> impl Iterator<Item = &LibraryRecord> {
        self.records.values()
    }

    #[cfg(test)]
    pub(crate) fn record_mut(&mut self, path: &Path) -> Option<&mut LibraryRecord> {
        self.records.get_mut(&Self::canonical(path))
    }

    /// Route a script-side callable into its native entry point.
    pub fn invoke(
        &mut self,
        callable: &NativeCallable,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, BridgeError> {
        let Some(record) = self.records.get_mut(&callable.library) else {
            return Err(BridgeError::StaleBinding {
                name: callable.symbol.clone(),
                reason: format!(
                    "library '{}' is no longer loaded",
                    callable.library.display()
                ),
            });
        };

        let version = record.version;
        let binding = match record.exports.get(&callable.symbol) {
            Some(binding) => binding.clone(),
            None => {
                return Err(BridgeError::StaleBinding {
                    name: callable.symbol.clone(),
                    reason: format!(
                        "export no longer present in '{}' after reload",
                        callable.library.display()
                    ),
                });
            }
        };

        record.begin_call();
        let result = call::invoke(&binding, version, args);
        record.end_call();
        result
    }
}

impl Default for LibraryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve every manifest-declared export to a binding.
fn resolve_bindings(
    image: &dyn LibraryImage,
    manifest: &ExportManifest,
    version: u64,
) -> Result<IndexMap<String, NativeBinding>, BridgeError> {
    let mut exports = IndexMap::new();
    for decl in &manifest.exports {
        let entry = image.entry(&decl.name)?;
        exports.insert(
            decl.name.clone(),
            NativeBinding {
                symbol: decl.name.clone(),
                signature: decl.signature(),
                entry,
                owner_version: version,
                description: decl.description.clone(),
            },
        );
    }
    Ok(exports)
}

/// Normalize `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
