//! Native library handle
//!
//! Maps one shared-library image into the process and resolves its exports.
//! The OS loader is reached through the [`ImageLoader`] seam so the registry
//! can be driven by an in-process fake in tests; [`DlopenLoader`] is the real
//! backend on top of `libloading`.

use std::ffi::{c_char, CStr, CString};
use std::path::{Path, PathBuf};

use libloading::{Library, Symbol};

use super::manifest::ExportManifest;
use super::types::MANIFEST_SYMBOL;
use super::BridgeError;

/// One mapped library image.
///
/// Dropping the image unmaps it; the registry guarantees no call is in
/// flight when that happens.
pub trait LibraryImage: std::fmt::Debug {
    /// Path the image was opened from.
    fn path(&self) -> &Path;

    /// Resolve an exported symbol to its raw entry address.
    ///
    /// The address is only valid while this image stays mapped.
    fn entry(&self, symbol: &str) -> Result<usize, BridgeError>;

    /// Read and parse the library's export manifest.
    fn manifest(&self) -> Result<ExportManifest, BridgeError>;
}

/// Backend that maps library images.
pub trait ImageLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryImage>, BridgeError>;
}

/// `libloading`-backed loader.
pub struct DlopenLoader;

impl ImageLoader for DlopenLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryImage>, BridgeError> {
        // Safety: loading a library runs arbitrary initializer code. The
        // console trusts the paths the user asks it to load.
        let library = unsafe {
            Library::new(path).map_err(|e| BridgeError::LoadFailure {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        Ok(Box::new(DlopenImage {
            path: path.to_path_buf(),
            library,
        }))
    }
}

#[derive(Debug)]
struct DlopenImage {
    path: PathBuf,
    library: Library,
}

impl LibraryImage for DlopenImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry(&self, symbol: &str) -> Result<usize, BridgeError> {
        let c_name = CString::new(symbol).map_err(|_| BridgeError::SymbolResolution {
            path: self.path.clone(),
            reason: format!("invalid symbol name '{symbol}'"),
        })?;

        // Safety: the symbol may be absent or of the wrong shape; absence is
        // reported here and the shape is pinned by the manifest signature at
        // the call site.
        let symbol: Symbol<*const ()> = unsafe {
            self.library
                .get(c_name.as_bytes_with_nul())
                .map_err(|e| BridgeError::SymbolResolution {
                    path: self.path.clone(),
                    reason: format!("symbol '{symbol}' not found: {e}"),
                })?
        };

        Ok(*symbol as usize)
    }

    fn manifest(&self) -> Result<ExportManifest, BridgeError> {
        type ManifestFn = extern "C" fn() -> *const c_char;

        let addr = self.entry(MANIFEST_SYMBOL).map_err(|_| {
            BridgeError::SymbolResolution {
                path: self.path.clone(),
                reason: format!(
                    "library does not export '{MANIFEST_SYMBOL}'; not a script-callable library"
                ),
            }
        })?;

        // Safety: the manifest symbol is required by convention to be a
        // zero-argument function returning a NUL-terminated string with
        // static lifetime.
        let manifest_fn: ManifestFn = unsafe { std::mem::transmute(addr) };
        let ptr = manifest_fn();
        if ptr.is_null() {
            return Err(BridgeError::SymbolResolution {
                path: self.path.clone(),
                reason: format!("'{MANIFEST_SYMBOL}' returned a null manifest"),
            });
        }

        let json = unsafe { CStr::from_ptr(ptr) }.to_str().map_err(|_| {
            BridgeError::SymbolResolution {
                path: self.path.clone(),
                reason: "manifest is not valid UTF-8".to_string(),
            }
        })?;

        ExportManifest::from_json(json).map_err(|e| BridgeError::SymbolResolution {
            path: self.path.clone(),
            reason: e.to_string(),
        })
    }
}

/// Resolve a library specifier to a file path.
///
/// A specifier that names an existing file (absolute or relative to the
/// working directory) wins; otherwise the platform library file name is
/// searched in `search_paths`, then in the platform default locations.
pub fn find_library(spec: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let direct = Path::new(spec);
    if direct.exists() {
        return Some(direct.to_path_buf());
    }

    let file_name = library_filename(spec);
    for dir in search_paths.iter().cloned().chain(default_search_paths()) {
        let candidate = dir.join(&file_name);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    None
}

/// Default library search locations for this platform.
pub fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        if let Ok(ld_path) = std::env::var("LD_LIBRARY_PATH") {
            for p in ld_path.split(':').filter(|p| !p.is_empty()) {
                paths.push(PathBuf::from(p));
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Ok(dyld_path) = std::env::var("DYLD_LIBRARY_PATH") {
            for p in dyld_path.split(':').filter(|p| !p.is_empty()) {
                paths.push(PathBuf::from(p));
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Ok(path) = std::env::var("PATH") {
            for p in path.split(';').filter(|p| !p.is_empty()) {
                paths.push(PathBuf::from(p));
            }
        }
    }

    paths
}

/// Construct the platform-specific library file name for a bare name.
pub fn library_filename(name: &str) -> String {
    #[cfg(target_os = "linux")]
    {
        if name.starts_with("lib") && name.ends_with(".so") {
            name.to_string()
        } else {
            format!("lib{name}.so")
        }
    }

    #[cfg(target_os = "macos")]
    {
        if name.starts_with("lib") && name.ends_with(".dylib") {
            name.to_string()
        } else {
            format!("lib{name}.dylib")
        }
    }

    #[cfg(target_os = "windows")]
    {
        if name.ends_with(".dll") {
            name.to_string()
        } else {
            format!("{name}.dll")
        }
    }

    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        name.to_string()
    }
}
