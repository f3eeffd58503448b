//! Export manifest (`dll_exports`)
//!
//! A script-callable library declares which of its symbols the console may
//! bind, and with what signatures, by exporting a well-known symbol named
//! [`MANIFEST_SYMBOL`](crate::bridge::MANIFEST_SYMBOL):
//!
//! ```c
//! const char* dll_exports(void);
//! ```
//!
//! The returned NUL-terminated JSON document looks like:
//!
//! ```json
//! {
//!   "manifest_version": 1,
//!   "library": "fib",
//!   "exports": [
//!     { "name": "fib", "params": ["u32"], "returns": "i64",
//!       "description": "Sum of the first n Fibonacci numbers" }
//!   ]
//! }
//! ```
//!
//! The manifest is required because the OS symbol table carries no type
//! information: without a declared signature the bridge cannot marshal
//! dynamically typed script arguments into a native call.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::types::{NativeType, Signature, MAX_ARITY};

/// Manifest errors, wrapped into `SymbolResolutionFailure` by the registry.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse manifest: {0}")]
    Parse(String),

    #[error("invalid manifest: {0}")]
    Invalid(String),
}

/// Parsed export manifest of one library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    /// Manifest format version; currently always 1
    #[serde(default = "default_version")]
    pub manifest_version: u32,

    /// Short library name, informational only
    #[serde(default)]
    pub library: String,

    /// Script-callable exports
    #[serde(default)]
    pub exports: Vec<ExportDecl>,
}

fn default_version() -> u32 {
    1
}

/// One declared export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDecl {
    /// Exported symbol name; also the script global the binding is published
    /// under
    pub name: String,

    /// Parameter types
    #[serde(default)]
    pub params: Vec<NativeType>,

    /// Return type
    #[serde(default = "default_returns")]
    pub returns: NativeType,

    /// Brief description, shown by the console's help output
    #[serde(default)]
    pub description: String,
}

fn default_returns() -> NativeType {
    NativeType::Void
}

impl ExportDecl {
    /// Build the call signature declared by this export.
    pub fn signature(&self) -> Signature {
        Signature::new(self.name.clone(), self.params.clone(), self.returns)
    }
}

impl ExportManifest {
    /// Parse and validate a manifest from its JSON text.
    pub fn from_json(json: &str) -> Result<Self, ManifestError> {
        let manifest: ExportManifest =
            serde_json::from_str(json).map_err(|e| ManifestError::Parse(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize to JSON text.
    pub fn to_json(&self) -> Result<String, ManifestError> {
        serde_json::to_string_pretty(self).map_err(|e| ManifestError::Parse(e.to_string()))
    }

    /// Validate the declarations against what the bridge can bind.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != 1 {
            return Err(ManifestError::Invalid(format!(
                "unsupported manifest version {}",
                self.manifest_version
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for decl in &self.exports {
            if !is_identifier(&decl.name) {
                return Err(ManifestError::Invalid(format!(
                    "export name '{}' is not a valid script identifier",
                    decl.name
                )));
            }
            if !seen.insert(decl.name.as_str()) {
                return Err(ManifestError::Invalid(format!(
                    "duplicate export name '{}'",
                    decl.name
                )));
            }
            if decl.params.len() > MAX_ARITY {
                return Err(ManifestError::Invalid(format!(
                    "export '{}' declares {} parameters (max {})",
                    decl.name,
                    decl.params.len(),
                    MAX_ARITY
                )));
            }
            if let Some(bad) = decl.params.iter().find(|t| !t.is_param()) {
                return Err(ManifestError::Invalid(format!(
                    "export '{}' declares '{}' as a parameter type",
                    decl.name, bad
                )));
            }
        }
        Ok(())
    }
}

/// Check that a name is usable as a script global.
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
