//! Native type tags and export signatures.
//!
//! The script side of the bridge is dynamically typed while native entry
//! points are not, so every script-callable export carries an explicit
//! signature built from a small closed set of tagged kinds. Signatures are
//! declared in the library's export manifest; they are never inferred from
//! the OS symbol table, which carries no type information.

use std::ffi::CString;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of parameters the call dispatcher supports.
pub const MAX_ARITY: usize = 6;

/// Well-known symbol every script-callable library must export.
///
/// The symbol is an `extern "C" fn() -> *const c_char` returning a
/// NUL-terminated JSON export manifest (see [`crate::bridge::manifest`]).
pub const MANIFEST_SYMBOL: &str = "dll_exports";

/// Type tags for native parameters and return values.
///
/// Integer and boolean values travel widened in 64-bit slots, `f64` values
/// travel bit-cast, and `cstr` parameters are passed as borrowed
/// NUL-terminated pointers. `void` is only meaningful as a return type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeType {
    /// Boolean, passed as 0 or 1
    Bool,
    /// 32-bit signed integer
    I32,
    /// 32-bit unsigned integer
    U32,
    /// 64-bit signed integer
    I64,
    /// 64-bit unsigned integer
    U64,
    /// 64-bit floating point, bit-cast into the slot
    F64,
    /// Borrowed NUL-terminated string (`const char*`)
    CStr,
    /// No value (return type only)
    Void,
}

impl NativeType {
    /// Check if this tag names an integer kind.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            NativeType::I32 | NativeType::U32 | NativeType::I64 | NativeType::U64
        )
    }

    /// Check if this tag is usable as a parameter type.
    pub fn is_param(&self) -> bool {
        !matches!(self, NativeType::Void)
    }
}

impl fmt::Display for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeType::Bool => write!(f, "bool"),
            NativeType::I32 => write!(f, "i32"),
            NativeType::U32 => write!(f, "u32"),
            NativeType::I64 => write!(f, "i64"),
            NativeType::U64 => write!(f, "u64"),
            NativeType::F64 => write!(f, "f64"),
            NativeType::CStr => write!(f, "cstr"),
            NativeType::Void => write!(f, "void"),
        }
    }
}

/// A converted argument, alive for the duration of one native call.
///
/// Owning the `CString` here is what keeps string pointers valid across the
/// call; the bridge drops the arguments as soon as the call returns.
#[derive(Debug, Clone)]
pub enum NativeValue {
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    CStr(CString),
}

impl NativeValue {
    /// Render this value into its 64-bit call slot.
    pub fn to_slot(&self) -> u64 {
        match self {
            NativeValue::Bool(b) => u64::from(*b),
            NativeValue::I64(v) => *v as u64,
            NativeValue::U64(v) => *v,
            NativeValue::F64(v) => v.to_bits(),
            NativeValue::CStr(s) => s.as_ptr() as u64,
        }
    }
}

/// Call signature of one script-callable export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    /// Exported symbol name
    pub name: String,
    /// Parameter types
    pub params: Vec<NativeType>,
    /// Return type
    pub returns: NativeType,
}

impl Signature {
    pub fn new(name: impl Into<String>, params: Vec<NativeType>, returns: NativeType) -> Self {
        Self {
            name: name.into(),
            params,
            returns,
        }
    }

    /// Number of parameters the export expects.
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}(", self.returns, self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")
    }
}
