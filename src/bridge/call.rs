//! Call bridge
//!
//! Invokes a native binding with script-supplied arguments and returns a
//! script value. The calling convention is deliberately narrow: every
//! parameter and the return value travel in 64-bit integer slots. Integers
//! and booleans are widened, `f64` values are bit-cast, and strings are
//! passed as borrowed NUL-terminated pointers that stay alive exactly for
//! the duration of the call. Script-callable exports therefore declare
//! 64-bit-compatible parameters.
//!
//! The bridge validates arity, kinds, and numeric domains before the call;
//! a fault inside native code that corrupts memory is outside what this
//! boundary can intercept.

use super::registry::NativeBinding;
use super::types::{NativeType, NativeValue, Signature, MAX_ARITY};
use super::BridgeError;
use crate::script::ScriptValue;

/// Invoke a binding after re-validating it against its owner's current
/// version.
///
/// `record_version` is the owning record's version at call time; a binding
/// from before a reload no longer matches and must not be dereferenced.
pub fn invoke(
    binding: &NativeBinding,
    record_version: u64,
    args: &[ScriptValue],
) -> Result<ScriptValue, BridgeError> {
    if binding.owner_version != record_version {
        return Err(BridgeError::StaleBinding {
            name: binding.signature.name.clone(),
            reason: format!(
                "binding was created for library version {} but the library is now at version {}",
                binding.owner_version, record_version
            ),
        });
    }

    let converted = convert_args(&binding.signature, args)?;
    let slots: Vec<u64> = converted.iter().map(NativeValue::to_slot).collect();

    // Safety: the entry address came from the currently mapped image (the
    // version check above rules out an unloaded or remapped one) and the
    // slot count matches the manifest-declared arity.
    let raw = unsafe { call_slots(binding.entry, &slots)? };

    // `converted` owns any CStrings backing pointer slots; it must outlive
    // the call, which the explicit drop below pins down.
    drop(converted);

    Ok(slot_to_script(binding.signature.returns, raw))
}

/// Validate arity and convert each argument to its declared native kind.
pub fn convert_args(
    signature: &Signature,
    args: &[ScriptValue],
) -> Result<Vec<NativeValue>, BridgeError> {
    if args.len() != signature.arity() {
        return Err(BridgeError::ArgumentTypeMismatch {
            function: signature.name.clone(),
            reason: format!(
                "expected {} argument(s), got {}",
                signature.arity(),
                args.len()
            ),
        });
    }

    signature
        .params
        .iter()
        .zip(args)
        .enumerate()
        .map(|(i, (ty, value))| convert_arg(&signature.name, i, *ty, value))
        .collect()
}

fn convert_arg(
    function: &str,
    index: usize,
    ty: NativeType,
    value: &ScriptValue,
) -> Result<NativeValue, BridgeError> {
    let mismatch = |reason: String| BridgeError::ArgumentTypeMismatch {
        function: function.to_string(),
        reason,
    };

    match ty {
        NativeType::Bool => match value {
            ScriptValue::Bool(b) => Ok(NativeValue::Bool(*b)),
            other => Err(mismatch(format!(
                "argument {}: expected bool, got {}",
                index + 1,
                other.type_name()
            ))),
        },
        NativeType::F64 => match value {
            ScriptValue::Number(n) if n.is_finite() => Ok(NativeValue::F64(*n)),
            ScriptValue::Number(_) => Err(mismatch(format!(
                "argument {}: non-finite number is not a valid f64",
                index + 1
            ))),
            other => Err(mismatch(format!(
                "argument {}: expected f64, got {}",
                index + 1,
                other.type_name()
            ))),
        },
        NativeType::I32 | NativeType::U32 | NativeType::I64 | NativeType::U64 => {
            let n = match value {
                ScriptValue::Number(n) => *n,
                other => {
                    return Err(mismatch(format!(
                        "argument {}: expected {}, got {}",
                        index + 1,
                        ty,
                        other.type_name()
                    )))
                }
            };
            if !n.is_finite() {
                return Err(mismatch(format!(
                    "argument {}: non-finite number is not a valid {}",
                    index + 1,
                    ty
                )));
            }
            // Numbers truncate toward zero; values outside the declared
            // width are an error, never clamped.
            let t = n.trunc();
            let out_of_range = || {
                mismatch(format!(
                    "argument {}: value {} out of range for {}",
                    index + 1,
                    n,
                    ty
                ))
            };
            match ty {
                NativeType::I32 => {
                    if t < f64::from(i32::MIN) || t > f64::from(i32::MAX) {
                        return Err(out_of_range());
                    }
                    Ok(NativeValue::I64(t as i64))
                }
                NativeType::U32 => {
                    if t < 0.0 || t > f64::from(u32::MAX) {
                        return Err(out_of_range());
                    }
                    Ok(NativeValue::U64(t as u64))
                }
                NativeType::I64 => {
                    // i64::MAX as f64 rounds up to 2^63, which is already
                    // out of range, hence the closed upper bound.
                    if t < i64::MIN as f64 || t >= i64::MAX as f64 {
                        return Err(out_of_range());
                    }
                    Ok(NativeValue::I64(t as i64))
                }
                NativeType::U64 => {
                    // u64::MAX as f64 rounds up to 2^64; same closed bound.
                    if t < 0.0 || t >= u64::MAX as f64 {
                        return Err(out_of_range());
                    }
                    Ok(NativeValue::U64(t as u64))
                }
                _ => unreachable!(),
            }
        }
        NativeType::CStr => match value {
            ScriptValue::String(s) => std::ffi::CString::new(s.as_str())
                .map(NativeValue::CStr)
                .map_err(|_| {
                    mismatch(format!(
                        "argument {}: string contains an interior NUL byte",
                        index + 1
                    ))
                }),
            other => Err(mismatch(format!(
                "argument {}: expected cstr, got {}",
                index + 1,
                other.type_name()
            ))),
        },
        NativeType::Void => Err(mismatch(format!(
            "argument {}: void is not a parameter type",
            index + 1
        ))),
    }
}

/// Dispatch a call through the platform C calling convention.
///
/// Rust FFI needs the parameter count at compile time, hence one arm per
/// supported arity.
///
/// # Safety
///
/// `entry` must be the address of an `extern "C"` function inside a
/// currently mapped image taking `slots.len()` 64-bit slots.
unsafe fn call_slots(entry: usize, slots: &[u64]) -> Result<u64, BridgeError> {
    type F0 = extern "C" fn() -> u64;
    type F1 = extern "C" fn(u64) -> u64;
    type F2 = extern "C" fn(u64, u64) -> u64;
    type F3 = extern "C" fn(u64, u64, u64) -> u64;
    type F4 = extern "C" fn(u64, u64, u64, u64) -> u64;
    type F5 = extern "C" fn(u64, u64, u64, u64, u64) -> u64;
    type F6 = extern "C" fn(u64, u64, u64, u64, u64, u64) -> u64;

    let s = slots;
    let raw = match s.len() {
        0 => std::mem::transmute::<usize, F0>(entry)(),
        1 => std::mem::transmute::<usize, F1>(entry)(s[0]),
        2 => std::mem::transmute::<usize, F2>(entry)(s[0], s[1]),
        3 => std::mem::transmute::<usize, F3>(entry)(s[0], s[1], s[2]),
        4 => std::mem::transmute::<usize, F4>(entry)(s[0], s[1], s[2], s[3]),
        5 => std::mem::transmute::<usize, F5>(entry)(s[0], s[1], s[2], s[3], s[4]),
        6 => std::mem::transmute::<usize, F6>(entry)(s[0], s[1], s[2], s[3], s[4], s[5]),
        n => {
            // Manifest validation caps arity; this arm is unreachable
            // through the registry.
            return Err(BridgeError::ArgumentTypeMismatch {
                function: String::new(),
                reason: format!("{n} arguments exceed the supported maximum of {MAX_ARITY}"),
            });
        }
    };
    Ok(raw)
}

/// Convert a raw return slot back into a script value.
fn slot_to_script(returns: NativeType, raw: u64) -> ScriptValue {
    match returns {
        NativeType::Void => ScriptValue::Undefined,
        NativeType::Bool => ScriptValue::Bool(raw != 0),
        NativeType::I32 => ScriptValue::Number(f64::from(raw as u32 as i32)),
        NativeType::U32 => ScriptValue::Number(f64::from(raw as u32)),
        NativeType::I64 => ScriptValue::Number(raw as i64 as f64),
        NativeType::U64 => ScriptValue::Number(raw as f64),
        NativeType::F64 => ScriptValue::Number(f64::from_bits(raw)),
        NativeType::CStr => {
            let ptr = raw as *const std::ffi::c_char;
            if ptr.is_null() {
                ScriptValue::Undefined
            } else {
                // Copied immediately; the convention requires the native
                // side to return a pointer that outlives the call.
                let s = unsafe { std::ffi::CStr::from_ptr(ptr) };
                ScriptValue::String(s.to_string_lossy().into_owned())
            }
        }
    }
}
