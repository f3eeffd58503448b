//! In-process fakes for driving the registry without the OS loader.
//!
//! The fake images hand out addresses of real `extern "C"` functions, so
//! the genuine slot-dispatch path in the call bridge runs in unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::loader::{ImageLoader, LibraryImage};
use super::manifest::ExportManifest;
use super::BridgeError;

/// One library the fake loader can open.
#[derive(Clone, Debug)]
pub(crate) struct FakeLib {
    pub manifest_json: String,
    pub symbols: HashMap<String, usize>,
}

/// Shared state tests mutate to model rebuilds and broken images.
#[derive(Default)]
pub(crate) struct FakeState {
    pub libs: HashMap<PathBuf, FakeLib>,
    pub open_count: usize,
    pub fail_next_open: bool,
}

pub(crate) struct FakeLoader {
    state: Rc<RefCell<FakeState>>,
}

impl FakeLoader {
    pub fn new() -> (Self, Rc<RefCell<FakeState>>) {
        let state = Rc::new(RefCell::new(FakeState::default()));
        (
            Self {
                state: Rc::clone(&state),
            },
            state,
        )
    }
}

impl ImageLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LibraryImage>, BridgeError> {
        let mut state = self.state.borrow_mut();
        state.open_count += 1;

        if state.fail_next_open {
            state.fail_next_open = false;
            return Err(BridgeError::LoadFailure {
                path: path.to_path_buf(),
                reason: "image is corrupt".to_string(),
            });
        }

        let lib = state
            .libs
            .get(path)
            .ok_or_else(|| BridgeError::LoadFailure {
                path: path.to_path_buf(),
                reason: "no such file".to_string(),
            })?
            .clone();

        Ok(Box::new(FakeImage {
            path: path.to_path_buf(),
            lib,
        }))
    }
}

#[derive(Debug)]
struct FakeImage {
    path: PathBuf,
    lib: FakeLib,
}

impl LibraryImage for FakeImage {
    fn path(&self) -> &Path {
        &self.path
    }

    fn entry(&self, symbol: &str) -> Result<usize, BridgeError> {
        self.lib
            .symbols
            .get(symbol)
            .copied()
            .ok_or_else(|| BridgeError::SymbolResolution {
                path: self.path.clone(),
                reason: format!("symbol '{symbol}' not found"),
            })
    }

    fn manifest(&self) -> Result<ExportManifest, BridgeError> {
        ExportManifest::from_json(&self.lib.manifest_json).map_err(|e| {
            BridgeError::SymbolResolution {
                path: self.path.clone(),
                reason: e.to_string(),
            }
        })
    }
}

// Entry points the fakes expose. All follow the bridge's 64-bit slot
// convention.

pub(crate) extern "C" fn sum_first_fib(n: u64) -> u64 {
    let mut a = 0i64;
    let mut b = 1i64;
    let mut sum = 0i64;
    for _ in 0..n {
        sum += a;
        let next = a + b;
        a = b;
        b = next;
    }
    sum as u64
}

pub(crate) extern "C" fn nth_fib(n: u64) -> u64 {
    let mut a = 0u64;
    let mut b = 1u64;
    for _ in 0..n {
        let next = a.wrapping_add(b);
        a = b;
        b = next;
    }
    a
}

pub(crate) extern "C" fn add(a: u64, b: u64) -> u64 {
    a.wrapping_add(b)
}

pub(crate) extern "C" fn is_even(n: u64) -> u64 {
    u64::from(n % 2 == 0)
}

pub(crate) extern "C" fn half(bits: u64) -> u64 {
    (f64::from_bits(bits) / 2.0).to_bits()
}

pub(crate) extern "C" fn str_len(ptr: u64) -> u64 {
    // Safety: the bridge passes a NUL-terminated pointer that stays alive
    // for the duration of the call.
    let s = unsafe { CStr::from_ptr(ptr as *const c_char) };
    s.to_bytes().len() as u64
}

pub(crate) extern "C" fn greeting() -> u64 {
    b"hello from native\0".as_ptr() as u64
}

pub(crate) fn fib_manifest_json() -> String {
    r#"{
        "manifest_version": 1,
        "library": "fib",
        "exports": [
            { "name": "fib", "params": ["u32"], "returns": "i64",
              "description": "Sum of the first n Fibonacci numbers" },
            { "name": "fib_at", "params": ["u32"], "returns": "i64",
              "description": "The n-th Fibonacci number" }
        ]
    }"#
    .to_string()
}

pub(crate) fn fib_lib() -> FakeLib {
    let mut symbols = HashMap::new();
    symbols.insert("fib".to_string(), sum_first_fib as usize);
    symbols.insert("fib_at".to_string(), nth_fib as usize);
    FakeLib {
        manifest_json: fib_manifest_json(),
        symbols,
    }
}
