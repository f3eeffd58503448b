//! Extension API surface
//!
//! The four script-visible operations (`loadDll`, `unloadDll`, `reloadDll`,
//! `listDlls`) plus call dispatch, implemented purely in terms of the
//! library registry. The embedding engine maps each [`BridgeError`] to a
//! script-catchable thrown value; [`BridgeError::kind`] is the stable tag
//! scripts can inspect.
//!
//! One host owns one registry and one globals table, so independent script
//! environments can each own a host without sharing ambient state.

use std::path::PathBuf;

use crate::bridge::loader::find_library;
use crate::bridge::{BridgeError, ImageLoader, LibraryRegistry};
use crate::script::{Global, Globals, NativeCallable, ScriptValue};

/// The bridge surface one script environment embeds.
pub struct ExtensionHost {
    registry: LibraryRegistry,
    globals: Globals,
    search_paths: Vec<PathBuf>,
}

impl ExtensionHost {
    /// Host backed by the OS loader.
    pub fn new() -> Self {
        Self::with_registry(LibraryRegistry::new())
    }

    /// Host with an explicit image-loading backend.
    pub fn with_loader(loader: Box<dyn ImageLoader>) -> Self {
        Self::with_registry(LibraryRegistry::with_loader(loader))
    }

    fn with_registry(registry: LibraryRegistry) -> Self {
        Self {
            registry,
            globals: Globals::new(),
            search_paths: Vec::new(),
        }
    }

    /// Add a directory searched when a bare library name is loaded.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    pub fn globals(&self) -> &Globals {
        &self.globals
    }

    /// The embedding engine defines its own globals through this.
    pub fn globals_mut(&mut self) -> &mut Globals {
        &mut self.globals
    }

    pub fn registry(&self) -> &LibraryRegistry {
        &self.registry
    }

    /// `loadDll(path)`: returns the list of newly callable function names.
    pub fn load_dll(&mut self, spec: &str) -> Result<ScriptValue, BridgeError> {
        let path = self.resolve(spec);
        let names = self.registry.load(&path, &mut self.globals)?;
        Ok(names_value(names))
    }

    /// `unloadDll(path)`.
    pub fn unload_dll(&mut self, spec: &str) -> Result<ScriptValue, BridgeError> {
        let path = self.resolve(spec);
        self.registry.unload(&path, &mut self.globals)?;
        Ok(ScriptValue::Undefined)
    }

    /// `reloadDll(path)`: returns the export names after the reload.
    pub fn reload_dll(&mut self, spec: &str) -> Result<ScriptValue, BridgeError> {
        let path = self.resolve(spec);
        let names = self.registry.reload(&path, &mut self.globals)?;
        Ok(names_value(names))
    }

    /// `listDlls()`: canonical paths of the currently loaded libraries.
    pub fn list_dlls(&self) -> ScriptValue {
        ScriptValue::array(
            self.registry
                .list()
                .into_iter()
                .map(|p| ScriptValue::string(p.display().to_string()))
                .collect(),
        )
    }

    /// Call a global by name, the way a script call site resolves it.
    pub fn call(&mut self, name: &str, args: &[ScriptValue]) -> Result<ScriptValue, BridgeError> {
        match self.globals.get(name) {
            Some(Global::Native(callable)) => {
                let callable = callable.clone();
                self.registry.invoke(&callable, args)
            }
            Some(Global::Value(_)) => Err(BridgeError::UnknownFunction {
                name: format!("{name} (bound, but not a native function)"),
            }),
            None => Err(BridgeError::UnknownFunction {
                name: name.to_string(),
            }),
        }
    }

    /// Call through a callable reference the script captured earlier.
    ///
    /// This is the path that turns a reference outliving `unloadDll` into
    /// `StaleBinding` instead of a wild call.
    pub fn call_native(
        &mut self,
        callable: &NativeCallable,
        args: &[ScriptValue],
    ) -> Result<ScriptValue, BridgeError> {
        self.registry.invoke(callable, args)
    }

    /// Resolve a user-supplied specifier: explicit paths win, bare names go
    /// through the configured search paths. Resolution failures fall through
    /// to the loader so they surface as `LoadFailure`/`NotLoaded` with the
    /// path the user typed.
    fn resolve(&self, spec: &str) -> PathBuf {
        find_library(spec, &self.search_paths).unwrap_or_else(|| PathBuf::from(spec))
    }
}

impl Default for ExtensionHost {
    fn default() -> Self {
        Self::new()
    }
}

fn names_value(names: Vec<String>) -> ScriptValue {
    ScriptValue::array(names.into_iter().map(ScriptValue::string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::testutil::{self, FakeLoader};
    use crate::bridge::LibraryRegistry;

    fn fake_host() -> (ExtensionHost, String) {
        let (loader, state) = FakeLoader::new();
        let path = LibraryRegistry::canonical(std::path::Path::new("/fake/libfib.so"));
        state
            .borrow_mut()
            .libs
            .insert(path.clone(), testutil::fib_lib());
        (
            ExtensionHost::with_loader(Box::new(loader)),
            path.display().to_string(),
        )
    }

    #[test]
    fn load_call_unload_flow() {
        let (mut host, path) = fake_host();

        let names = host.load_dll(&path).unwrap();
        assert_eq!(names.to_string(), "[fib, fib_at]");

        let listed = host.list_dlls();
        assert_eq!(listed.to_string(), format!("[{path}]"));

        let sum = host.call("fib", &[ScriptValue::Number(10.0)]).unwrap();
        assert_eq!(sum, ScriptValue::Number(88.0));

        host.unload_dll(&path).unwrap();
        assert_eq!(host.list_dlls().to_string(), "[]");

        let err = host.call("fib", &[ScriptValue::Number(10.0)]).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownFunction { .. }));
    }

    #[test]
    fn held_reference_goes_stale_after_unload() {
        let (mut host, path) = fake_host();
        host.load_dll(&path).unwrap();

        let callable = host.globals().native("fib").unwrap().clone();
        host.unload_dll(&path).unwrap();

        let err = host
            .call_native(&callable, &[ScriptValue::Number(1.0)])
            .unwrap_err();
        assert!(matches!(err, BridgeError::StaleBinding { .. }));
        assert_eq!(err.kind(), "StaleBinding");
    }

    #[test]
    fn call_unknown_name_errors() {
        let (mut host, _path) = fake_host();
        let err = host.call("nonexistent", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownFunction { .. }));
    }

    #[test]
    fn value_global_is_not_callable() {
        let (mut host, _path) = fake_host();
        host.globals_mut()
            .define_value("answer", ScriptValue::Number(42.0));
        let err = host.call("answer", &[]).unwrap_err();
        assert!(matches!(err, BridgeError::UnknownFunction { .. }));
    }

    #[test]
    fn unload_unknown_spec_is_not_loaded() {
        let (mut host, _path) = fake_host();
        let err = host.unload_dll("/fake/libnever.so").unwrap_err();
        assert_eq!(err.kind(), "NotLoaded");
    }
}
