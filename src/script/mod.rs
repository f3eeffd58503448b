//! Script-side surface of the bridge.
//!
//! The script engine itself is an external collaborator; these types model
//! the two points where the bridge touches it: the dynamically typed value
//! that crosses the call boundary ([`ScriptValue`]) and the global table the
//! registry publishes callables into ([`Globals`]).

pub mod globals;
pub mod value;

pub use globals::{Global, Globals, NativeCallable};
pub use value::ScriptValue;
