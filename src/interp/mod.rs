//! Tree-walking interpreter
//!
//! Values, the garbage-collected heap, environment chains, native
//! callables, and the evaluator itself.

mod env;
mod error;
mod eval;
mod heap;
mod natives;
mod value;

pub use env::EnvHandle;
pub use error::{ErrorKind, InterpResult, RuntimeError};
pub use eval::{FileLoader, Flow, Interpreter, SourceLoader};
pub use heap::{Heap, Obj, ObjRef};
pub use natives::{NativeCtx, NativeFn};
pub use value::{TypeTag, Value};
