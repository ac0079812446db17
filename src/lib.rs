//! Pith interpreter library
//!
//! An indentation-structured scripting language executed by a
//! tree-walking interpreter with mark-and-sweep garbage collection.

pub mod ast;
pub mod error;
pub mod interp;
pub mod lexer;
pub mod parser;
pub mod repl;

pub use error::{CompileError, Result};
