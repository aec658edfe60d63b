//! Runtime state: per-subgraph storage bindings and the interpreter.

pub mod graph;
pub mod interpreter;

pub use interpreter::Interpreter;
