//! Monkey: lexer, Pratt parser, bytecode compiler, stack VM and a
//! tree-walking evaluator sharing one value model.

pub mod ast;
pub mod code;
pub mod compiler;
pub mod diagnostic;
pub mod interpreter;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod repl;
pub mod vm;

pub use repl::{Engine, Session, SessionError, parse_source};
