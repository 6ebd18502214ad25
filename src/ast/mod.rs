use std::fmt;

use serde::{Deserialize, Serialize};

pub mod source_map;
pub use source_map::SourceMap;

// ---- Span infrastructure ----

/// Byte range within source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const UNKNOWN: Span = Span { start: 0, end: 0 };

    pub fn merge(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

// ---- Core AST types ----

/// A complete program is a list of top-level statements.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// `{ stmt; stmt; }`: the body of a function or of an if branch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Block {
    pub statements: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let name = value;`
    Let { name: String, value: Expr },

    /// `return value;`
    Return(Expr),

    /// Expression evaluated for its value
    Expr(Expr),
}

/// Expressions. Operators are kept as source text; the compiler decides which
/// ones it understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Ident(String),
    Integer(i64),
    Str(String),
    Boolean(bool),

    /// `!x`, `-x`
    Prefix { operator: String, right: Box<Expr> },

    /// `a + b`, `a < b`, ...
    Infix {
        operator: String,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// `if (cond) { ... } else { ... }`
    If {
        condition: Box<Expr>,
        consequence: Block,
        alternative: Option<Block>,
    },

    /// `fn(a, b) { ... }`; `name` is set when the literal is bound by `let`.
    Function {
        name: Option<String>,
        parameters: Vec<String>,
        body: Block,
    },

    /// `callee(args...)`
    Call { function: Box<Expr>, arguments: Vec<Expr> },

    /// `[a, b, c]`
    Array(Vec<Expr>),

    /// `{k: v, ...}` in source order
    Hash(Vec<(Expr, Expr)>),

    /// `collection[index]`
    Index { left: Box<Expr>, index: Box<Expr> },
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            write!(f, "{}", stmt)?;
        }
        Ok(())
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Let { name, value } => write!(f, "let {} = {};", name, value),
            Stmt::Return(value) => write!(f, "return {};", value),
            Stmt::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Ident(name) => write!(f, "{}", name),
            Expr::Integer(n) => write!(f, "{}", n),
            // String literals render as their raw text
            Expr::Str(s) => write!(f, "{}", s),
            Expr::Boolean(b) => write!(f, "{}", b),
            Expr::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expr::Infix { operator, left, right } => {
                write!(f, "({} {} {})", left, operator, right)
            }
            Expr::If { condition, consequence, alternative } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alt) = alternative {
                    write!(f, "else {}", alt)?;
                }
                Ok(())
            }
            Expr::Function { name, parameters, body } => {
                write!(f, "fn")?;
                if let Some(name) = name {
                    write!(f, "<{}>", name)?;
                }
                write!(f, "({}) {}", parameters.join(", "), body)
            }
            Expr::Call { function, arguments } => write!(f, "{}({})", function, join(arguments)),
            Expr::Array(items) => write!(f, "[{}]", join(items)),
            Expr::Hash(pairs) => {
                let rendered: Vec<String> =
                    pairs.iter().map(|(k, v)| format!("{}:{}", k, v)).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Expr::Index { left, index } => write!(f, "({}[{}])", left, index),
        }
    }
}
