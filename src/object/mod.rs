use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use crate::ast::Block;
use crate::code::Instructions;

pub mod builtins;
pub mod environment;
pub mod ops;

pub use builtins::{Builtin, BUILTINS};
pub use environment::{Env, Environment};

/// Runtime value shared by the VM and the tree-walking evaluator.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(i64),
    Boolean(bool),
    Text(Rc<str>),
    Null,
    /// In-band error value, produced by builtins.
    Error(String),
    Array(Rc<Vec<Value>>),
    Hash(Rc<BTreeMap<HashKey, Value>>),
    CompiledFunction(Rc<CompiledFunction>),
    Closure(Rc<Closure>),
    Builtin(&'static Builtin),
    /// Function value of the tree-walking evaluator.
    Function(Rc<Function>),
}

/// Values usable as hash keys.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HashKey {
    Integer(i64),
    Boolean(bool),
    Text(Rc<str>),
}

impl HashKey {
    pub fn to_value(&self) -> Value {
        match self {
            HashKey::Integer(n) => Value::Integer(*n),
            HashKey::Boolean(b) => Value::Boolean(*b),
            HashKey::Text(s) => Value::Text(s.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    pub num_locals: usize,
    pub num_parameters: usize,
}

#[derive(Debug, Clone)]
pub struct Closure {
    pub func: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

pub struct Function {
    pub parameters: Vec<String>,
    pub body: Block,
    pub env: Env,
}

// The environment can hold this function again, so it is left out.
impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("parameters", &self.parameters)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}

impl Value {
    pub const TRUE: Value = Value::Boolean(true);
    pub const FALSE: Value = Value::Boolean(false);

    pub fn text(s: impl Into<Rc<str>>) -> Value {
        Value::Text(s.into())
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(items))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Boolean(_) => "BOOLEAN",
            Value::Text(_) => "STRING",
            Value::Null => "NULL",
            Value::Error(_) => "ERROR",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Function(_) => "FUNCTION",
        }
    }

    /// Only `false` and `null` are falsy; `0`, `""` and `[]` are truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::Boolean(b) => Some(HashKey::Boolean(*b)),
            Value::Text(s) => Some(HashKey::Text(s.clone())),
            _ => None,
        }
    }

    /// Equality as `==` sees it: scalars and strings by value, everything
    /// else by identity.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// Structural equality, used by tests and hosts. Functions still compare by identity.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Hash(a), Value::Hash(b)) => a == b,
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => a == b,
            _ => self.identical(other),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Text(s) => write!(f, "{}", s),
            Value::Null => write!(f, "null"),
            Value::Error(msg) => write!(f, "ERROR: {}", msg),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (k, v)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", k.to_value(), v)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(func) => write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(func)),
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(b) => write!(f, "builtin {}", b.name),
            Value::Function(func) => {
                write!(f, "fn({}) {{\n{}\n}}", func.parameters.join(", "), func.body)
            }
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness() {
        assert!(Value::Integer(0).is_truthy());
        assert!(Value::text("").is_truthy());
        assert!(Value::array(vec![]).is_truthy());
        assert!(!Value::Null.is_truthy());
        assert!(!Value::FALSE.is_truthy());
        assert!(Value::TRUE.is_truthy());
    }

    #[test]
    fn hash_keys_only_for_scalars() {
        assert_eq!(Value::Integer(1).hash_key(), Some(HashKey::Integer(1)));
        assert_eq!(Value::text("a").hash_key(), Some(HashKey::Text("a".into())));
        assert_eq!(Value::TRUE.hash_key(), Some(HashKey::Boolean(true)));
        assert_eq!(Value::array(vec![]).hash_key(), None);
        assert_eq!(Value::Null.hash_key(), None);
    }

    #[test]
    fn equal_strings_hash_alike() {
        let a = Value::text("Hello World").hash_key();
        let b = Value::text(String::from("Hello World")).hash_key();
        assert_eq!(a, b);
        assert_ne!(a, Value::text("My name is johnny").hash_key());
    }

    #[test]
    fn identity_for_aggregates() {
        let a = Value::array(vec![Value::Integer(1)]);
        let b = Value::array(vec![Value::Integer(1)]);
        assert!(!a.identical(&b));
        assert!(a.identical(&a.clone()));
        assert_eq!(a, b);
        assert!(Value::text("x").identical(&Value::text("x")));
    }

    #[test]
    fn display_inspect() {
        assert_eq!(Value::array(vec![Value::Integer(1), Value::text("a")]).to_string(), "[1, a]");
        let mut pairs = BTreeMap::new();
        pairs.insert(HashKey::Text("b".into()), Value::Integer(2));
        pairs.insert(HashKey::Integer(1), Value::TRUE);
        assert_eq!(Value::Hash(Rc::new(pairs)).to_string(), "{1: true, b: 2}");
        assert_eq!(Value::Error("boom".into()).to_string(), "ERROR: boom");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
