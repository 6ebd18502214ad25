//! Operator semantics shared by the VM and the tree-walking evaluator.

use std::collections::BTreeMap;
use std::rc::Rc;

use super::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Greater,
    GreaterEq,
    Equal,
    NotEqual,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OpError {
    #[error("unsupported types for binary operation: {left} {operator} {right}")]
    UnsupportedTypes { operator: &'static str, left: &'static str, right: &'static str },
    #[error("unknown operator: {left} {operator} {right}")]
    UnknownOperator { operator: &'static str, left: &'static str, right: &'static str },
    #[error("unsupported type for negation: {type_name}")]
    UnsupportedNegation { type_name: &'static str },
    #[error("division by zero")]
    DivisionByZero,
    #[error("unusable as hash key: {type_name}")]
    UnusableHashKey { type_name: &'static str },
    #[error("index operator not supported: {type_name}")]
    IndexNotSupported { type_name: &'static str },
}

pub fn binary(op: BinaryOp, left: &Value, right: &Value) -> Result<Value, OpError> {
    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => integer_binary(op, *l, *r),
        _ => match op {
            BinaryOp::Equal => Ok(Value::Boolean(left.identical(right))),
            BinaryOp::NotEqual => Ok(Value::Boolean(!left.identical(right))),
            BinaryOp::Add => match (left, right) {
                (Value::Text(l), Value::Text(r)) => Ok(Value::text(format!("{}{}", l, r))),
                _ => Err(unsupported(op, left, right)),
            },
            _ if left.type_name() == right.type_name() => Err(OpError::UnknownOperator {
                operator: op.symbol(),
                left: left.type_name(),
                right: right.type_name(),
            }),
            _ => Err(unsupported(op, left, right)),
        },
    }
}

fn unsupported(op: BinaryOp, left: &Value, right: &Value) -> OpError {
    OpError::UnsupportedTypes {
        operator: op.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// Integer arithmetic wraps on overflow.
fn integer_binary(op: BinaryOp, l: i64, r: i64) -> Result<Value, OpError> {
    Ok(match op {
        BinaryOp::Add => Value::Integer(l.wrapping_add(r)),
        BinaryOp::Sub => Value::Integer(l.wrapping_sub(r)),
        BinaryOp::Mul => Value::Integer(l.wrapping_mul(r)),
        BinaryOp::Div => {
            if r == 0 {
                return Err(OpError::DivisionByZero);
            }
            Value::Integer(l.wrapping_div(r))
        }
        BinaryOp::Greater => Value::Boolean(l > r),
        BinaryOp::GreaterEq => Value::Boolean(l >= r),
        BinaryOp::Equal => Value::Boolean(l == r),
        BinaryOp::NotEqual => Value::Boolean(l != r),
    })
}

/// Infix operator by its source text. `<` and `<=` are the greater-than
/// forms with operands swapped.
pub fn infix(operator: &str, left: &Value, right: &Value) -> Option<Result<Value, OpError>> {
    let (op, swap) = match operator {
        "+" => (BinaryOp::Add, false),
        "-" => (BinaryOp::Sub, false),
        "*" => (BinaryOp::Mul, false),
        "/" => (BinaryOp::Div, false),
        ">" => (BinaryOp::Greater, false),
        ">=" => (BinaryOp::GreaterEq, false),
        "<" => (BinaryOp::Greater, true),
        "<=" => (BinaryOp::GreaterEq, true),
        "==" => (BinaryOp::Equal, false),
        "!=" => (BinaryOp::NotEqual, false),
        _ => return None,
    };
    Some(if swap { binary(op, right, left) } else { binary(op, left, right) })
}

pub fn negate(value: &Value) -> Result<Value, OpError> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
        other => Err(OpError::UnsupportedNegation { type_name: other.type_name() }),
    }
}

pub fn bang(value: &Value) -> Value {
    Value::Boolean(!value.is_truthy())
}

/// Out-of-range array indices and missing hash keys yield null.
pub fn index(left: &Value, index: &Value) -> Result<Value, OpError> {
    match (left, index) {
        (Value::Array(items), Value::Integer(i)) => Ok(usize::try_from(*i)
            .ok()
            .and_then(|i| items.get(i))
            .cloned()
            .unwrap_or(Value::Null)),
        (Value::Hash(pairs), key) => {
            let key = key
                .hash_key()
                .ok_or(OpError::UnusableHashKey { type_name: key.type_name() })?;
            Ok(pairs.get(&key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(OpError::IndexNotSupported { type_name: left.type_name() }),
    }
}

/// Build a hash from alternating keys and values. Later duplicates win.
pub fn build_hash(flat: Vec<Value>) -> Result<Value, OpError> {
    let mut pairs = BTreeMap::new();
    let mut iter = flat.into_iter();
    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
        let hashed = key
            .hash_key()
            .ok_or(OpError::UnusableHashKey { type_name: key.type_name() })?;
        pairs.insert(hashed, value);
    }
    Ok(Value::Hash(Rc::new(pairs)))
}
