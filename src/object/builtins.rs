use std::rc::Rc;

use super::Value;

type BuiltinResult = Result<Value, String>;

/// A native function callable from Monkey code.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    func: fn(&[Value]) -> BuiltinResult,
}

impl Builtin {
    /// Failures come back in-band as `Value::Error`.
    pub fn call(&self, args: &[Value]) -> Value {
        (self.func)(args).unwrap_or_else(Value::Error)
    }
}

/// Fixed registry. The position of each entry is the operand of `OpGetBuiltin`,
/// so entries are only ever appended.
pub static BUILTINS: &[Builtin] = &[
    Builtin { name: "len", func: len },
    Builtin { name: "exit", func: exit },
    Builtin { name: "push", func: push },
    Builtin { name: "last", func: last },
    Builtin { name: "rest", func: rest },
    Builtin { name: "puts", func: puts },
    Builtin { name: "keys", func: keys },
    Builtin { name: "first", func: first },
    Builtin { name: "toInt", func: to_int },
    Builtin { name: "values", func: values },
    Builtin { name: "toBool", func: to_bool },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

fn arity(args: &[Value], want: usize) -> Result<(), String> {
    if args.len() != want {
        return Err(format!("wrong number of arguments. got={}, want={}", args.len(), want));
    }
    Ok(())
}

fn array_arg<'a>(name: &str, arg: &'a Value) -> Result<&'a [Value], String> {
    match arg {
        Value::Array(items) => Ok(items),
        other => Err(format!("argument to `{}` must be ARRAY, got {}", name, other.type_name())),
    }
}

fn len(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    let n = match &args[0] {
        Value::Text(s) => s.len(),
        Value::Array(items) => items.len(),
        other => return Err(format!("argument to `len` not supported, got {}", other.type_name())),
    };
    Ok(Value::Integer(n as i64))
}

fn exit(args: &[Value]) -> BuiltinResult {
    let code = match args {
        [] => 0,
        [Value::Integer(n)] if (0..=125).contains(n) => *n as i32,
        [Value::Integer(_)] => return Err("invalid exit code. should be within 0 to 125".into()),
        [other] => {
            return Err(format!("argument to `exit` must be INTEGER or none, got {}", other.type_name()));
        }
        _ => {
            return Err(format!("wrong number of arguments. got={}, want=0 or 1", args.len()));
        }
    };
    tracing::debug!(code, "exit builtin called");
    std::process::exit(code)
}

fn push(args: &[Value]) -> BuiltinResult {
    arity(args, 2)?;
    let items = array_arg("push", &args[0])?;
    let mut out = Vec::with_capacity(items.len() + 1);
    out.extend_from_slice(items);
    out.push(args[1].clone());
    Ok(Value::array(out))
}

fn first(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    let items = array_arg("first", &args[0])?;
    Ok(items.first().cloned().unwrap_or(Value::Null))
}

fn last(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    let items = array_arg("last", &args[0])?;
    Ok(items.last().cloned().unwrap_or(Value::Null))
}

fn rest(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    let items = array_arg("rest", &args[0])?;
    match items.split_first() {
        Some((_, tail)) => Ok(Value::array(tail.to_vec())),
        None => Ok(Value::Null),
    }
}

fn puts(args: &[Value]) -> BuiltinResult {
    let line: Vec<String> = args.iter().map(|a| a.to_string()).collect();
    println!("{}", line.join(" "));
    Ok(Value::Null)
}

fn keys(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    match &args[0] {
        Value::Hash(pairs) => Ok(Value::array(pairs.keys().map(|k| k.to_value()).collect())),
        other => Err(format!("argument to `keys` must be HASH, got {}", other.type_name())),
    }
}

fn values(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    match &args[0] {
        Value::Hash(pairs) => Ok(Value::Array(Rc::new(pairs.values().cloned().collect()))),
        other => Err(format!("argument to `values` must be HASH, got {}", other.type_name())),
    }
}

fn to_int(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    match &args[0] {
        Value::Integer(n) => Ok(Value::Integer(*n)),
        Value::Boolean(b) => Ok(Value::Integer(*b as i64)),
        Value::Null => Ok(Value::Integer(0)),
        other => Err(format!("invalid argument type. got {}", other.type_name())),
    }
}

fn to_bool(args: &[Value]) -> BuiltinResult {
    arity(args, 1)?;
    let b = match &args[0] {
        Value::Integer(n) => *n != 0,
        Value::Text(s) => !s.is_empty(),
        Value::Boolean(b) => *b,
        Value::Array(items) => !items.is_empty(),
        Value::Hash(pairs) => !pairs.is_empty(),
        Value::Null => false,
        other => return Err(format!("invalid argument type. got {}", other.type_name())),
    };
    Ok(Value::Boolean(b))
}
