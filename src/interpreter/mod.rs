use std::rc::Rc;

use tracing::debug;

use crate::ast::*;
use crate::object::builtins;
use crate::object::ops::{self, OpError};
use crate::object::{Env, Environment, Function, Value};

/// Nested call limit for Monkey functions.
pub const MAX_DEPTH: usize = 128;

/// Native stack the evaluator may use below its entry point. Spawned threads
/// get 2 MiB by default, so this leaves room for the caller's own frames.
pub const STACK_BUDGET: usize = 1536 * 1024;

/// Address of a local in the caller's frame.
#[inline(never)]
fn stack_address() -> usize {
    let marker = 0u8;
    std::hint::black_box(&marker) as *const u8 as usize
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct RuntimeError {
    pub message: String,
}

impl RuntimeError {
    pub fn new(msg: impl Into<String>) -> Self {
        RuntimeError { message: msg.into() }
    }
}

impl From<OpError> for RuntimeError {
    fn from(e: OpError) -> Self {
        RuntimeError::new(e.to_string())
    }
}

type Result<T> = std::result::Result<T, RuntimeError>;

/// Why evaluation left the current expression early
enum Signal {
    /// `return` unwinding to the nearest function
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Signal {
    fn from(e: RuntimeError) -> Self {
        Signal::Error(e)
    }
}

impl From<OpError> for Signal {
    fn from(e: OpError) -> Self {
        Signal::Error(e.into())
    }
}

type Eval<T> = std::result::Result<T, Signal>;

/// Tree-walking evaluator over a persistent environment.
pub struct Interpreter {
    env: Env,
    depth: usize,
    max_depth: usize,
    /// Set while a program or an outside `apply` is running
    stack_base: Option<usize>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter::with_env(Environment::new())
    }

    pub fn with_env(env: Env) -> Self {
        Interpreter { env, depth: 0, max_depth: MAX_DEPTH, stack_base: None }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    /// Run every statement; the result is the value of the last expression
    /// statement (or of a top-level `return`), `null` when there is none.
    pub fn eval_program(&mut self, program: &Program) -> Result<Value> {
        debug!(statements = program.statements.len(), "eval program");
        let env = Rc::clone(&self.env);
        self.with_stack_base(|interp| {
            let mut last = Value::Null;
            for stmt in &program.statements {
                match interp.eval_stmt(&env, stmt) {
                    Ok(Some(v)) => last = v,
                    Ok(None) => {}
                    Err(Signal::Return(v)) => return Ok(v),
                    Err(Signal::Error(e)) => return Err(e),
                }
            }
            Ok(last)
        })
    }

    /// Call a function or builtin from outside a running program.
    pub fn apply(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        self.with_stack_base(|interp| interp.call(callee, args))
    }

    fn with_stack_base<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        if self.stack_base.is_some() {
            return f(self);
        }
        self.stack_base = Some(stack_address());
        let out = f(self);
        self.stack_base = None;
        out
    }

    fn stack_exhausted(&self) -> bool {
        self.stack_base
            .is_some_and(|base| base.abs_diff(stack_address()) > STACK_BUDGET)
    }

    fn eval_block(&mut self, env: &Env, block: &Block) -> Eval<Value> {
        let mut last = Value::Null;
        for stmt in &block.statements {
            // A block ending in `let` has no value
            last = self.eval_stmt(env, stmt)?.unwrap_or(Value::Null);
        }
        Ok(last)
    }

    fn eval_stmt(&mut self, env: &Env, stmt: &Stmt) -> Eval<Option<Value>> {
        match stmt {
            Stmt::Let { name, value } => {
                let val = self.eval_expr(env, value)?;
                env.borrow_mut().set(name.as_str(), val);
                Ok(None)
            }
            Stmt::Return(expr) => Err(Signal::Return(self.eval_expr(env, expr)?)),
            Stmt::Expr(expr) => Ok(Some(self.eval_expr(env, expr)?)),
        }
    }

    fn eval_expr(&mut self, env: &Env, expr: &Expr) -> Eval<Value> {
        match expr {
            Expr::Integer(n) => Ok(Value::Integer(*n)),
            Expr::Boolean(b) => Ok(Value::Boolean(*b)),
            Expr::Str(s) => Ok(Value::text(s.as_str())),
            Expr::Ident(name) => Ok(lookup(env, name)?),
            Expr::Prefix { operator, right } => self.eval_prefix(env, operator, right),
            Expr::Infix { operator, left, right } => self.eval_infix(env, operator, left, right),
            Expr::If { condition, consequence, alternative } => {
                self.eval_if(env, condition, consequence, alternative.as_ref())
            }
            Expr::Function { parameters, body, .. } => Ok(Value::Function(Rc::new(Function {
                parameters: parameters.clone(),
                body: body.clone(),
                env: Rc::clone(env),
            }))),
            Expr::Call { function, arguments } => self.eval_call(env, function, arguments),
            Expr::Array(items) => Ok(Value::array(self.eval_all(env, items)?)),
            Expr::Hash(pairs) => self.eval_hash(env, pairs),
            Expr::Index { left, index } => {
                let left = self.eval_expr(env, left)?;
                let index = self.eval_expr(env, index)?;
                Ok(ops::index(&left, &index)?)
            }
        }
    }

    // Compound expressions live in helpers so `eval_expr`'s own frame stays
    // small: one Monkey call nests it several times.

    fn eval_prefix(&mut self, env: &Env, operator: &str, right: &Expr) -> Eval<Value> {
        let right = self.eval_expr(env, right)?;
        match operator {
            "!" => Ok(ops::bang(&right)),
            "-" => Ok(ops::negate(&right)?),
            other => Err(RuntimeError::new(format!("unknown operator: {}", other)).into()),
        }
    }

    fn eval_infix(&mut self, env: &Env, operator: &str, left: &Expr, right: &Expr) -> Eval<Value> {
        let left = self.eval_expr(env, left)?;
        let right = self.eval_expr(env, right)?;
        match ops::infix(operator, &left, &right) {
            Some(result) => Ok(result?),
            None => Err(RuntimeError::new(format!("unknown operator: {}", operator)).into()),
        }
    }

    fn eval_if(
        &mut self,
        env: &Env,
        condition: &Expr,
        consequence: &Block,
        alternative: Option<&Block>,
    ) -> Eval<Value> {
        if self.eval_expr(env, condition)?.is_truthy() {
            self.eval_block(env, consequence)
        } else if let Some(alt) = alternative {
            self.eval_block(env, alt)
        } else {
            Ok(Value::Null)
        }
    }

    fn eval_call(&mut self, env: &Env, function: &Expr, arguments: &[Expr]) -> Eval<Value> {
        let callee = self.eval_expr(env, function)?;
        let args = self.eval_all(env, arguments)?;
        Ok(self.call(callee, args)?)
    }

    fn eval_all(&mut self, env: &Env, exprs: &[Expr]) -> Eval<Vec<Value>> {
        let mut values = Vec::with_capacity(exprs.len());
        for expr in exprs {
            values.push(self.eval_expr(env, expr)?);
        }
        Ok(values)
    }

    fn eval_hash(&mut self, env: &Env, pairs: &[(Expr, Expr)]) -> Eval<Value> {
        let mut flat = Vec::with_capacity(pairs.len() * 2);
        for (k, v) in pairs {
            flat.push(self.eval_expr(env, k)?);
            flat.push(self.eval_expr(env, v)?);
        }
        Ok(ops::build_hash(flat)?)
    }

    /// Call a function or builtin. A `return` stops here.
    fn call(&mut self, callee: Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Function(func) => {
                if args.len() != func.parameters.len() {
                    return Err(RuntimeError::new(format!(
                        "wrong number of arguments: want={}, got={}",
                        func.parameters.len(),
                        args.len()
                    )));
                }
                if self.depth >= self.max_depth {
                    return Err(RuntimeError::new(format!(
                        "frame overflow: more than {} nested calls",
                        self.max_depth
                    )));
                }
                if self.stack_exhausted() {
                    return Err(RuntimeError::new(format!(
                        "frame overflow: native stack exhausted after {} nested calls",
                        self.depth
                    )));
                }
                let scope = Environment::new_enclosed(&func.env);
                for (param, arg) in func.parameters.iter().zip(args) {
                    scope.borrow_mut().set(param.as_str(), arg);
                }

                self.depth += 1;
                let result = self.eval_block(&scope, &func.body);
                self.depth -= 1;

                match result {
                    Ok(v) | Err(Signal::Return(v)) => Ok(v),
                    Err(Signal::Error(e)) => Err(e),
                }
            }
            Value::Builtin(builtin) => Ok(builtin.call(&args)),
            other => Err(RuntimeError::new(format!("calling non-function: {}", other.type_name()))),
        }
    }
}

/// Bindings shadow builtins of the same name.
fn lookup(env: &Env, name: &str) -> Result<Value> {
    if let Some(v) = env.borrow().get(name) {
        return Ok(v);
    }
    match builtins::lookup(name) {
        Some(builtin) => Ok(Value::Builtin(builtin)),
        None => Err(RuntimeError::new(format!("undefined variable {}", name))),
    }
}

/// Evaluate a whole program in a fresh environment.
pub fn run(program: &Program) -> Result<Value> {
    Interpreter::new().eval_program(program)
}
