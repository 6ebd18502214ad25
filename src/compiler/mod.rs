use std::rc::Rc;

use tracing::debug;

use crate::ast::*;
use crate::code::*;
use crate::object::{CompiledFunction, Value, BUILTINS};

pub mod symbol_table;

pub use symbol_table::{ScopeChain, Symbol, SymbolScope, SymbolTable};

/// Placeholder jump target, overwritten once the real target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("unknown operator: {operator}")]
    UnknownOperator { operator: String },
    #[error("undefined variable {name}")]
    UndefinedVariable { name: String },
    #[error(transparent)]
    Code(#[from] CodeError),
}

type Result<T> = std::result::Result<T, CompileError>;

/// Compiler output handed to the VM.
#[derive(Debug, Clone)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

/// Compile-side state that survives between units in one session: the global
/// symbol table (builtins included) and the constant pool.
#[derive(Debug, Clone)]
pub struct CompileState {
    pub symbols: SymbolTable,
    pub constants: Vec<Value>,
}

impl CompileState {
    pub fn new() -> Self {
        let mut symbols = SymbolTable::new();
        for (i, builtin) in BUILTINS.iter().enumerate() {
            symbols.define_builtin(i, builtin.name);
        }
        CompileState { symbols, constants: Vec::new() }
    }
}

impl Default for CompileState {
    fn default() -> Self {
        CompileState::new()
    }
}

// ── Compilation scopes ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: u8,
    position: usize,
}

#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

pub struct Compiler<'s> {
    constants: &'s mut Vec<Value>,
    symbols: ScopeChain<'s>,
    scope: CompilationScope,
    outer_scopes: Vec<CompilationScope>,
}

impl<'s> Compiler<'s> {
    pub fn new(state: &'s mut CompileState) -> Self {
        let CompileState { symbols, constants } = state;
        Compiler {
            constants,
            symbols: ScopeChain::new(symbols),
            scope: CompilationScope::default(),
            outer_scopes: Vec::new(),
        }
    }

    pub fn compile(mut self, program: &Program) -> Result<Bytecode> {
        let first_constant = self.constants.len();
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        debug!(
            bytes = self.scope.instructions.len(),
            new_constants = self.constants.len() - first_constant,
            "compiled program"
        );
        Ok(Bytecode {
            instructions: self.scope.instructions,
            constants: self.constants.clone(),
        })
    }

    // ---- Emission ----

    fn emit(&mut self, op: u8, operands: &[usize]) -> Result<usize> {
        let ins = make(op, operands)?;
        let position = self.scope.instructions.push(&ins);
        self.scope.previous = self.scope.last.take();
        self.scope.last = Some(EmittedInstruction { opcode: op, position });
        Ok(position)
    }

    fn add_constant(&mut self, value: Value) -> usize {
        self.constants.push(value);
        self.constants.len() - 1
    }

    fn last_instruction_is(&self, op: u8) -> bool {
        !self.scope.instructions.is_empty() && self.scope.last.is_some_and(|l| l.opcode == op)
    }

    fn remove_last_pop(&mut self) {
        if let Some(last) = self.scope.last {
            self.scope.instructions.truncate(last.position);
            self.scope.last = self.scope.previous.take();
        }
    }

    fn replace_last_pop_with_return(&mut self) -> Result<()> {
        if let Some(last) = self.scope.last.as_mut() {
            self.scope.instructions.truncate(last.position);
            self.scope.instructions.push(&make(OP_RETURN_VALUE, &[])?);
            last.opcode = OP_RETURN_VALUE;
        }
        Ok(())
    }

    /// Rewrite the single operand of the instruction at `position`.
    fn change_operand(&mut self, position: usize, operand: usize) -> Result<()> {
        let op = self.scope.instructions[position];
        let ins = make(op, &[operand])?;
        self.scope.instructions.patch(position, &ins)?;
        Ok(())
    }

    fn enter_scope(&mut self) {
        let outer = std::mem::take(&mut self.scope);
        self.outer_scopes.push(outer);
        self.symbols.push();
    }

    fn leave_scope(&mut self) -> (Instructions, SymbolTable) {
        let outer = self.outer_scopes.pop().unwrap_or_default();
        let inner = std::mem::replace(&mut self.scope, outer);
        let table = self.symbols.pop().unwrap_or_default();
        (inner.instructions, table)
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<()> {
        match symbol.scope {
            SymbolScope::Global => self.emit(OP_GET_GLOBAL, &[symbol.index])?,
            SymbolScope::Local => self.emit(OP_GET_LOCAL, &[symbol.index])?,
            SymbolScope::Builtin => self.emit(OP_GET_BUILTIN, &[symbol.index])?,
            SymbolScope::Free => self.emit(OP_GET_FREE, &[symbol.index])?,
            SymbolScope::Function => self.emit(OP_CURRENT_CLOSURE, &[])?,
        };
        Ok(())
    }

    // ---- Statements ----

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Expr(expr) => {
                self.compile_expr(expr)?;
                self.emit(OP_POP, &[])?;
            }
            Stmt::Let { name, value } => {
                let symbol = self.symbols.define(name);
                self.compile_expr(value)?;
                let op = match symbol.scope {
                    SymbolScope::Global => OP_SET_GLOBAL,
                    _ => OP_SET_LOCAL,
                };
                self.emit(op, &[symbol.index])?;
            }
            Stmt::Return(value) => {
                self.compile_expr(value)?;
                self.emit(OP_RETURN_VALUE, &[])?;
            }
        }
        Ok(())
    }

    fn compile_block(&mut self, block: &Block) -> Result<()> {
        for stmt in &block.statements {
            self.compile_stmt(stmt)?;
        }
        Ok(())
    }

    /// Compile an if-branch so it leaves exactly one value on the stack.
    fn compile_branch(&mut self, block: &Block) -> Result<()> {
        self.compile_block(block)?;
        if self.last_instruction_is(OP_POP) {
            self.remove_last_pop();
        } else {
            self.emit(OP_NULL, &[])?;
        }
        Ok(())
    }

    // ---- Expressions ----

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match expr {
            Expr::Integer(n) => {
                let idx = self.add_constant(Value::Integer(*n));
                self.emit(OP_CONSTANT, &[idx])?;
            }
            Expr::Str(s) => {
                let idx = self.add_constant(Value::text(s.as_str()));
                self.emit(OP_CONSTANT, &[idx])?;
            }
            Expr::Boolean(b) => {
                self.emit(if *b { OP_TRUE } else { OP_FALSE }, &[])?;
            }
            Expr::Ident(name) => {
                let symbol = self
                    .symbols
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable { name: name.clone() })?;
                self.load_symbol(&symbol)?;
            }
            Expr::Prefix { operator, right } => {
                self.compile_expr(right)?;
                let op = match operator.as_str() {
                    "!" => OP_BANG,
                    "-" => OP_MINUS,
                    _ => return Err(CompileError::UnknownOperator { operator: operator.clone() }),
                };
                self.emit(op, &[])?;
            }
            Expr::Infix { operator, left, right } => self.compile_infix(operator, left, right)?,
            Expr::If { condition, consequence, alternative } => {
                self.compile_expr(condition)?;
                let jump_not_truthy = self.emit(OP_JUMP_NOT_TRUTHY, &[PLACEHOLDER])?;

                self.compile_branch(consequence)?;
                let jump = self.emit(OP_JUMP, &[PLACEHOLDER])?;

                let after_consequence = self.scope.instructions.len();
                self.change_operand(jump_not_truthy, after_consequence)?;

                match alternative {
                    Some(alt) => self.compile_branch(alt)?,
                    None => {
                        self.emit(OP_NULL, &[])?;
                    }
                }

                let after_alternative = self.scope.instructions.len();
                self.change_operand(jump, after_alternative)?;
            }
            Expr::Array(items) => {
                for item in items {
                    self.compile_expr(item)?;
                }
                self.emit(OP_ARRAY, &[items.len()])?;
            }
            Expr::Hash(pairs) => {
                // Sorted by rendered key so the emitted bytecode is reproducible
                let mut sorted: Vec<&(Expr, Expr)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());
                for (key, value) in sorted {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(OP_HASH, &[pairs.len() * 2])?;
            }
            Expr::Index { left, index } => {
                self.compile_expr(left)?;
                self.compile_expr(index)?;
                self.emit(OP_INDEX, &[])?;
            }
            Expr::Function { name, parameters, body } => {
                self.compile_function(name.as_deref(), parameters, body)?
            }
            Expr::Call { function, arguments } => {
                self.compile_expr(function)?;
                for arg in arguments {
                    self.compile_expr(arg)?;
                }
                self.emit(OP_CALL, &[arguments.len()])?;
            }
        }
        Ok(())
    }

    fn compile_infix(&mut self, operator: &str, left: &Expr, right: &Expr) -> Result<()> {
        // `<` and `<=` swap their operands and reuse the greater-than opcodes
        if let Some(op) = match operator {
            "<" => Some(OP_GREATER_THAN),
            "<=" => Some(OP_GREATER_EQUAL),
            _ => None,
        } {
            self.compile_expr(right)?;
            self.compile_expr(left)?;
            self.emit(op, &[])?;
            return Ok(());
        }

        self.compile_expr(left)?;
        self.compile_expr(right)?;
        let op = match operator {
            "+" => OP_ADD,
            "-" => OP_SUB,
            "*" => OP_MUL,
            "/" => OP_DIV,
            ">" => OP_GREATER_THAN,
            ">=" => OP_GREATER_EQUAL,
            "==" => OP_EQUAL,
            "!=" => OP_NOT_EQUAL,
            _ => return Err(CompileError::UnknownOperator { operator: operator.to_string() }),
        };
        self.emit(op, &[])?;
        Ok(())
    }

    fn compile_function(&mut self, name: Option<&str>, parameters: &[String], body: &Block) -> Result<()> {
        self.enter_scope();

        if let Some(name) = name {
            self.symbols.define_function_name(name);
        }
        for param in parameters {
            self.symbols.define(param);
        }

        self.compile_block(body)?;

        if self.last_instruction_is(OP_POP) {
            self.replace_last_pop_with_return()?;
        }
        if !self.last_instruction_is(OP_RETURN_VALUE) {
            self.emit(OP_RETURN, &[])?;
        }

        let (instructions, table) = self.leave_scope();

        // Captured values are pushed in free-slot order right before OpClosure
        for symbol in &table.free_symbols {
            self.load_symbol(symbol)?;
        }

        let func = CompiledFunction {
            instructions,
            num_locals: table.num_definitions,
            num_parameters: parameters.len(),
        };
        let idx = self.add_constant(Value::CompiledFunction(Rc::new(func)));
        self.emit(OP_CLOSURE, &[idx, table.free_symbols.len()])?;
        Ok(())
    }
}

/// Compile a standalone program with fresh state.
pub fn compile(program: &Program) -> Result<Bytecode> {
    let mut state = CompileState::new();
    Compiler::new(&mut state).compile(program)
}
