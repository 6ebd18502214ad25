use std::rc::Rc;

use tracing::{debug, trace};

use crate::code::*;
use crate::compiler::Bytecode;
use crate::object::ops::{self, BinaryOp, OpError};
use crate::object::{Closure, CompiledFunction, Value, BUILTINS};

pub mod frame;

pub use frame::Frame;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("stack overflow")]
    StackOverflow,
    #[error("frame overflow: more than {} nested calls", MAX_FRAMES)]
    FrameOverflow,
    #[error("unknown opcode: {op}")]
    UnknownOpcode { op: u8 },
    #[error("calling non-function: {type_name}")]
    NotCallable { type_name: &'static str },
    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },
    #[error("not a function: {type_name}")]
    NotAFunction { type_name: &'static str },
    #[error("global index {index} out of range")]
    GlobalOutOfRange { index: usize },
    #[error(transparent)]
    Operator(#[from] OpError),
}

type VmResult<T> = Result<T, VmError>;

// ── Global store ─────────────────────────────────────────────────────

/// Global slots, kept by the session across runs. Grows on demand up to
/// `GLOBALS_SIZE`; unset slots read as null.
#[derive(Debug, Default)]
pub struct Globals {
    slots: Vec<Value>,
}

impl Globals {
    pub fn new() -> Self {
        Globals::default()
    }

    pub fn get(&self, index: usize) -> Value {
        self.slots.get(index).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&mut self, index: usize, value: Value) -> VmResult<()> {
        if index >= GLOBALS_SIZE {
            return Err(VmError::GlobalOutOfRange { index });
        }
        if index >= self.slots.len() {
            self.slots.resize(index + 1, Value::Null);
        }
        self.slots[index] = value;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

// ── Virtual machine ──────────────────────────────────────────────────

pub struct Vm<'g> {
    constants: Vec<Value>,
    stack: Vec<Value>,
    /// Next free slot; the top of stack is `stack[sp - 1]`.
    sp: usize,
    globals: &'g mut Globals,
    frames: Vec<Frame>,
    last_popped: Value,
}

impl<'g> Vm<'g> {
    pub fn new(bytecode: Bytecode, globals: &'g mut Globals) -> Self {
        let main = Rc::new(Closure {
            func: Rc::new(CompiledFunction {
                instructions: bytecode.instructions,
                num_locals: 0,
                num_parameters: 0,
            }),
            free: Vec::new(),
        });
        let mut frames = Vec::with_capacity(16);
        frames.push(Frame::new(main, 0));

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames,
            last_popped: Value::Null,
        }
    }

    /// The value most recently discarded by a top-level expression statement.
    pub fn last_popped(&self) -> &Value {
        &self.last_popped
    }

    pub fn stack_top(&self) -> Option<&Value> {
        self.sp.checked_sub(1).map(|i| &self.stack[i])
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp -= 1;
        std::mem::replace(&mut self.stack[self.sp], Value::Null)
    }

    /// Move the top `n` values off the stack, bottom first.
    fn take(&mut self, n: usize) -> Vec<Value> {
        let start = self.sp - n;
        let items = self.stack[start..self.sp]
            .iter_mut()
            .map(|slot| std::mem::replace(slot, Value::Null))
            .collect();
        self.sp = start;
        items
    }

    fn binary(&mut self, op: BinaryOp) -> VmResult<()> {
        let right = self.pop();
        let left = self.pop();
        let result = ops::binary(op, &left, &right)?;
        self.push(result)
    }

    pub fn run(&mut self) -> VmResult<()> {
        let Some(frame) = self.frames.last() else {
            return Ok(());
        };
        // The active frame is cached in locals and written back on calls
        let mut closure = Rc::clone(&frame.closure);
        let mut ip = frame.ip;
        let mut bp = frame.base_pointer;

        debug!(
            bytes = closure.func.instructions.len(),
            constants = self.constants.len(),
            "vm run"
        );

        loop {
            let code = closure.func.instructions.as_bytes();
            let Some(&op) = code.get(ip) else {
                // Only the top-level frame runs off the end of its code
                if let Some(frame) = self.frames.last_mut() {
                    frame.ip = ip;
                }
                break;
            };

            match op {
                OP_CONSTANT => {
                    let idx = read_u16(code, ip + 1);
                    ip += 3;
                    self.push(self.constants[idx].clone())?;
                }
                OP_POP => {
                    ip += 1;
                    self.last_popped = self.pop();
                }
                OP_TRUE | OP_FALSE | OP_NULL => {
                    ip += 1;
                    let value = match op {
                        OP_TRUE => Value::TRUE,
                        OP_FALSE => Value::FALSE,
                        _ => Value::Null,
                    };
                    self.push(value)?;
                }
                OP_ADD => { ip += 1; self.binary(BinaryOp::Add)?; }
                OP_SUB => { ip += 1; self.binary(BinaryOp::Sub)?; }
                OP_MUL => { ip += 1; self.binary(BinaryOp::Mul)?; }
                OP_DIV => { ip += 1; self.binary(BinaryOp::Div)?; }
                OP_EQUAL => { ip += 1; self.binary(BinaryOp::Equal)?; }
                OP_NOT_EQUAL => { ip += 1; self.binary(BinaryOp::NotEqual)?; }
                OP_GREATER_THAN => { ip += 1; self.binary(BinaryOp::Greater)?; }
                OP_GREATER_EQUAL => { ip += 1; self.binary(BinaryOp::GreaterEq)?; }
                OP_BANG => {
                    ip += 1;
                    let operand = self.pop();
                    self.push(ops::bang(&operand))?;
                }
                OP_MINUS => {
                    ip += 1;
                    let operand = self.pop();
                    self.push(ops::negate(&operand)?)?;
                }
                OP_JUMP => {
                    ip = read_u16(code, ip + 1);
                }
                OP_JUMP_NOT_TRUTHY => {
                    let target = read_u16(code, ip + 1);
                    ip += 3;
                    if !self.pop().is_truthy() {
                        ip = target;
                    }
                }
                OP_SET_GLOBAL => {
                    let idx = read_u16(code, ip + 1);
                    ip += 3;
                    let value = self.pop();
                    self.globals.set(idx, value)?;
                }
                OP_GET_GLOBAL => {
                    let idx = read_u16(code, ip + 1);
                    ip += 3;
                    self.push(self.globals.get(idx))?;
                }
                OP_SET_LOCAL => {
                    let idx = read_u8(code, ip + 1);
                    ip += 2;
                    let value = self.pop();
                    self.stack[bp + idx] = value;
                }
                OP_GET_LOCAL => {
                    let idx = read_u8(code, ip + 1);
                    ip += 2;
                    self.push(self.stack[bp + idx].clone())?;
                }
                OP_GET_BUILTIN => {
                    let idx = read_u8(code, ip + 1);
                    ip += 2;
                    self.push(Value::Builtin(&BUILTINS[idx]))?;
                }
                OP_GET_FREE => {
                    let idx = read_u8(code, ip + 1);
                    ip += 2;
                    self.push(closure.free[idx].clone())?;
                }
                OP_CURRENT_CLOSURE => {
                    ip += 1;
                    self.push(Value::Closure(Rc::clone(&closure)))?;
                }
                OP_ARRAY => {
                    let n = read_u16(code, ip + 1);
                    ip += 3;
                    let items = self.take(n);
                    self.push(Value::array(items))?;
                }
                OP_HASH => {
                    let n = read_u16(code, ip + 1);
                    ip += 3;
                    let flat = self.take(n);
                    self.push(ops::build_hash(flat)?)?;
                }
                OP_INDEX => {
                    ip += 1;
                    let index = self.pop();
                    let left = self.pop();
                    self.push(ops::index(&left, &index)?)?;
                }
                OP_CLOSURE => {
                    let const_idx = read_u16(code, ip + 1);
                    let free_count = read_u8(code, ip + 3);
                    ip += 4;
                    let func = match &self.constants[const_idx] {
                        Value::CompiledFunction(func) => Rc::clone(func),
                        other => return Err(VmError::NotAFunction { type_name: other.type_name() }),
                    };
                    let free = self.take(free_count);
                    self.push(Value::Closure(Rc::new(Closure { func, free })))?;
                }
                OP_CALL => {
                    let argc = read_u8(code, ip + 1);
                    ip += 2;
                    let callee = self.stack[self.sp - 1 - argc].clone();
                    match callee {
                        Value::Closure(callee) => {
                            let func = &callee.func;
                            if argc != func.num_parameters {
                                return Err(VmError::WrongArgumentCount {
                                    want: func.num_parameters,
                                    got: argc,
                                });
                            }
                            if self.frames.len() >= MAX_FRAMES {
                                return Err(VmError::FrameOverflow);
                            }
                            let base_pointer = self.sp - argc;
                            let new_sp = base_pointer + func.num_locals;
                            if new_sp >= STACK_SIZE {
                                return Err(VmError::StackOverflow);
                            }
                            for slot in &mut self.stack[self.sp..new_sp] {
                                *slot = Value::Null;
                            }
                            self.sp = new_sp;

                            if let Some(caller) = self.frames.last_mut() {
                                caller.ip = ip;
                            }
                            self.frames.push(Frame::new(Rc::clone(&callee), base_pointer));
                            trace!(depth = self.frames.len(), base_pointer, "push frame");

                            closure = callee;
                            ip = 0;
                            bp = base_pointer;
                        }
                        Value::Builtin(builtin) => {
                            let result = builtin.call(&self.stack[self.sp - argc..self.sp]);
                            self.take(argc + 1);
                            self.push(result)?;
                        }
                        other => {
                            return Err(VmError::NotCallable { type_name: other.type_name() });
                        }
                    }
                }
                OP_RETURN_VALUE | OP_RETURN => {
                    let value = if op == OP_RETURN_VALUE { self.pop() } else { Value::Null };
                    self.frames.pop();

                    let Some(caller) = self.frames.last() else {
                        // `return` at top level ends the program
                        self.last_popped = value;
                        self.sp = 0;
                        break;
                    };
                    let (caller_closure, caller_ip, caller_bp) =
                        (Rc::clone(&caller.closure), caller.ip, caller.base_pointer);

                    // Drop the callee, its arguments and locals
                    self.take(self.sp - (bp - 1));
                    self.push(value)?;
                    trace!(depth = self.frames.len(), "pop frame");

                    closure = caller_closure;
                    ip = caller_ip;
                    bp = caller_bp;
                }
                _ => return Err(VmError::UnknownOpcode { op }),
            }
        }

        debug!(sp = self.sp, globals = self.globals.len(), "vm halted");
        Ok(())
    }
}
