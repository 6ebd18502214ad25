//! Persistent evaluation session and the interactive prompt built on it.

use std::fmt;

use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Completer, Editor, Helper, Highlighter, Hinter};
use tracing::debug;

use crate::ast::{Program, Stmt};
use crate::compiler::{CompileError, CompileState, Compiler};
use crate::diagnostic::Diagnostic;
use crate::diagnostic::ansi::AnsiRenderer;
use crate::interpreter::{Interpreter, RuntimeError};
use crate::lexer::{self, LexError};
use crate::object::Value;
use crate::parser::{self, ParseError};
use crate::vm::{Globals, Vm, VmError};

const PROMPT: &str = ">> ";

/// Which backend executes programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Engine {
    /// Compile to bytecode and run on the stack VM
    #[default]
    Vm,
    /// Walk the syntax tree directly
    Eval,
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Engine::Vm => write!(f, "vm"),
            Engine::Eval => write!(f, "eval"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error("{}", join_messages(.0))]
    Parse(Vec<ParseError>),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Vm(#[from] VmError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

fn join_messages(errors: &[ParseError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

impl SessionError {
    /// One diagnostic per underlying error, with `source` attached for snippets.
    pub fn diagnostics(&self, source: &str) -> Vec<Diagnostic> {
        let diags = match self {
            SessionError::Lex(e) => vec![Diagnostic::from(e)],
            SessionError::Parse(errors) => errors.iter().map(Diagnostic::from).collect(),
            SessionError::Compile(e) => vec![Diagnostic::from(e)],
            SessionError::Vm(e) => vec![Diagnostic::from(e)],
            SessionError::Runtime(e) => vec![Diagnostic::from(e)],
        };
        diags.into_iter().map(|d| d.with_source(source)).collect()
    }
}

/// Lex and parse a whole source text.
pub fn parse_source(source: &str) -> Result<Program, SessionError> {
    let tokens = lexer::lex(source)?;
    let (program, errors) = parser::parse(tokens);
    if !errors.is_empty() {
        return Err(SessionError::Parse(errors));
    }
    Ok(program)
}

/// Whether a program yields a value: it ends in an expression statement or
/// contains a top-level `return`.
pub fn ends_in_value(program: &Program) -> bool {
    matches!(program.statements.last(), Some(Stmt::Expr(_) | Stmt::Return(_)))
        || program.statements.iter().any(|s| matches!(s, Stmt::Return(_)))
}

/// State that outlives a single input: symbols, constants and globals for
/// the VM, or the root environment for the evaluator.
pub struct Session {
    engine: Engine,
    compile_state: CompileState,
    globals: Globals,
    interpreter: Interpreter,
}

impl Session {
    pub fn new(engine: Engine) -> Self {
        Session {
            engine,
            compile_state: CompileState::new(),
            globals: Globals::new(),
            interpreter: Interpreter::new(),
        }
    }

    pub fn engine(&self) -> Engine {
        self.engine
    }

    /// Run one unit of source. Returns the value of a trailing expression
    /// (or `return`) statement, `None` when the unit ends in `let`.
    pub fn eval(&mut self, source: &str) -> Result<Option<Value>, SessionError> {
        let program = parse_source(source)?;
        let value = self.run(&program)?;
        Ok(ends_in_value(&program).then_some(value))
    }

    /// Run an already parsed program and return the last value it produced.
    pub fn run(&mut self, program: &Program) -> Result<Value, SessionError> {
        debug!(engine = %self.engine, statements = program.statements.len(), "session run");
        match self.engine {
            Engine::Vm => {
                // A unit that fails to compile leaves no symbols or constants behind
                let checkpoint = self.compile_state.clone();
                let bytecode = match Compiler::new(&mut self.compile_state).compile(program) {
                    Ok(bytecode) => bytecode,
                    Err(e) => {
                        self.compile_state = checkpoint;
                        return Err(e.into());
                    }
                };
                let mut vm = Vm::new(bytecode, &mut self.globals);
                vm.run()?;
                Ok(vm.last_popped().clone())
            }
            Engine::Eval => Ok(self.interpreter.eval_program(program)?),
        }
    }
}

// ---- Interactive prompt ----

#[derive(Completer, Helper, Highlighter, Hinter)]
struct MonkeyHelper;

impl Validator for MonkeyHelper {
    fn validate(&self, ctx: &mut ValidationContext<'_>) -> rustyline::Result<ValidationResult> {
        if is_balanced(ctx.input()) {
            Ok(ValidationResult::Valid(None))
        } else {
            Ok(ValidationResult::Incomplete)
        }
    }
}

/// Whether every bracket opened outside a string literal is closed.
fn is_balanced(input: &str) -> bool {
    let mut depth: i64 = 0;
    let mut in_string = false;
    for c in input.chars() {
        match c {
            '"' => in_string = !in_string,
            _ if in_string => {}
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    // Extra closers are a parse error, not a reason to keep reading
    depth <= 0 && !in_string
}

/// Read-eval-print loop until EOF.
pub fn start(engine: Engine, use_color: bool) -> anyhow::Result<()> {
    let mut editor: Editor<MonkeyHelper, DefaultHistory> = Editor::new()?;
    editor.set_helper(Some(MonkeyHelper));
    let renderer = AnsiRenderer { use_color };
    let mut session = Session::new(engine);

    println!("Monkey {} ({} engine). Ctrl-D to exit.", env!("CARGO_PKG_VERSION"), engine);

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        editor.add_history_entry(line.as_str())?;

        match session.eval(&line) {
            Ok(Some(value)) => println!("{}", value),
            Ok(None) => {}
            Err(e) => {
                for d in e.diagnostics(&line) {
                    eprint!("{}", renderer.render(&d));
                }
            }
        }
    }
    Ok(())
}
