use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use monkey::compiler::{self, Bytecode};
use monkey::diagnostic::{ansi::AnsiRenderer, json};
use monkey::object::Value;
use monkey::repl::ends_in_value;
use monkey::{Engine, Session, SessionError, parse_source};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// Syntax tree as JSON
    Ast,
    /// Disassembled instructions and constant pool
    Bytecode,
}

#[derive(Parser)]
#[command(
    name = "monkey",
    version,
    about = "Bytecode compiler and virtual machine for the Monkey language"
)]
struct Cli {
    /// Source file to run; starts the REPL when neither FILE nor -e is given
    file: Option<PathBuf>,

    /// Run CODE instead of a file
    #[arg(short = 'e', long = "eval", value_name = "CODE", conflicts_with = "file")]
    code: Option<String>,

    /// Execution backend
    #[arg(long, value_enum, default_value_t = Engine::Vm)]
    engine: Engine,

    /// Print an intermediate form instead of running
    #[arg(long, value_enum)]
    emit: Option<Emit>,

    /// Report errors as JSON, one object per line
    #[arg(long)]
    json: bool,

    /// Debug logging for this crate (overrides MONKEY_LOG)
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("monkey=debug")
    } else {
        EnvFilter::try_from_env("MONKEY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let use_color = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();

    let source = match (&cli.code, &cli.file) {
        (Some(code), _) => code.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("cannot read {}", path.display()))?,
        (None, None) => {
            monkey::repl::start(cli.engine, use_color)?;
            return Ok(ExitCode::SUCCESS);
        }
    };

    match execute(&cli, &source) {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            report(&e, &source, cli.json, use_color);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn execute(cli: &Cli, source: &str) -> anyhow::Result<()> {
    let program = parse_source(source)?;
    match cli.emit {
        Some(Emit::Ast) => {
            println!("{}", serde_json::to_string_pretty(&program)?);
        }
        Some(Emit::Bytecode) => {
            let bytecode = compiler::compile(&program).map_err(SessionError::from)?;
            print!("{}", disassemble(&bytecode));
        }
        None => {
            let mut session = Session::new(cli.engine);
            let value = session.run(&program)?;
            // Scripts that end in `puts(...)` should not also print `null`
            if !matches!(value, Value::Null) && ends_in_value(&program) {
                println!("{}", value);
            }
        }
    }
    Ok(())
}

fn disassemble(bytecode: &Bytecode) -> String {
    let mut out = bytecode.instructions.to_string();
    if bytecode.constants.is_empty() {
        return out;
    }
    out.push_str("constants:\n");
    for (i, constant) in bytecode.constants.iter().enumerate() {
        match constant {
            Value::CompiledFunction(func) => {
                out.push_str(&format!(
                    "{:4}: fn params={} locals={}\n",
                    i, func.num_parameters, func.num_locals
                ));
                for line in func.instructions.to_string().lines() {
                    out.push_str(&format!("      {}\n", line));
                }
            }
            Value::Text(s) => out.push_str(&format!("{:4}: {:?}\n", i, s)),
            other => out.push_str(&format!("{:4}: {}\n", i, other)),
        }
    }
    out
}

fn report(e: &anyhow::Error, source: &str, as_json: bool, use_color: bool) {
    let Some(session_err) = e.downcast_ref::<SessionError>() else {
        eprintln!("error: {:#}", e);
        return;
    };
    let renderer = AnsiRenderer { use_color };
    for d in session_err.diagnostics(source) {
        if as_json {
            eprintln!("{}", json::render(&d));
        } else {
            eprint!("{}", renderer.render(&d));
        }
    }
}
