use std::io::Write;
use std::process::{Command, Output};

fn monkey() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_monkey"));
    cmd.env_remove("MONKEY_LOG").env("NO_COLOR", "1");
    cmd
}

fn run(args: &[&str]) -> Output {
    monkey().args(args).output().expect("failed to run monkey")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).trim().to_string()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).to_string()
}

// --- Inline code ---

#[test]
fn inline_prints_trailing_value() {
    let out = run(&["-e", "let a = 5; a * 2 + 1"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "11");
}

#[test]
fn inline_let_only_prints_nothing() {
    let out = run(&["-e", "let a = 5;"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "");
}

#[test]
fn inline_closures_and_builtins() {
    let src = "let newAdder = fn(x) { fn(y) { x + y } }; let addTwo = newAdder(2); push([addTwo(1)], addTwo(3))";
    let out = run(&["-e", src]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "[3, 5]");
}

#[test]
fn inline_puts_does_not_echo_null() {
    let out = run(&["-e", r#"puts("hello", 42)"#]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(String::from_utf8_lossy(&out.stdout), "hello 42\n");
}

#[test]
fn inline_hash_display_sorted() {
    let out = run(&["-e", r#"{"b": 2, "a": 1, 3: true}"#]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "{3: true, a: 1, b: 2}");
}

// --- Engines agree ---

#[test]
fn engines_agree_on_fibonacci() {
    let src = "let fib = fn(n) { if (n < 2) { return n; } fib(n - 1) + fib(n - 2) }; fib(20)";
    let vm = run(&["-e", src, "--engine", "vm"]);
    let eval = run(&["-e", src, "--engine", "eval"]);
    assert!(vm.status.success(), "stderr: {}", stderr(&vm));
    assert!(eval.status.success(), "stderr: {}", stderr(&eval));
    assert_eq!(stdout(&vm), "6765");
    assert_eq!(stdout(&eval), "6765");
}

// --- Files ---

#[test]
fn file_mode_runs_program() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "// sums an array").unwrap();
    writeln!(file, "let sum = fn(arr, acc) {{").unwrap();
    writeln!(file, "  if (len(arr) == 0) {{ acc }} else {{ sum(rest(arr), acc + first(arr)) }}").unwrap();
    writeln!(file, "}};").unwrap();
    writeln!(file, "sum([1, 2, 3, 4], 0)").unwrap();
    file.flush().unwrap();

    let out = run(&[file.path().to_str().unwrap()]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "10");
}

#[test]
fn missing_file_fails() {
    let out = run(&["/nonexistent/definitely/missing.mk"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("cannot read"), "stderr: {}", stderr(&out));
}

// --- Emit ---

#[test]
fn emit_ast_is_json() {
    let out = run(&["-e", "let x = 1;", "--emit", "ast"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let v: serde_json::Value = serde_json::from_str(&stdout(&out)).expect("valid JSON");
    assert_eq!(v["statements"][0]["Let"]["name"], "x");
}

#[test]
fn emit_bytecode_disassembles() {
    let out = run(&["-e", "1 + 2", "--emit", "bytecode"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("0000 OpConstant 0"), "got: {}", text);
    assert!(text.contains("0006 OpAdd"), "got: {}", text);
    assert!(text.contains("0007 OpPop"), "got: {}", text);
    assert!(text.contains("constants:"), "got: {}", text);
}

#[test]
fn emit_bytecode_lists_function_constants() {
    let out = run(&["-e", "fn(a) { a }", "--emit", "bytecode"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let text = stdout(&out);
    assert!(text.contains("fn params=1 locals=1"), "got: {}", text);
    assert!(text.contains("OpGetLocal 0"), "got: {}", text);
    assert!(text.contains("OpClosure 0 0"), "got: {}", text);
}

// --- Errors ---

#[test]
fn parse_error_renders_snippet() {
    let out = run(&["-e", "let x = ;"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[MK-P"), "stderr: {}", err);
    assert!(err.contains("--> 1:9"), "stderr: {}", err);
    assert!(err.contains("let x = ;"), "stderr: {}", err);
    assert!(!err.contains("\x1b["), "colour with NO_COLOR set: {}", err);
}

#[test]
fn compile_error_reports_undefined_variable() {
    let out = run(&["-e", "foo + 1"]);
    assert_eq!(out.status.code(), Some(1));
    let err = stderr(&out);
    assert!(err.contains("error[MK-C002]: undefined variable foo"), "stderr: {}", err);
}

#[test]
fn runtime_error_json() {
    let out = run(&["-e", "1 / 0", "--json"]);
    assert_eq!(out.status.code(), Some(1));
    let line = stderr(&out);
    let v: serde_json::Value = serde_json::from_str(line.trim()).expect("valid JSON");
    assert_eq!(v["severity"], "error");
    assert_eq!(v["message"], "division by zero");
}

#[test]
fn eval_engine_runtime_error() {
    let out = run(&["-e", "foo", "--engine", "eval"]);
    assert_eq!(out.status.code(), Some(1));
    assert!(stderr(&out).contains("undefined variable foo"), "stderr: {}", stderr(&out));
}

#[test]
fn builtin_error_is_a_value_not_a_failure() {
    let out = run(&["-e", "len(1)"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "ERROR: argument to `len` not supported, got INTEGER");
}

#[test]
fn exit_builtin_sets_status() {
    let out = run(&["-e", "puts(\"bye\"); exit(3); puts(\"unreachable\")"]);
    assert_eq!(out.status.code(), Some(3));
    assert_eq!(stdout(&out), "bye");
}

// --- REPL ---

#[test]
fn repl_reads_stdin_until_eof() {
    let mut child = monkey()
        .stdin(std::process::Stdio::piped())
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .spawn()
        .expect("failed to spawn monkey");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"let a = 20;\na + 22\n")
        .unwrap();
    let out = child.wait_with_output().unwrap();
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert!(stdout(&out).contains("42"), "stdout: {}", stdout(&out));
}
