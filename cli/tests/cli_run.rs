use std::fs;
use std::path::PathBuf;

use assert_cmd::Command;
use phpvm_core::ast::build::*;
use phpvm_core::ast::{to_json, AstNode, BinaryOperator as B};

/// Write `body` as a JSON syntax tree into `dir` and return its path.
fn write_program(dir: &tempfile::TempDir, name: &str, body: Vec<AstNode>) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, to_json(&script(body)).expect("serialize")).expect("write program");
    path
}

fn phpvm() -> Command {
    let mut cmd = Command::cargo_bin("phpvm").expect("phpvm binary");
    cmd.env_remove("PHPVM_MAX_STEPS").env_remove("PHPVM_DISPLAY_WARNINGS").env_remove("PHPVM_TRACE");
    cmd
}

#[test]
fn run_prints_program_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(
        &dir,
        "hello.json",
        vec![
            func("greet", vec![param("who")], vec![ret(bin(string("Hello, "), B::Concat, var("who")))]),
            echo_all(vec![call("greet", vec![string("world")]), string("\n")]),
        ],
    );
    phpvm().arg("run").arg(&path).assert().success().stdout("Hello, world\n");
}

#[test]
fn exit_status_comes_from_the_program() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "exit.json", vec![echo(string("bye")), exit(Some(int(7)))]);
    phpvm().arg("run").arg(&path).assert().code(7).stdout("bye");
}

#[test]
fn uncaught_exceptions_exit_with_255() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "throw.json", vec![throw(new_object("RuntimeException", vec![string("boom")]))]);
    let out = phpvm().arg("run").arg(&path).assert().code(255).get_output().stdout.clone();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("Uncaught RuntimeException: boom"), "{}", text);
}

#[test]
fn max_steps_stops_a_runaway_loop() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "loop.json", vec![while_(boolean(true), vec![])]);
    phpvm().arg("run").arg("--max-steps").arg("5000").arg(&path).assert().code(255);
}

#[test]
fn warnings_flag_prints_warnings_into_the_output() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "warn.json", vec![echo(var("missing"))]);
    let out = phpvm().arg("run").arg("--warnings").arg(&path).assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("Warning: Undefined variable $missing"), "{}", text);
}

#[test]
fn compile_errors_are_reported_on_stderr() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "dup.json", vec![func("f", vec![], vec![]), func("f", vec![], vec![])]);
    let out = phpvm().arg("run").arg(&path).assert().code(255).get_output().stderr.clone();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("Cannot redeclare function f()"), "{}", text);
}

#[test]
fn unreadable_input_is_a_usage_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").expect("write");
    phpvm().arg("run").arg(&path).assert().code(2);
    phpvm().arg("run").arg(dir.path().join("absent.json")).assert().code(2);
}

#[test]
fn dump_lists_instructions() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(
        &dir,
        "dump.json",
        vec![func("twice", vec![param("n")], vec![ret(bin(var("n"), B::Mul, int(2)))]), echo(call("twice", vec![int(4)]))],
    );
    let out = phpvm().arg("dump").arg(&path).assert().success().get_output().stdout.clone();
    let text = String::from_utf8_lossy(&out);
    assert!(text.contains("function twice($n)"), "{}", text);
    assert!(text.contains("MUL"), "{}", text);
    assert!(text.contains("RETURN"), "{}", text);
}

#[test]
fn dump_as_json_is_machine_readable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = write_program(&dir, "json.json", vec![echo(int(1))]);
    let out = phpvm().args(["dump", "--format", "json"]).arg(&path).assert().success().get_output().stdout.clone();
    let value: serde_json::Value = serde_json::from_slice(&out).expect("valid json");
    assert!(value.get("main").is_some(), "{}", value);
}
