#![allow(dead_code)]

use std::sync::Arc;

use phpvm_core::ast::build::script;
use phpvm_core::ast::AstNode;
use phpvm_core::vm::{BufferSink, Value};
use phpvm_core::{compile, RunSummary, RuntimeOptions, VM};

/// Compile `body` as `test.php`, run it, and return everything it printed.
pub fn run(body: Vec<AstNode>) -> (String, RunSummary) {
    run_with(RuntimeOptions::default(), body)
}

pub fn run_with(options: RuntimeOptions, body: Vec<AstNode>) -> (String, RunSummary) {
    let unit = compile(&script(body), "test.php").expect("compile");
    let out = Arc::new(BufferSink::new());
    let mut vm = VM::with_options(options).expect("vm").with_output(out.clone());
    vm.load(&unit).expect("load unit");
    let summary = vm.run();
    (out.contents_lossy(), summary)
}

/// Output of a run that must finish cleanly.
pub fn output(body: Vec<AstNode>) -> String {
    let (out, summary) = run(body);
    assert!(summary.failure.is_none(), "run failed: {:?}\noutput:\n{}", summary.failure, out);
    out
}

pub fn global(summary: &RunSummary, name: &str) -> Value {
    summary.globals.get(name).cloned().unwrap_or_else(|| panic!("global ${} is not defined", name))
}

pub fn global_int(summary: &RunSummary, name: &str) -> i64 {
    match global(summary, name) {
        Value::Int(i) => i,
        other => panic!("${} is {}, expected int", name, other.type_name()),
    }
}

pub fn uncaught_class(summary: &RunSummary) -> String {
    match &summary.failure {
        Some(phpvm_core::vm::Failure::Uncaught { class, .. }) => class.clone(),
        other => panic!("expected an uncaught exception, got {:?}", other),
    }
}
