/// cli/src/disassembler.rs
/// description: human-readable listing of a compiled unit, used by
/// `phpvm dump`.

use std::fmt::Write;

use phpvm_core::ir::{CompiledClass, CompiledFunction, CompiledUnit, Constant, Operand, OperandType, ParamDefault};

/// Render every function body in `unit`: top-level code first, then hoisted
/// functions, then class methods. Closures follow the function that owns
/// them.
pub fn disassemble(unit: &CompiledUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; unit {}", unit.file);
    let _ = writeln!(out, "; {} function(s), {} class(es)", unit.functions.len(), unit.classes.len());
    function(&mut out, &unit.main);
    for f in &unit.functions {
        function(&mut out, f);
    }
    for c in &unit.classes {
        class(&mut out, c);
    }
    out
}

fn class(out: &mut String, c: &CompiledClass) {
    let _ = write!(out, "\nclass {}", c.name);
    if let Some(parent) = &c.parent {
        let _ = write!(out, " extends {}", parent);
    }
    if !c.interfaces.is_empty() {
        let _ = write!(out, " implements {}", c.interfaces.join(", "));
    }
    let _ = writeln!(out, " ({:?}, line {})", c.kind, c.line);
    for k in &c.constants {
        let _ = writeln!(out, "  const {}", k.name);
    }
    for p in &c.properties {
        let _ = writeln!(out, "  {}${}", if p.is_static { "static " } else { "" }, p.name);
    }
    for m in &c.methods {
        function(out, &m.func);
    }
}

fn constant_at<'a>(func: &'a CompiledFunction, op: &Operand) -> Option<&'a Constant> {
    match op.kind {
        OperandType::Const => func.constants.get(op.index as usize),
        _ => None,
    }
}

fn function(out: &mut String, func: &CompiledFunction) {
    let params: Vec<String> = func
        .params
        .iter()
        .map(|p| {
            let mut s = String::new();
            if let Some(hint) = &p.type_hint {
                let _ = write!(s, "{} ", hint);
            }
            if p.by_ref {
                s.push('&');
            }
            if p.variadic {
                s.push_str("...");
            }
            let _ = write!(s, "${}", p.name);
            match &p.default {
                ParamDefault::None => {}
                ParamDefault::Constant(c) => {
                    let _ = write!(s, " = {}", c);
                }
                ParamDefault::Code => s.push_str(" = <expr>"),
            }
            s
        })
        .collect();
    let _ = writeln!(out, "\nfunction {}({}) ; {}:{}", func.name, params.join(", "), func.file, func.line);
    let _ = writeln!(
        out,
        "; cvs: [{}], tmps: {}{}",
        func.cv_names.iter().map(|n| format!("${}", n)).collect::<Vec<_>>().join(", "),
        func.num_tmps,
        if func.flags.generator { ", generator" } else { "" }
    );

    let mut line = 0;
    for (ip, insn) in func.instructions.iter().enumerate() {
        let mut text = format!("{:>4}  {}", ip, insn);
        let consts: Vec<String> = [insn.op1(), insn.op2()]
            .iter()
            .filter_map(|op| constant_at(func, op).map(|c| format!("#{}={}", op.index, c)))
            .collect();
        if !consts.is_empty() {
            text = format!("{:<56} ; {}", text, consts.join(" "));
        }
        if insn.line != line && insn.line != 0 {
            line = insn.line;
            text = format!("{:<72} L{}", text, line);
        }
        let _ = writeln!(out, "{}", text.trim_end());
    }

    for (i, region) in func.try_regions.iter().enumerate() {
        let _ = writeln!(
            out,
            "; try[{}] {}..{} catch {} finally {}",
            i,
            region.try_start,
            region.end,
            region.catch_start.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            region.finally_start.map(|f| f.to_string()).unwrap_or_else(|| "-".to_string())
        );
    }
    for closure in &func.closures {
        function(out, closure);
    }
}
