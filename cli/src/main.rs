mod disassembler;
mod output;

use std::fs;
use std::process::ExitCode;

use clap::{Arg, ArgAction, ArgMatches, Command};
use phpvm_core::ast::{self, AstNode};
use phpvm_core::{compile, CompiledUnit, RuntimeOptions, VM};

use output::{level_for_verbosity, report_error, ConsoleLogger};

/// Exit status for input the CLI could not read or parse.
const EXIT_USAGE: u8 = 2;
/// Exit status for a unit that failed to compile or link, like a PHP fatal.
const EXIT_FATAL: u8 = 255;

fn main() -> ExitCode {
    let cli = Command::new("phpvm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compile and run PHP programs from a JSON syntax tree");

    let cli = setup_cli(cli);
    let matches = cli.get_matches();
    dispatch_commands(&matches)
}

/// Sets up the CLI with subcommands and arguments.
fn setup_cli(cli: Command) -> Command {
    cli.arg(
        Arg::new("verbose")
            .help("Raise the log level (warn, info, debug, trace)")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .global(true),
    )
    .subcommand(
        Command::new("run")
            .about("Compile and execute a program")
            .arg(
                Arg::new("file")
                    .help("The JSON AST of the program")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("trace")
                    .help("Log every executed instruction")
                    .long("trace")
                    .action(ArgAction::SetTrue),
            )
            .arg(
                Arg::new("max-steps")
                    .help("Abort after this many instructions")
                    .long("max-steps")
                    .value_parser(clap::value_parser!(u64))
                    .value_name("N"),
            )
            .arg(
                Arg::new("warnings")
                    .help("Print warnings and notices into the program output")
                    .long("warnings")
                    .action(ArgAction::SetTrue),
            ),
    )
    .subcommand(
        Command::new("dump")
            .about("Print the compiled instruction listing")
            .arg(
                Arg::new("file")
                    .help("The JSON AST of the program")
                    .required(true)
                    .index(1),
            )
            .arg(
                Arg::new("format")
                    .help("Listing format")
                    .short('f')
                    .long("format")
                    .value_parser(["text", "json"])
                    .default_value("text")
                    .value_name("FORMAT"),
            ),
    )
}

/// Dispatches the command based on the parsed arguments.
fn dispatch_commands(matches: &ArgMatches) -> ExitCode {
    let verbosity = matches.get_count("verbose");
    match matches.subcommand() {
        Some(("run", sub_m)) => {
            let trace = sub_m.get_flag("trace");
            // tracing is logged at trace level, so make sure it is shown
            let level = if trace { level_for_verbosity(3) } else { level_for_verbosity(verbosity) };
            ConsoleLogger::new(level).install();

            let file = sub_m.get_one::<String>("file").map(String::as_str).unwrap_or_default();
            let mut options = RuntimeOptions::from_env();
            options.script_name = file.to_string();
            options.trace |= trace;
            options.display_warnings |= sub_m.get_flag("warnings");
            if let Some(steps) = sub_m.get_one::<u64>("max-steps") {
                options.max_steps = Some(*steps);
            }
            run(file, options)
        }
        Some(("dump", sub_m)) => {
            ConsoleLogger::new(level_for_verbosity(verbosity)).install();
            let file = sub_m.get_one::<String>("file").map(String::as_str).unwrap_or_default();
            let format = sub_m.get_one::<String>("format").map(String::as_str).unwrap_or("text");
            dump(file, format)
        }
        _ => {
            eprintln!("No valid subcommand was used. Use --help for more information.");
            ExitCode::from(EXIT_USAGE)
        }
    }
}

fn load_ast(file: &str) -> Result<AstNode, ExitCode> {
    let source = fs::read_to_string(file).map_err(|e| {
        eprintln!("Could not read {}: {}", file, e);
        ExitCode::from(EXIT_USAGE)
    })?;
    ast::from_json(&source).map_err(|e| {
        eprintln!("Invalid syntax tree in {}: {}", file, e);
        ExitCode::from(EXIT_USAGE)
    })
}

fn compile_file(file: &str) -> Result<CompiledUnit, ExitCode> {
    let tree = load_ast(file)?;
    compile(&tree, file).map_err(|e| {
        report_error(&e);
        ExitCode::from(EXIT_FATAL)
    })
}

fn run(file: &str, options: RuntimeOptions) -> ExitCode {
    let unit = match compile_file(file) {
        Ok(unit) => unit,
        Err(code) => return code,
    };
    let mut vm = match VM::with_options(options) {
        Ok(vm) => vm,
        Err(e) => {
            report_error(&phpvm_core::vm::VmError::from(e));
            return ExitCode::from(EXIT_FATAL);
        }
    };
    if let Err(e) = vm.load(&unit) {
        report_error(&phpvm_core::vm::VmError::from(e));
        return ExitCode::from(EXIT_FATAL);
    }
    let summary = vm.run();
    log::info!("{} finished after {} instructions with status {}", file, summary.steps, summary.exit_code);
    ExitCode::from((summary.exit_code & 0xff) as u8)
}

fn dump(file: &str, format: &str) -> ExitCode {
    let unit = match compile_file(file) {
        Ok(unit) => unit,
        Err(code) => return code,
    };
    let listing = match format {
        "json" => match serde_json::to_string_pretty(&unit) {
            Ok(json) => json,
            Err(e) => {
                eprintln!("Could not serialize {}: {}", file, e);
                return ExitCode::from(EXIT_FATAL);
            }
        },
        _ => disassembler::disassemble(&unit),
    };
    println!("{}", listing);
    ExitCode::SUCCESS
}
