/// cli/src/output.rs
/// description: stderr diagnostics for the CLI. Installs a `log::Log`
/// implementation that styles records with `console` and renders compile
/// and runtime reports.

use std::io::{self, Write};

use console::{Style, Term};
use log::{Level, LevelFilter, Log, Metadata, Record};

use phpvm_core::{generate_error_report, PhpvmErrorExt};

/// Styles for the different kinds of diagnostic line.
pub struct FormatStyle {
    pub info: Style,
    pub warning: Style,
    pub error: Style,
    pub debug: Style,
    pub trace: Style,
}

impl Default for FormatStyle {
    fn default() -> Self {
        FormatStyle {
            info: Style::new().cyan().for_stderr(),
            warning: Style::new().yellow().for_stderr(),
            error: Style::new().red().bold().for_stderr(),
            debug: Style::new().dim().for_stderr(),
            trace: Style::new().magenta().dim().for_stderr(),
        }
    }
}

impl FormatStyle {
    fn for_level(&self, level: Level) -> &Style {
        match level {
            Level::Error => &self.error,
            Level::Warn => &self.warning,
            Level::Info => &self.info,
            Level::Debug => &self.debug,
            Level::Trace => &self.trace,
        }
    }
}

/// `-v` count to the maximum level shown: warn, info, debug, trace.
pub fn level_for_verbosity(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Logger writing one styled line per record to stderr.
pub struct ConsoleLogger {
    level: LevelFilter,
    formatting: FormatStyle,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        ConsoleLogger { level, formatting: FormatStyle::default() }
    }

    /// Install as the global logger. A second call is ignored.
    pub fn install(self) {
        let level = self.level;
        if log::set_boxed_logger(Box::new(self)).is_ok() {
            log::set_max_level(level);
        }
    }

    fn render(&self, record: &Record) -> String {
        let tag = format!("{:<5}", record.level());
        let style = self.formatting.for_level(record.level());
        format!("{} {} {}", style.apply_to(tag), self.formatting.debug.apply_to(record.target()), record.args())
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = self.render(record);
        let mut err = io::stderr().lock();
        let _ = writeln!(err, "{}", line);
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

/// Print a compile or engine error as a styled report on stderr.
pub fn report_error(error: &dyn PhpvmErrorExt) {
    let style = FormatStyle::default();
    let report = generate_error_report(error);
    let term = Term::stderr();
    let _ = term.write_line(&style.error.apply_to(&report).to_string());
}
