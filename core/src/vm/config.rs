//! file: core/src/vm/config.rs
//! description: runtime options and their environment overrides.

use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub max_call_depth: usize,
    /// Abort after this many executed instructions.
    pub max_steps: Option<u64>,
    /// Also print guest warnings through the output sink.
    pub display_warnings: bool,
    /// Log every dispatched instruction at `trace` level.
    pub trace: bool,
    /// Stack size for launched task threads, in bytes.
    pub task_stack_size: usize,
    /// File name used in traces when a frame has none.
    pub script_name: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            max_call_depth: 512,
            max_steps: None,
            display_warnings: false,
            trace: false,
            task_stack_size: 8 * 1024 * 1024,
            script_name: "Standard input code".to_string(),
        }
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("ignoring {}={:?}: not a valid value", key, raw);
            None
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let raw = std::env::var(key).ok()?;
    Some(matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

impl RuntimeOptions {
    /// Defaults overridden by `PHPVM_*` environment variables.
    pub fn from_env() -> Self {
        let mut opts = RuntimeOptions::default();
        if let Some(depth) = env_parse("PHPVM_MAX_CALL_DEPTH") {
            opts.max_call_depth = depth;
        }
        if let Some(steps) = env_parse("PHPVM_MAX_STEPS") {
            opts.max_steps = Some(steps);
        }
        if let Some(flag) = env_flag("PHPVM_DISPLAY_WARNINGS") {
            opts.display_warnings = flag;
        }
        if let Some(flag) = env_flag("PHPVM_TRACE") {
            opts.trace = flag;
        }
        if let Some(size) = env_parse("PHPVM_TASK_STACK") {
            opts.task_stack_size = size;
        }
        opts
    }
}
