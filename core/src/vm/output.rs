//! file: core/src/vm/output.rs
//! description: injectable program output sinks.

use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Destination for everything the guest program prints.
pub trait OutputSink: Send + Sync {
    fn write(&self, bytes: &[u8]);

    fn flush(&self) {}
}

/// Writes straight to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn write(&self, bytes: &[u8]) {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        if let Err(e) = lock.write_all(bytes) {
            log::error!("failed to write program output: {}", e);
        }
    }

    fn flush(&self) {
        if let Err(e) = std::io::stdout().flush() {
            log::error!("failed to flush program output: {}", e);
        }
    }
}

/// Collects output in memory; used by embedding hosts and tests.
#[derive(Debug, Default)]
pub struct BufferSink {
    buf: Mutex<Vec<u8>>,
}

impl BufferSink {
    pub fn new() -> Self {
        BufferSink::default()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn contents_lossy(&self) -> String {
        String::from_utf8_lossy(&self.contents()).into_owned()
    }

    pub fn clear(&self) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }
}

impl OutputSink for BufferSink {
    fn write(&self, bytes: &[u8]) {
        self.buf.lock().unwrap_or_else(PoisonError::into_inner).extend_from_slice(bytes);
    }
}
