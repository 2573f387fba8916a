//! Ambient logging stack.
//!
//! A `simulator.log` text file is opened for append at construction and
//! receives debug lines; failure to open is non-fatal. Every recovered
//! per-step error (`MemoryError::OutOfBounds`, `UnknownInstruction`,
//! `InvalidImmediateSelector`) is logged via `tracing::warn!` at the point
//! of recovery by the datapath backends.
//!
//! `init_file_logging` builds a `tracing-subscriber` registry with a compact
//! terminal layer plus an optional file layer, as a crate-internal helper
//! rather than a separate workspace member.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Once;

static INIT: Once = Once::new();

/// Installs the global `tracing` subscriber exactly once per process.
/// Opens `log_path` in append mode for the file layer; if that fails,
/// continues with the terminal layer alone — failure to open the log file
/// is non-fatal.
pub fn init_file_logging(log_path: &Path) {
    INIT.call_once(|| {
        use tracing_subscriber::{filter, prelude::*};

        let filter = filter::filter_fn(|meta| meta.level() <= &tracing::Level::DEBUG);

        let terminal_log = tracing_subscriber::fmt::layer()
            .compact()
            .with_file(false)
            .with_target(false)
            .without_time()
            .with_thread_names(false)
            .with_filter(filter.clone());

        let file_log = match OpenOptions::new().create(true).append(true).open(log_path) {
            Ok(file) => {
                let file = std::sync::Mutex::new(file);
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_thread_names(true)
                        .with_writer(move || file.lock().unwrap().try_clone().expect("dup log fd"))
                        .with_filter(filter),
                )
            }
            Err(_) => None,
        };

        let registry = tracing_subscriber::registry().with(terminal_log).with(file_log);
        if registry.try_init().is_err() {
            // Another subscriber (e.g. a host process or test harness) is
            // already installed; non-fatal, same as the log-file-open
            // failure above.
        }
    });
}
