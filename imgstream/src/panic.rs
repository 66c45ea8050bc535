//! Panic reporting for worker threads.
//!
//! Task panics are caught by the worker pool so the worker survives, but the
//! default hook only writes to stderr. This module installs a hook that also
//! records the panic through `tracing` (so it lands in the log file with the
//! worker thread name) and then chains to the previous hook.

use std::any::Any;
use std::panic::{self, PanicHookInfo};
use std::sync::OnceLock;

/// Set once the hook has been installed.
static HOOK_INSTALLED: OnceLock<()> = OnceLock::new();

/// Initialize the panic hook.
///
/// Should be called once early in startup, after logging is initialized.
/// Subsequent calls are ignored.
pub fn init() {
    if HOOK_INSTALLED.set(()).is_err() {
        return;
    }

    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |info: &PanicHookInfo<'_>| {
        log_panic(info);
        original_hook(info);
    }));
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let thread = std::thread::current();
    let thread_name = thread.name().unwrap_or("<unnamed>");
    let location = info
        .location()
        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
        .unwrap_or_else(|| "<unknown>".to_string());

    tracing::error!(
        thread = thread_name,
        location = %location,
        message = %panic_message(info.payload()),
        "Panic"
    );
}

/// Extract a readable message from a panic payload.
///
/// Panics raised with a literal or a formatted string carry `&str` or
/// `String` payloads; anything else is reported generically.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
