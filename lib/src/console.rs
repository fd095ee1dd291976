//! Output sink abstraction for kernel diagnostics.
//!
//! `klog` never writes to a concrete device directly; it formats into a
//! stack buffer and hands the bytes to whichever [`ConsoleSink`] has been
//! registered. This keeps the allocator, scheduler and IPC crates free of
//! any dependency on a UART driver, and lets tests run with a sink that
//! simply discards (or records, for assertions) the output.

use spin::Once;

/// A destination for raw diagnostic bytes.
pub trait ConsoleSink: Sync {
    fn write_bytes(&self, bytes: &[u8]);
}

/// Sink that discards everything written to it. The default until the
/// kernel binary registers a real one.
pub struct NullSink;

impl ConsoleSink for NullSink {
    fn write_bytes(&self, _bytes: &[u8]) {}
}

static SINK: Once<&'static dyn ConsoleSink> = Once::new();
static NULL_SINK: NullSink = NullSink;

/// Register the process-wide console sink. Subsequent calls are ignored,
/// matching the lazily-initialized-once pattern used for other kernel
/// service tables.
pub fn set_sink(sink: &'static dyn ConsoleSink) {
    SINK.call_once(|| sink);
}

pub fn sink() -> &'static dyn ConsoleSink {
    *SINK.call_once(|| &NULL_SINK)
}
