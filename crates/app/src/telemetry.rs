//! Tracing subscriber setup and thread spawning.

use std::{
    borrow::Cow,
    io::{self, Write},
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use tracing_subscriber::{EnvFilter, fmt, fmt::MakeWriter, prelude::*};

/// Set while the console is in raw mode and needs explicit carriage returns.
static RAW_CONSOLE: AtomicBool = AtomicBool::new(false);

/// Install the global subscriber. `RUST_LOG` overrides the default level.
pub(crate) fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(fmt::time::uptime())
                .with_writer(ConsoleWriter)
                .with_filter(env_filter),
        )
        .try_init();
}

pub(crate) fn set_raw_console(raw: bool) {
    RAW_CONSOLE.store(raw, Ordering::SeqCst);
}

/// Stdout writer that turns `\n` into `\r\n` while the terminal is raw.
struct ConsoleWriter;

impl<'a> MakeWriter<'a> for ConsoleWriter {
    type Writer = ConsoleLine;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleLine(io::stdout())
    }
}

struct ConsoleLine(io::Stdout);

impl Write for ConsoleLine {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !RAW_CONSOLE.load(Ordering::SeqCst) {
            return self.0.write(buf);
        }
        self.0.write_all(&to_crlf(buf))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn to_crlf(buf: &[u8]) -> Cow<'_, [u8]> {
    if !buf.contains(&b'\n') {
        return Cow::Borrowed(buf);
    }
    let mut out = Vec::with_capacity(buf.len() + 8);
    let mut previous = 0u8;
    for &byte in buf {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    Cow::Owned(out)
}

/// Spawn a named thread that logs through the caller's dispatcher.
pub(crate) fn spawn_thread<F, T>(name: impl Into<String>, f: F) -> io::Result<thread::JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let dispatch = tracing::dispatcher::get_default(|current| current.clone());
    thread::Builder::new()
        .name(name.into())
        .spawn(move || tracing::dispatcher::with_default(&dispatch, f))
}
