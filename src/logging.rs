//! Tracing setup for the binary.
//!
//! Diagnostics go to stderr so stdout stays reserved for command output.
//! A config-supplied log file gets a second, ANSI-free layer written
//! through a non-blocking appender; its guard is handed back to the caller.

use anyhow::Result;
use chrono::Local;
use drive_dedupe::output as out;
use drive_dedupe::platform::open_log_file_secure_append;
use drive_dedupe::{LogLevel, default_log_path, path_has_symlink_ancestor};
use std::fmt;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::fmt::writer::MakeWriter;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Local wall-clock timestamps, `YYYY-MM-DD HH:MM:SS`.
struct LocalStamp;

impl FormatTime for LocalStamp {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn level_filter(lvl: &LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Quiet => LevelFilter::ERROR,
        LogLevel::Normal => LevelFilter::INFO,
        LogLevel::Info => LevelFilter::DEBUG,
        LogLevel::Debug => LevelFilter::TRACE,
    }
}

/// One formatting layer; `json` switches the event format, `ansi` is off for files.
fn layer_for<W>(writer: W, json: bool, ansi: bool) -> BoxedLayer
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let base = tracing_subscriber::fmt::layer()
        .with_timer(LocalStamp)
        .with_target(true)
        .with_ansi(ansi)
        .with_writer(writer);
    if json {
        base.json().boxed()
    } else {
        base.compact().boxed()
    }
}

/// Open the log file for appending, or say on stderr why file logging is off.
fn open_file_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    match path_has_symlink_ancestor(path) {
        Ok(false) => {}
        Ok(true) => {
            eprintln!(
                "Not logging to {}: a parent directory is a symlink.",
                path.display()
            );
            return None;
        }
        Err(e) => {
            eprintln!("Not logging to {}: cannot inspect path ({e}).", path.display());
            return None;
        }
    }
    if let Some(dir) = path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("Not logging to {}: cannot create {} ({e}).", path.display(), dir.display());
        return None;
    }
    match open_log_file_secure_append(path) {
        Ok(file) => Some(tracing_appender::non_blocking(file)),
        Err(e) => {
            eprintln!("Not logging to {}: {e}", path.display());
            None
        }
    }
}

/// Install the global subscriber.
///
/// Returns the appender guard when a file layer was added; it must stay
/// alive until shutdown or buffered lines are lost.
pub fn init_tracing(lvl: &LogLevel, log_file: Option<&Path>, json: bool) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::default().add_directive(level_filter(lvl).into());
    let mut layers: Vec<BoxedLayer> = vec![layer_for(std::io::stderr, json, true)];
    let mut guard = None;

    if let Some(path) = log_file {
        match open_file_writer(path) {
            Some((writer, g)) => {
                layers.push(layer_for(writer, json, false));
                guard = Some(g);
            }
            None => {
                out::print_warn(&format!(
                    "File logging to '{}' is disabled for this run; logs still go to stderr.",
                    path.display()
                ));
                if let Some(def) = default_log_path() {
                    out::print_info(&format!("The default log location is {}", def.display()));
                }
            }
        }
    }

    Registry::default().with(layers).with(filter).try_init()?;
    Ok(guard)
}
