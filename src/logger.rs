//! Logger configuration.

use std::fmt;
use std::fs::{self, OpenOptions};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, Event, Level, Subscriber};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, SystemTime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{filter, Layer, Registry};

use crate::config::Settings;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("cannot open log file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// One event per line: `[<timestamp>] [LEVEL] <message>`.
///
/// Spans are not printed here; the stdout layer carries the request id.
pub struct LineFormat;

impl<S, N> FormatEvent<S, N> for LineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        write!(writer, "[")?;
        SystemTime.format_time(&mut writer)?;
        write!(writer, "] [{}] ", event.metadata().level())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// DEBUG when `debug` is set, INFO otherwise.
pub fn level_filter(debug: bool) -> filter::LevelFilter {
    filter::LevelFilter::from_level(if debug { Level::DEBUG } else { Level::INFO })
}

/// Sets the logger global features for the application.
/// * `Logging.LogFilePath` - append-only log file, parent directories are created.
/// * `Logging.DebugMode` - lets DEBUG lines through.
/// * `Logging.LogToStdout` - adds a compact console layer.
/// # Errors
/// 1) Returns an error if the log directory cannot be created or the log file cannot be opened.
/// 2) Returns an error if the global subscriber cannot be set.
pub fn set_logger(settings: &Settings) -> Result<(), LoggerError> {
    let lf = level_filter(settings.debug);

    // If stdout logging is enabled, set up the stdout logging layer.
    let lys = if settings.log_to_stdout {
        Some(tracing_subscriber::fmt::layer().compact().with_ansi(true).with_filter(lf))
    } else {
        None
    };

    let path = &settings.log_file;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    // Append mode + one write per formatted line keeps concurrent lines whole.
    let f = OpenOptions::new().append(true).create(true).open(path)?;
    let lyf = tracing_subscriber::fmt::layer()
        .event_format(LineFormat)
        .with_ansi(false)
        .with_writer(Arc::new(f))
        .with_filter(lf);

    let s = Registry::default().with(lys).with(lyf);
    tracing::subscriber::set_global_default(s)?;
    info!("Logger initialized, log level set to: {}", lf);
    debug!("Logging to file: {}", path.display());
    Ok(())
}
