use anyhow::{Context, Result};
use podflux_core::config::{LogRotation, LoggingConfig};
use tracing::error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Keeps the file writer alive. Dropping it flushes buffered log lines.
pub struct LogGuard {
    _file: WorkerGuard,
}

fn rotation(config: &LoggingConfig) -> Rotation {
    match config.rotation {
        LogRotation::Minutely => Rotation::MINUTELY,
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    }
}

/// Installs the console and rolling-file subscribers described by `config`.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("failed to create log directory {}", config.directory.display())
    })?;

    let appender = RollingFileAppender::builder()
        .rotation(rotation(config))
        .filename_prefix(&config.file_prefix)
        .max_log_files(config.max_files.max(1))
        .build(&config.directory)
        .context("failed to open rolling log file")?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .with_context(|| format!("invalid log filter '{}'", config.level))?;

    let file_layer = if config.json {
        fmt::layer().json().with_writer(writer).boxed()
    } else {
        fmt::layer().with_ansi(false).with_writer(writer).boxed()
    };
    let layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> =
        vec![fmt::layer().with_target(true).boxed(), file_layer];

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .context("failed to install tracing subscriber")?;

    install_panic_hook();
    Ok(LogGuard { _file: guard })
}

fn install_panic_hook() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let location = info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_default();
        let payload = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_default();
        error!(%location, payload, "Unhandled panic");
        default_hook(info);
    }));
}
