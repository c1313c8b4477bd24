use {
    anyhow::Context as _,
    chrono::Local,
    std::path::{Path, PathBuf},
    tracing::info,
    tracing_appender::non_blocking::WorkerGuard,
    tracing_subscriber::{
        filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    },
};

pub const ERROR_LOG_NAME: &str = "errors.log";

/// Keeps the background log writers alive. Buffered lines are flushed on drop.
pub struct LogGuards {
    pub run_log: PathBuf,
    _guards: Vec<WorkerGuard>,
}

pub fn run_log_name(now: chrono::DateTime<Local>) -> String {
    format!("bot_{}.log", now.format("%Y%m%d_%H%M%S"))
}

/// Installs the global subscriber.
///
/// Console output is filtered by `RUST_LOG` (`info` by default). Every run also
/// writes a debug level log to its own file in `log_dir` and appends errors
/// to `errors.log` there.
pub fn init(log_dir: &Path) -> anyhow::Result<LogGuards> {
    fs_err::create_dir_all(log_dir)?;
    let run_log_file = run_log_name(Local::now());

    let (run_writer, run_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, &run_log_file));
    let (error_writer, error_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, ERROR_LOG_NAME));

    let console_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env()
        .context("invalid RUST_LOG")?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_filter(console_filter))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(run_writer)
                .with_filter(LevelFilter::DEBUG),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(error_writer)
                .with_filter(LevelFilter::ERROR),
        )
        .try_init()
        .context("failed to install the log subscriber")?;

    let run_log = log_dir.join(run_log_file);
    info!("logging to {:?}", run_log);
    Ok(LogGuards {
        run_log,
        _guards: vec![run_guard, error_guard],
    })
}

#[test]
fn run_log_name_contains_timestamp() {
    use chrono::TimeZone;

    let now = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap();
    assert_eq!(run_log_name(now), "bot_20240307_090501.log");
}
