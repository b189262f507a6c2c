//! Logging setup
//!
//! Console output plus an optional daily log file in the data directory.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter};

const DEFAULT_FILTER: &str = "gravatar_privacy=info,gravatar_privacy_lib=info,tower_http=warn";

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logger(log_dir: &Path, to_file: bool) -> Result<Option<WorkerGuard>, String> {
    // Route `log` records from dependencies into tracing
    let _ = tracing_log::LogTracer::init();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let console = fmt::layer().with_target(false);

    if to_file {
        let logs = log_dir.join("logs");
        std::fs::create_dir_all(&logs)
            .map_err(|e| format!("Failed to create log dir: {}", e))?;
        let appender = tracing_appender::rolling::daily(&logs, "gravatar_privacy.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file = fmt::layer().with_ansi(false).with_writer(writer);

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .with(file);
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| format!("Failed to init logger: {}", e))?;
        Ok(Some(guard))
    } else {
        let subscriber = tracing_subscriber::registry().with(filter).with(console);
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| format!("Failed to init logger: {}", e))?;
        Ok(None)
    }
}
