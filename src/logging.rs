//! Tracing setup for hosts embedding the table adapter.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the host. [`init_tracing`] installs a file-backed one when `DOCTABLE_TRACE`
//! is set:
//!
//! | Variable              | Meaning                               | Fallback             |
//! |-----------------------|---------------------------------------|----------------------|
//! | `DOCTABLE_TRACE`      | enable (any value except `0`)         | disabled             |
//! | `DOCTABLE_TRACE_FILE` | log file path                         | `doctable_trace.log` |
//! | `DOCTABLE_TRACE_JSON` | JSON lines (any value except `0`)     | `logging.format`     |
//! | `DOCTABLE_TRACE_LEVEL`| `EnvFilter` directive                 | `logging.level`      |

use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::config::LoggingConfig;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_TRACE_FILE: &str = "doctable_trace.log";

/// Resolved tracing settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceSettings {
    pub path: PathBuf,
    pub json: bool,
    pub level: String,
}

impl TraceSettings {
    /// Resolve settings from `lookup` (environment-style), falling back to
    /// the config. `None` when tracing is not enabled.
    pub fn resolve(
        logging_config: &LoggingConfig,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Option<Self> {
        let enabled = lookup("DOCTABLE_TRACE").is_some_and(|v| v != "0");
        if !enabled {
            return None;
        }

        let path = lookup("DOCTABLE_TRACE_FILE").unwrap_or_else(|| DEFAULT_TRACE_FILE.to_string());
        let json = lookup("DOCTABLE_TRACE_JSON")
            .map_or_else(|| logging_config.format == "json", |v| v != "0");
        let level = lookup("DOCTABLE_TRACE_LEVEL").unwrap_or_else(|| logging_config.level.clone());

        Some(TraceSettings {
            path: PathBuf::from(path),
            json,
            level,
        })
    }
}

/// Install the global subscriber if tracing is enabled.
///
/// Returns whether this call installed it; later calls are no-ops.
pub fn init_tracing(logging_config: &LoggingConfig) -> bool {
    match TraceSettings::resolve(logging_config, |key| env::var(key).ok()) {
        Some(settings) => install(&settings),
        None => false,
    }
}

fn install(settings: &TraceSettings) -> bool {
    if TRACE_GUARD.get().is_some() {
        return false;
    }

    let file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&settings.path)
    {
        Ok(f) => f,
        Err(e) => {
            eprintln!(
                "ERROR: Unable to open DOCTABLE_TRACE_FILE '{}': {e}",
                settings.path.display()
            );
            return false;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    let filter = tracing_subscriber::EnvFilter::try_new(&settings.level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter.clone())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(non_blocking.clone())
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if settings.json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    // The writer's worker thread lives only as long as the guard
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("ERROR: Unable to install doctable trace subscriber: {e}");
        return false;
    }
    TRACE_GUARD.set(guard).is_ok()
}
