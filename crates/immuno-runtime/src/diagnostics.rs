use std::fmt;
use std::sync::OnceLock;

use immuno_plugin_api::ImLogLevel;
use tracing_subscriber::EnvFilter;

const PLUGIN_TARGET: &str = "immuno_runtime::plugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl From<ImLogLevel> for LogLevel {
    fn from(level: ImLogLevel) -> Self {
        match level {
            ImLogLevel::Trace => Self::Trace,
            ImLogLevel::Debug => Self::Debug,
            ImLogLevel::Info => Self::Info,
            ImLogLevel::Warn => Self::Warn,
            ImLogLevel::Error => Self::Error,
            ImLogLevel::Fatal => Self::Fatal,
        }
    }
}

/// Where the runtime and its plugins send diagnostics.
///
/// Sinks are best-effort. A failing sink must not affect the caller.
pub trait DiagnosticsSink {
    fn puts(&self, module: &str, level: LogLevel, message: &str);

    fn putf(&self, module: &str, level: LogLevel, args: fmt::Arguments<'_>) {
        match args.as_str() {
            Some(message) => self.puts(module, level, message),
            None => self.puts(module, level, &args.to_string()),
        }
    }
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn puts(&self, module: &str, level: LogLevel, message: &str) {
        match level {
            LogLevel::Fatal => {
                tracing::error!(target: PLUGIN_TARGET, module, fatal = true, "{message}")
            }
            LogLevel::Error => tracing::error!(target: PLUGIN_TARGET, module, "{message}"),
            LogLevel::Warn => tracing::warn!(target: PLUGIN_TARGET, module, "{message}"),
            LogLevel::Info => tracing::info!(target: PLUGIN_TARGET, module, "{message}"),
            LogLevel::Debug => tracing::debug!(target: PLUGIN_TARGET, module, "{message}"),
            LogLevel::Trace => tracing::trace!(target: PLUGIN_TARGET, module, "{message}"),
        }
    }
}

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a global fmt subscriber filtered by `RUST_LOG`. Later calls are no-ops.
pub fn init_tracing() {
    TRACING_INIT.get_or_init(|| {
        let default_level = if cfg!(debug_assertions) {
            "debug"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();
    });
}
