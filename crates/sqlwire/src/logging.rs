use std::str::FromStr;

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log level (`error` .. `trace`).
pub const LOG_LEVEL_ENV: &str = "SQLWIRE_LOG";

/// Environment variable holding the log format (`text` or `json`).
pub const LOG_FORMAT_ENV: &str = "SQLWIRE_LOG_FORMAT";

/// Targets that follow the requested level; everything else stays at warn.
const WIRE_TARGETS: [&str; 3] = ["sqlwire", "sqlwire_packet", "sqlwire_transport"];

/// Output format of the stderr subscriber.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> tracing::level_filters::LevelFilter {
        match self {
            LogLevel::Error => tracing::level_filters::LevelFilter::ERROR,
            LogLevel::Warn => tracing::level_filters::LevelFilter::WARN,
            LogLevel::Info => tracing::level_filters::LevelFilter::INFO,
            LogLevel::Debug => tracing::level_filters::LevelFilter::DEBUG,
            LogLevel::Trace => tracing::level_filters::LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format: {other}")),
        }
    }
}

/// Filter directives: `level` for the wire crates, at most warn for the rest.
///
/// Per-frame `trace!` output from the packet layer is only useful for the
/// wire crates, so dependencies never inherit a debug or trace level.
pub fn filter_directives(level: LogLevel) -> String {
    let rest = level.min(LogLevel::Warn).as_filter();
    let wire = level.as_filter();
    let mut directives = rest.to_string().to_ascii_lowercase();
    for target in WIRE_TARGETS {
        directives.push_str(&format!(",{target}={}", wire.to_string().to_ascii_lowercase()));
    }
    directives
}

/// Resolve format and level from raw setting values; unset or unparsable
/// values fall back to text at info.
pub fn resolve_settings(level: Option<&str>, format: Option<&str>) -> (LogFormat, LogLevel) {
    let level = level.and_then(|s| s.parse().ok()).unwrap_or_default();
    let format = format.and_then(|s| s.parse().ok()).unwrap_or_default();
    (format, level)
}

/// Install a global stderr subscriber. A second call is a no-op.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(filter_directives(level)))
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

/// Install the stderr subscriber configured by [`LOG_LEVEL_ENV`] and
/// [`LOG_FORMAT_ENV`].
pub fn init_from_env() {
    let level = std::env::var(LOG_LEVEL_ENV).ok();
    let format = std::env::var(LOG_FORMAT_ENV).ok();
    let (format, level) = resolve_settings(level.as_deref(), format.as_deref());
    init_logging(format, level);
}
