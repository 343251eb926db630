use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Full `EnvFilter` directives that replace `--log-level` when set,
/// e.g. `ICMD_LOG=icmdprims_bus=trace`.
pub const LOG_ENV: &str = "ICMD_LOG";

/// Targets `--log-level` applies to. Everything else stays at `warn`.
const ICMD_TARGETS: [&str; 4] = [
    "icmdprims",
    "icmdprims_bus",
    "icmdprims_frame",
    "icmdprims_host",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// `level` for the icmdprims crates, `warn` for dependencies.
pub fn scoped_directives(level: LogLevel) -> String {
    let level = level.directive();
    let mut directives = vec!["warn".to_string()];
    directives.extend(ICMD_TARGETS.iter().map(|target| format!("{target}={level}")));
    directives.join(",")
}

/// Pick the directives to install. A non-empty, parseable override wins;
/// a broken one is reported and ignored.
pub fn select_directives(level: LogLevel, overrides: Option<&str>) -> String {
    if let Some(directives) = overrides.map(str::trim).filter(|d| !d.is_empty()) {
        match EnvFilter::try_new(directives) {
            Ok(_) => return directives.to_string(),
            Err(err) => eprintln!("warning: ignoring {LOG_ENV}={directives:?}: {err}"),
        }
    }
    scoped_directives(level)
}

/// Install the stderr subscriber. Bus transactions log at debug, select
/// transitions at trace.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let overrides = std::env::var(LOG_ENV).ok();
    let directives = select_directives(level, overrides.as_deref());
    let show_target = overrides.is_some() || matches!(level, LogLevel::Debug | LogLevel::Trace);

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(directives))
        .with_ansi(false)
        .with_target(show_target);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_is_scoped_to_icmd_crates() {
        assert_eq!(
            scoped_directives(LogLevel::Trace),
            "warn,icmdprims=trace,icmdprims_bus=trace,icmdprims_frame=trace,icmdprims_host=trace"
        );
        assert!(scoped_directives(LogLevel::Error).starts_with("warn,icmdprims=error"));
    }

    #[test]
    fn env_override_replaces_level() {
        assert_eq!(
            select_directives(LogLevel::Info, Some(" icmdprims_bus=trace ")),
            "icmdprims_bus=trace"
        );
    }

    #[test]
    fn blank_or_broken_override_falls_back() {
        let scoped = scoped_directives(LogLevel::Debug);
        assert_eq!(select_directives(LogLevel::Debug, None), scoped);
        assert_eq!(select_directives(LogLevel::Debug, Some("  ")), scoped);
        assert_eq!(
            select_directives(LogLevel::Debug, Some("icmdprims=loud")),
            scoped
        );
    }

    #[test]
    fn scoped_directives_parse() {
        for level in [
            LogLevel::Error,
            LogLevel::Warn,
            LogLevel::Info,
            LogLevel::Debug,
            LogLevel::Trace,
        ] {
            assert!(EnvFilter::try_new(scoped_directives(level)).is_ok());
        }
    }
}
