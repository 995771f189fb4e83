// Global logging for sysfat: a `log` backend that writes to stderr

use core::fmt;
use std::io::Write;
use std::sync::OnceLock;

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Environment variable that overrides the log level (`error` ... `trace`).
pub const LOG_ENV: &str = "SYSFAT_LOG";

static PROGRAM: OnceLock<String> = OnceLock::new();
static LOGGER: StderrLogger = StderrLogger;

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let program = PROGRAM.get().map(String::as_str).unwrap_or("sysfat");
        let line = format_line(program, record.level(), record.args());

        // Nowhere left to report a failing stderr
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// One diagnostic line: `program: message`, with `warning: ` in front of
/// warnings.
pub fn format_line(program: &str, level: Level, message: &fmt::Arguments<'_>) -> String {
    match level {
        Level::Warn => format!("{}: warning: {}", program, message),
        _ => format!("{}: {}", program, message),
    }
}

/// Level for a run: `Warn`, `Info` when verbose, or whatever `env_value`
/// (the content of [`LOG_ENV`]) names.
pub fn level_for(verbose: bool, env_value: Option<&str>) -> LevelFilter {
    if let Some(level) = env_value.and_then(|v| v.trim().parse::<LevelFilter>().ok()) {
        return level;
    }
    if verbose {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    }
}

/// Install the stderr logger. Only the first call has any effect.
pub fn init(program: &str, level: LevelFilter) -> Result<(), SetLoggerError> {
    let _ = PROGRAM.set(program.to_string());
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_prefix() {
        assert_eq!(
            format_line("sysfat", Level::Warn, &format_args!("unable to move {}", "ldlinux.sys")),
            "sysfat: warning: unable to move ldlinux.sys"
        );
        assert_eq!(
            format_line("sysfat", Level::Error, &format_args!("short write")),
            "sysfat: short write"
        );
        assert_eq!(
            format_line("./sysfat", Level::Info, &format_args!("boot sector written")),
            "./sysfat: boot sector written"
        );
    }

    #[test]
    fn test_level_selection() {
        assert_eq!(level_for(false, None), LevelFilter::Warn);
        assert_eq!(level_for(true, None), LevelFilter::Info);
        assert_eq!(level_for(false, Some("debug")), LevelFilter::Debug);
        assert_eq!(level_for(true, Some("off")), LevelFilter::Off);
        assert_eq!(level_for(true, Some("nonsense")), LevelFilter::Info);
    }
}
