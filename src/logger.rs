//! Flat, severity-tagged console logging.
//!
//! Every collaborator (store container, client, bot) receives an explicit
//! `Arc<dyn Logger>`. [`install`] additionally routes `log` records from
//! dependency crates through the same adapter.

use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, PoisonError};

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};

/// Logging capability handed to the store, the client and the bot.
pub trait Logger: Send + Sync {
    /// Write one message at the given severity.
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    /// Logger scoped to a named module.
    fn sub(&self, module: &str) -> Arc<dyn Logger>;

    fn debugf(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    fn infof(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    fn warnf(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    fn errorf(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }
}

/// Bracketed tag for a severity. Trace has no tag of its own.
pub fn level_tag(level: Level) -> &'static str {
    match level {
        Level::Error => "[ERROR] ",
        Level::Warn => "[WARN] ",
        Level::Info => "[INFO] ",
        Level::Debug | Level::Trace => "[DEBUG] ",
    }
}

/// Render one log line, including the trailing newline.
pub fn format_line(level: Level, args: fmt::Arguments<'_>) -> String {
    format!("{}{}\n", level_tag(level), args)
}

#[derive(Clone)]
enum Sink {
    Stdout,
    Capture(Arc<Mutex<Vec<u8>>>),
}

/// Logger that prefixes each line with its severity tag.
///
/// `sub` ignores the module name: sub-loggers write to the same sink with
/// the same prefixes.
#[derive(Clone)]
pub struct PrefixLogger {
    sink: Sink,
}

impl PrefixLogger {
    /// Logger writing to standard output.
    pub fn stdout() -> Self {
        Self { sink: Sink::Stdout }
    }

    /// Logger writing to an in-memory buffer, read back with [`captured`](Self::captured).
    pub fn capture() -> Self {
        Self {
            sink: Sink::Capture(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    /// Everything written so far to a capture sink. Empty for stdout loggers.
    pub fn captured(&self) -> String {
        match &self.sink {
            Sink::Stdout => String::new(),
            Sink::Capture(buf) => {
                let buf = buf.lock().unwrap_or_else(PoisonError::into_inner);
                String::from_utf8_lossy(&buf).into_owned()
            }
        }
    }

    fn write_line(&self, line: &str) {
        match &self.sink {
            Sink::Stdout => {
                let mut out = io::stdout().lock();
                // Console output failures are not actionable here.
                let _ = out.write_all(line.as_bytes());
                let _ = out.flush();
            }
            Sink::Capture(buf) => {
                let mut buf = buf.lock().unwrap_or_else(PoisonError::into_inner);
                buf.extend_from_slice(line.as_bytes());
            }
        }
    }
}

impl Logger for PrefixLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.write_line(&format_line(level, args));
    }

    fn sub(&self, _module: &str) -> Arc<dyn Logger> {
        Arc::new(self.clone())
    }
}

impl log::Log for PrefixLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record<'_>) {
        if self.enabled(record.metadata()) {
            Logger::log(self, record.level(), *record.args());
        }
    }

    fn flush(&self) {
        if let Sink::Stdout = self.sink {
            let _ = io::stdout().flush();
        }
    }
}

/// Register `logger` as the `log` backend, filtering dependency records to `max_level`.
pub fn install(logger: PrefixLogger, max_level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(max_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_for_each_severity() {
        let logger = PrefixLogger::capture();
        logger.debugf(format_args!("opening {}", "session.db"));
        logger.infof(format_args!("connected in {}ms", 42));
        logger.warnf(format_args!("slow ack"));
        logger.errorf(format_args!("failed: {:?}", "boom"));

        assert_eq!(
            logger.captured(),
            "[DEBUG] opening session.db\n\
             [INFO] connected in 42ms\n\
             [WARN] slow ack\n\
             [ERROR] failed: \"boom\"\n"
        );
    }

    #[test]
    fn test_single_trailing_newline() {
        let line = format_line(Level::Info, format_args!("hello"));
        assert_eq!(line, "[INFO] hello\n");
        assert_eq!(line.matches('\n').count(), 1);
    }

    #[test]
    fn test_trace_renders_as_debug() {
        assert_eq!(format_line(Level::Trace, format_args!("x")), "[DEBUG] x\n");
    }

    #[test]
    fn test_sub_logger_output_is_identical() {
        let parent = PrefixLogger::capture();
        parent.warnf(format_args!("socket closed: {}", 1006));
        let from_parent = parent.captured();

        let child = PrefixLogger::capture();
        child.sub("Database").warnf(format_args!("socket closed: {}", 1006));
        let from_sub = child.captured();

        assert_eq!(from_parent, from_sub);
        assert_eq!(from_sub, "[WARN] socket closed: 1006\n");
    }

    #[test]
    fn test_sub_logger_shares_sink() {
        let parent = PrefixLogger::capture();
        let sub = parent.sub("Client");
        parent.infof(format_args!("one"));
        sub.infof(format_args!("two"));
        sub.sub("Nested").infof(format_args!("three"));
        assert_eq!(parent.captured(), "[INFO] one\n[INFO] two\n[INFO] three\n");
    }

    #[test]
    fn test_install_filters_dependency_records() {
        let logger = PrefixLogger::capture();
        install(logger.clone(), LevelFilter::Warn).unwrap();

        log::info!(target: "sqlx::query", "hidden statement");
        log::warn!(target: "sqlx::query", "slow statement");
        logger.debugf(format_args!("own debug"));

        let out = logger.captured();
        assert!(out.contains("[WARN] slow statement\n"), "got {out:?}");
        assert!(out.contains("[DEBUG] own debug\n"));
        assert!(!out.contains("hidden statement"));
        assert!(install(PrefixLogger::capture(), LevelFilter::Warn).is_err());
    }
}
