//! Logging sinks for the `handeye` tools.
//!
//! Library code only uses the `log` macros. A binary installs one sink at
//! startup: [`init_with_level`] writes plain lines to stderr, while
//! `init_tracing` (feature `tracing`) hands records to a `tracing-subscriber`.
//!
//! Console lines carry the time since the sink was installed, the level and
//! the emitting module:
//!
//! ```text
//! +   1.204s INFO  pipeline | 3 of 150 samples acquired (4 observations)
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{Level, LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

static INSTALLED: AtomicBool = AtomicBool::new(false);

struct ConsoleLogger {
    level: LevelFilter,
    epoch: Instant,
}

fn module_name(target: &str) -> &str {
    target.rsplit("::").next().unwrap_or(target)
}

fn format_line(elapsed: Duration, level: Level, target: &str, message: &str) -> String {
    format!(
        "+{:8.3}s {:<5} {} | {}",
        elapsed.as_secs_f64(),
        level,
        module_name(target),
        message
    )
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(
            self.epoch.elapsed(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        let _ = writeln!(std::io::stderr().lock(), "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Send `log` records at or above `level` to stderr.
///
/// Only the first successful call installs a sink; later calls return `Ok`
/// and leave it unchanged.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if INSTALLED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Ok(());
    }
    let logger = ConsoleLogger {
        level,
        epoch: Instant::now(),
    };
    match log::set_boxed_logger(Box::new(logger)) {
        Ok(()) => {
            log::set_max_level(level);
            Ok(())
        }
        Err(err) => {
            INSTALLED.store(false, Ordering::SeqCst);
            Err(err)
        }
    }
}

/// `-v` count to level filter.
pub fn level_from_verbosity(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install a `tracing` fmt subscriber. `RUST_LOG` overrides the default `info` filter.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}
