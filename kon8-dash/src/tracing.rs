//! Provide tracing, tailored to this program.
//!
//! Binaries call one of the init_* functions at startup to install a
//! subscriber. The rest of the crate uses `crate::tracing::prelude::*` for
//! the `trace!()`, `debug!()`, `info!()`, `warn!()` and `error!()` macros.

use std::fmt;

use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer as FmtWriter, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Whether stderr is the stream systemd set up for the journal.
///
/// `JOURNAL_STREAM` holds `device:inode` of that stream; comparing it with
/// stderr's own identity catches redirections.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    let Ok(journal_stream) = std::env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = journal_stream.split_once(':') else {
        return false;
    };
    let (Ok(expected_dev), Ok(expected_ino)) = (dev.parse::<u64>(), ino.parse::<u64>()) else {
        return false;
    };

    match rustix::fs::fstat(std::io::stderr()) {
        Ok(stat) => stat.st_dev as u64 == expected_dev && stat.st_ino as u64 == expected_ino,
        Err(_) => false,
    }
}

/// Initialize logging.
///
/// Under systemd, log to the journal; otherwise log to stdout.
pub fn init_journald_or_stdout() {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            match tracing_journald::layer() {
                Ok(layer) => {
                    tracing_subscriber::registry()
                        .with(env_filter())
                        .with(layer)
                        .init();
                    return;
                }
                Err(e) => eprintln!("Failed to initialize journald logging ({e}), using stdout."),
            }
        }
    }

    init_stdout();
}

/// Log to stdout, e.g. for the CLI.
pub fn init_stdout() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_target(true),
        )
        .init();

    trace!("Logging to stdout.");
}

// Filter according to RUST_LOG, defaulting to INFO rather than ERROR.
fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

// Local time to the nearest second, instead of the default long UTC stamp.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut FmtWriter<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!(
                "[hour]:[minute]:[second]"
            ))
            .map_err(|_| fmt::Error)?;
        write!(w, "{stamp}")
    }
}
