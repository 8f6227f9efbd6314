//! Tracing subscriber setup.
//!
//! The subscriber starts at `info` so configuration loading can log, then
//! [`LogHandle::apply`] switches it to `logging.level`. A valid `RUST_LOG`
//! pins the filter for the whole run.

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::config::LoggingConfig;

/// Level used until the configuration is loaded.
pub const BOOTSTRAP_LEVEL: &str = "info";

/// Driver crates that stay at `warn` when we log at `debug` or `trace`.
const NOISY_TARGETS: &[&str] = &["sqlx_core", "sqlx_postgres"];

/// Filter directives for a configured level.
pub fn filter_directives(level: &str) -> String {
    let level = level.trim().to_ascii_lowercase();
    if !matches!(level.as_str(), "debug" | "trace") {
        return level;
    }
    NOISY_TARGETS
        .iter()
        .fold(level, |acc, target| format!("{acc},{target}=warn"))
}

/// Handle on the installed filter.
#[derive(Clone)]
pub struct LogHandle {
    reload: Option<reload::Handle<EnvFilter, Registry>>,
    pinned_by_env: bool,
}

impl LogHandle {
    /// Switches to the configured level.
    ///
    /// Returns `false` when `RUST_LOG` pins the filter or another subscriber
    /// was already installed.
    pub fn apply(&self, logging: &LoggingConfig) -> bool {
        if self.pinned_by_env {
            tracing::debug!("RUST_LOG is set, ignoring logging.level");
            return false;
        }
        let Some(handle) = &self.reload else {
            return false;
        };
        let directives = filter_directives(&logging.level);
        handle
            .modify(|filter| *filter = EnvFilter::new(&directives))
            .is_ok()
    }
}

/// Installs the global subscriber: reloadable filter plus `fmt` output.
pub fn init_tracing() -> LogHandle {
    let from_env = std::env::var_os("RUST_LOG")
        .is_some()
        .then(|| EnvFilter::try_from_default_env().ok())
        .flatten();
    let pinned_by_env = from_env.is_some();
    let filter = from_env.unwrap_or_else(|| EnvFilter::new(filter_directives(BOOTSTRAP_LEVEL)));

    let (filter_layer, handle) = reload::Layer::new(filter);
    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    LogHandle {
        reload: installed.then_some(handle),
        pinned_by_env,
    }
}
