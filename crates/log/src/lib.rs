//! # Keyward Log
//!
//! Logging bootstrap shared by the keyward binaries.
//!
//! ```no_run
//! let _guard = keyward_log::auto_init()?;
//! tracing::info!(pool = "FILE_ENCRYPTED", "Pool ready");
//! # Ok::<(), keyward_log::LogError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod builder;
mod config;
mod error;

pub use builder::{LoggerBuilder, LoggerGuard};
pub use config::{Config, DisplayConfig, Format};
pub use error::{LogError, LogResult};

/// Pick a configuration from the environment and install it.
///
/// An explicit `KEYWARD_LOG` / `RUST_LOG` selects [`Config::from_env`];
/// otherwise debug builds get [`Config::development`] and release builds
/// [`Config::production`].
pub fn auto_init() -> LogResult<LoggerGuard> {
    init_with(auto_config(|key| std::env::var(key).ok()))
}

/// Initialize with default configuration
pub fn init() -> LogResult<LoggerGuard> {
    init_with(Config::default())
}

/// Initialize with custom configuration
pub fn init_with(config: Config) -> LogResult<LoggerGuard> {
    LoggerBuilder::from_config(config).build()
}

fn auto_config<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    if lookup("KEYWARD_LOG").is_some() || lookup("RUST_LOG").is_some() {
        Config::from_lookup(lookup)
    } else if cfg!(debug_assertions) {
        Config::development()
    } else {
        Config::production()
    }
}
