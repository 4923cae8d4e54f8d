//! Configuration presets for common scenarios

use super::{Config, DisplayConfig, Format};

impl Config {
    /// Create configuration from environment variables
    ///
    /// `KEYWARD_LOG` (falling back to `RUST_LOG`) sets the filter,
    /// `KEYWARD_LOG_FORMAT` the format, `KEYWARD_LOG_SOURCE` and
    /// `KEYWARD_LOG_COLORS` the display switches.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an injectable variable source.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(level) = lookup("KEYWARD_LOG").or_else(|| lookup("RUST_LOG")) {
            config.level = level;
        }

        // Unknown formats fall back to compact rather than failing startup.
        if let Some(format) = lookup("KEYWARD_LOG_FORMAT") {
            config.format = format.parse().unwrap_or(Format::Compact);
        }

        if let Some(v) = lookup("KEYWARD_LOG_SOURCE") {
            config.display.source = is_enabled(&v);
        }
        if let Some(v) = lookup("KEYWARD_LOG_COLORS") {
            config.display.colors = is_enabled(&v);
        }

        config
    }

    /// Development configuration (pretty, debug level)
    #[must_use]
    pub fn development() -> Self {
        Self {
            level: "debug".to_string(),
            format: Format::Pretty,
            display: DisplayConfig {
                colors: true,
                source: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Production configuration (JSON, info level)
    #[must_use]
    pub fn production() -> Self {
        Self {
            level: "info".to_string(),
            format: Format::Json,
            display: DisplayConfig {
                colors: false,
                source: false,
                flatten: true,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }

    /// Test configuration (no colors, everything enabled)
    #[must_use]
    pub fn test() -> Self {
        Self {
            level: "trace".to_string(),
            format: Format::Compact,
            display: DisplayConfig {
                colors: false,
                ..DisplayConfig::default()
            },
            ..Self::default()
        }
    }
}

fn is_enabled(value: &str) -> bool {
    value != "0" && !value.eq_ignore_ascii_case("false")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(|_| None), Config::default());
    }

    #[test]
    fn keyward_log_wins_over_rust_log() {
        let config = Config::from_lookup(lookup(&[
            ("KEYWARD_LOG", "keyward_pool=trace"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.level, "keyward_pool=trace");

        let config = Config::from_lookup(lookup(&[("RUST_LOG", "warn")]));
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn format_and_display_switches_are_read() {
        let config = Config::from_lookup(lookup(&[
            ("KEYWARD_LOG_FORMAT", "json"),
            ("KEYWARD_LOG_SOURCE", "1"),
            ("KEYWARD_LOG_COLORS", "false"),
        ]));
        assert_eq!(config.format, Format::Json);
        assert!(config.display.source);
        assert!(!config.display.colors);
    }

    #[test]
    fn unknown_format_falls_back_to_compact() {
        let config = Config::from_lookup(lookup(&[("KEYWARD_LOG_FORMAT", "xml")]));
        assert_eq!(config.format, Format::Compact);
    }

    #[test]
    fn presets_differ_where_it_matters() {
        let dev = Config::development();
        let prod = Config::production();
        assert_eq!(dev.format, Format::Pretty);
        assert_eq!(prod.format, Format::Json);
        assert!(dev.display.colors && !prod.display.colors);
        assert!(prod.display.flatten);
    }
}
