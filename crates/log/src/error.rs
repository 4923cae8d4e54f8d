//! Error handling for keyward-log

/// Result type for logging operations
pub type LogResult<T> = Result<T, LogError>;

/// Errors raised while configuring or installing the logger
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filter parsing error
    #[error("Invalid filter '{filter}': {reason}")]
    Filter {
        /// The rejected filter directive
        filter: String,
        /// Why it was rejected
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("Logger already initialized: {0}")]
    AlreadyInitialized(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_error_names_the_directive() {
        let error = LogError::Filter {
            filter: "debug,,=x".into(),
            reason: "invalid directive".into(),
        };
        assert!(error.to_string().contains("Invalid filter 'debug,,=x'"));
    }
}
