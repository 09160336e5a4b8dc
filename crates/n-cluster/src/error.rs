use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Everything that can go wrong at the fallible edges of the crate:
/// decoding persisted or received values and loading configuration.
///
/// Structural operations (merge, contract, tick) never fail. They degrade
/// and retry instead.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("invalid monitor rotation {0}, expected 2-5, 8-11 or 14-17")]
    InvalidRotation(u8),

    #[error("invalid text scale {0}, expected 0.5 to 5.0 in steps of 0.5")]
    InvalidTextScale(f64),

    #[error("invalid config: {message}")]
    InvalidConfig { message: String },

    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MonitorError {
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}
