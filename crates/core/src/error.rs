use crate::transport::TransportError;

/// Result alias that carries the custom [`PoiError`] type.
pub type Result<T> = std::result::Result<T, PoiError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum PoiError {
    /// Free-form message for conditions that do not deserve their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be decoded.
    #[error("invalid configuration json: {0}")]
    Json(#[from] serde_json::Error),
    /// Configuration decoded but failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The spectral transform could not be set up or run.
    #[error("spectral analysis failed: {0}")]
    Analysis(String),
    /// The audio input collaborator failed.
    #[error("audio input failed: {0}")]
    Audio(String),
    /// The motion sensor collaborator failed.
    #[error("motion sensor failed: {0}")]
    Sensor(String),
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
    /// A worker thread could not be spawned or panicked.
    #[error("worker thread `{name}` failed: {reason}")]
    Thread { name: &'static str, reason: String },
}

impl PoiError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }
}

impl From<&str> for PoiError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PoiError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_messages_convert_into_message_errors() {
        let err: PoiError = "no peripherals".into();
        assert!(matches!(&err, PoiError::Message(m) if m == "no peripherals"));
        assert_eq!(PoiError::from(format!("{} slots", 2)).to_string(), "2 slots");

        let err: PoiError = TransportError::Closed.into();
        assert_eq!(err.to_string(), "transport error: transport is closed");
    }
}
