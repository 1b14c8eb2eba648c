use thiserror::Error;

/// Failure of an external API call (broker, data feed, or analyst model).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("{service} request failed: {reason}")]
    Request { service: &'static str, reason: String },

    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("{service} response could not be decoded: {reason}")]
    Decode { service: &'static str, reason: String },
}

/// Malformed structured reply from the analyst model. Always recovered
/// with a conservative fallback verdict.
#[derive(Debug, Error)]
#[error("analyst reply was not valid JSON: {reason}")]
pub struct ParseError {
    pub reason: String,
}

/// Startup configuration failure. Fatal; the process refuses to start.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid MODE: {0}. Must be 'paper' or 'live'")]
    InvalidMode(String),

    #[error("invalid value for {var}: {value}")]
    InvalidValue { var: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_formatting() {
        let err = TransportError::Status {
            service: "alpaca",
            status: 422,
            body: "insufficient buying power".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("422"));
        assert!(msg.contains("alpaca"));
    }

    #[test]
    fn test_config_error_formatting() {
        let err = ConfigError::InvalidMode("yolo".to_string());
        assert!(err.to_string().contains("yolo"));
    }
}
