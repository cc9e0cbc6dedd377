//! Unified error handling for the bridge.

use serde_json::Value;

use crate::config::ConfigError;
use crate::protocol::ErrorInfo;

/// Bridge error type.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The worker reported a failure. The payload is passed through verbatim.
    #[error("Worker operation failed: {0}")]
    Operation(Value),

    #[error("Worker disconnected")]
    Disconnected,

    #[error("Failed to spawn worker: {0}")]
    WorkerSpawn(String),

    #[error("Payload codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// The worker's error payload, decoded, if this is an operation failure.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            BridgeError::Operation(payload) => serde_json::from_value(payload.clone()).ok(),
            _ => None,
        }
    }
}

impl From<BridgeError> for tidepool_engine::Error {
    fn from(err: BridgeError) -> Self {
        let payload = match err {
            BridgeError::Operation(payload) => payload,
            other => return tidepool_engine::Error::Adapter(other.to_string()),
        };

        let info = serde_json::from_value::<ErrorInfo>(payload.clone()).ok();
        if let Some(engine) = info.as_ref().and_then(ErrorInfo::to_engine_error) {
            return engine;
        }
        let message = match info {
            Some(info) => info.message,
            None => payload.to_string(),
        };
        tidepool_engine::Error::Storage { message, payload }
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn engine_payloads_decode_to_their_variant() {
        let err = BridgeError::Operation(json!({
            "message": "record not found: r1",
            "code": "RecordNotFound",
            "detail": "r1"
        }));
        let info = err.error_info().unwrap();
        assert_eq!(info.code.as_deref(), Some("RecordNotFound"));

        let engine: tidepool_engine::Error = err.into();
        assert_eq!(engine, tidepool_engine::Error::RecordNotFound("r1".into()));
    }

    #[test]
    fn unknown_payloads_are_kept_whole() {
        let payload = json!({"message": "bad args", "code": "InvalidPayload"});
        let engine: tidepool_engine::Error = BridgeError::Operation(payload.clone()).into();
        assert_eq!(
            engine,
            tidepool_engine::Error::Storage {
                message: "bad args".into(),
                payload,
            }
        );

        // an opaque payload is still reported
        let err = BridgeError::Operation(json!("boom"));
        assert!(err.error_info().is_none());
        assert_eq!(err.to_string(), r#"Worker operation failed: "boom""#);
        let engine: tidepool_engine::Error = err.into();
        assert_eq!(
            engine,
            tidepool_engine::Error::Storage {
                message: r#""boom""#.into(),
                payload: json!("boom"),
            }
        );
    }

    #[test]
    fn transport_errors_use_display() {
        let engine: tidepool_engine::Error = BridgeError::Disconnected.into();
        assert_eq!(engine, tidepool_engine::Error::Adapter("Worker disconnected".into()));
    }
}
