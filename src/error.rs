use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("No OI payload captured within {0:?}")]
    CaptureTimeout(Duration),

    #[error("Navigation warning: {0}")]
    Navigation(String),

    #[error("Browser session error: {0}")]
    Browser(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Record rejected: {0}")]
    RecordRejected(String),

    #[error("History read failed: {0}")]
    PersistenceRead(String),

    #[error("History write failed: {0}")]
    PersistenceWrite(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for MonitorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            MonitorError::Dispatch(format!("Request timeout: {}", err))
        } else if err.is_connect() {
            MonitorError::Dispatch(format!("Connection error: {}", err))
        } else {
            MonitorError::Dispatch(format!("HTTP error: {}", err))
        }
    }
}

impl From<chromiumoxide::error::CdpError> for MonitorError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        MonitorError::Browser(format!("CDP error: {}", err))
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(err: serde_json::Error) -> Self {
        MonitorError::MalformedPayload(format!("JSON parsing error: {}", err))
    }
}

pub type MonitorResult<T> = Result<T, MonitorError>;

/// Error handling utilities
pub struct ErrorHandler;

impl ErrorHandler {
    /// Log error and return a user-friendly message
    pub fn handle_error(error: &MonitorError) -> String {
        let message = error.to_string();
        match error {
            MonitorError::Navigation(_) | MonitorError::PersistenceRead(_) => {
                tracing::warn!("{}", message);
            }
            MonitorError::RecordRejected(_) => {
                tracing::debug!("{}", message);
            }
            _ => {
                tracing::error!("{}", message);
            }
        }
        message
    }

    /// Whether the error aborts the current run. Everything else degrades
    /// gracefully and is only surfaced through logging.
    pub fn is_fatal(error: &MonitorError) -> bool {
        matches!(
            error,
            MonitorError::CaptureTimeout(_)
                | MonitorError::MalformedPayload(_)
                | MonitorError::Browser(_)
                | MonitorError::Configuration(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_run_aborting_errors_are_fatal() {
        assert!(ErrorHandler::is_fatal(&MonitorError::CaptureTimeout(Duration::from_secs(50))));
        assert!(ErrorHandler::is_fatal(&MonitorError::MalformedPayload("x".into())));
        assert!(!ErrorHandler::is_fatal(&MonitorError::Navigation("404".into())));
        assert!(!ErrorHandler::is_fatal(&MonitorError::RecordRejected("oi".into())));
        assert!(!ErrorHandler::is_fatal(&MonitorError::PersistenceRead("corrupt".into())));
        assert!(!ErrorHandler::is_fatal(&MonitorError::PersistenceWrite("disk".into())));
        assert!(!ErrorHandler::is_fatal(&MonitorError::Dispatch("500".into())));
    }

    #[test]
    fn json_errors_map_to_malformed_payload() {
        let err: MonitorError = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err().into();
        assert!(matches!(err, MonitorError::MalformedPayload(_)));
        assert!(ErrorHandler::handle_error(&err).starts_with("Malformed payload"));
    }
}
