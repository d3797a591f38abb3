use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tel_ledger::LedgerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("store error: {0}")]
    Store(#[from] tel_store::StoreError),

    #[error("key material error: {0}")]
    KeyMaterial(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Ledger(LedgerError::SigningUnavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Ledger(LedgerError::Serialization(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Ledger(LedgerError::InvalidRange { .. }) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_errors_map_to_statuses() {
        let cases = [
            (LedgerError::SigningUnavailable("down".into()), 503),
            (LedgerError::Serialization("float".into()), 422),
            (LedgerError::InvalidRange { start: 3, end: 1, len: 2 }, 400),
            (LedgerError::ConcurrentAppendConflict { expected: 1, actual: 2 }, 500),
            (LedgerError::EntryMissing { sequence: 4 }, 500),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status().as_u16(), status);
        }
    }

    #[test]
    fn other_errors() {
        assert_eq!(ServerError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ServerError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
