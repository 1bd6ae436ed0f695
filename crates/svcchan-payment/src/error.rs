//! Error type for the payment receiver, mapped to the distinct HTTP replies each validation step
//! names.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("no channel")]
    NoChannel,
    #[error("closed")]
    Closed,
    #[error("invalid amount")]
    InvalidAmount,
    #[error("invalid signature")]
    InvalidSignature,
    #[error(transparent)]
    Store(#[from] svcchan_store::StoreError),
    #[error(transparent)]
    Crypto(#[from] svcchan_crypto::CryptoError),
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            PaymentError::InvalidPayload(msg) => (StatusCode::BAD_REQUEST, "invalid_payload", msg.clone()),
            PaymentError::NoChannel => (StatusCode::UNAUTHORIZED, "no_channel", self.to_string()),
            PaymentError::Closed => (StatusCode::UNAUTHORIZED, "closed", self.to_string()),
            PaymentError::InvalidAmount => (StatusCode::BAD_REQUEST, "invalid_amount", self.to_string()),
            PaymentError::InvalidSignature => (StatusCode::BAD_REQUEST, "invalid_signature", self.to_string()),
            PaymentError::Store(e) => {
                tracing::error!(error = %e, "payment receiver store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", "internal error".to_string())
            }
            PaymentError::Crypto(e) => {
                tracing::error!(error = %e, "payment receiver crypto error");
                (StatusCode::BAD_REQUEST, "invalid_signature", "invalid signature".to_string())
            }
        };
        (status, Json(serde_json::json!({ "code": code, "message": message }))).into_response()
    }
}
