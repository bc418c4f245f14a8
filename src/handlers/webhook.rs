use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::call_context;
use crate::error::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-OMPay-Signature";

type HmacSha256 = Hmac<Sha256>;

/// Hex HMAC-SHA256 of the raw body under the shared secret.
pub fn sign_body(secret: &str, body: &[u8]) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub fn verify_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = match hex::decode(signature.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mut mac) => {
            mac.update(body);
            mac.verify_slice(&expected).is_ok()
        }
        Err(_) => false,
    }
}

/// Gateway notification endpoint.
///
/// Unknown transactions and non-payment resources still get a 200 so the
/// gateway stops redelivering them.
pub async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    if body.is_empty() {
        return Err(AppError::BadRequest("empty notification body".to_string()));
    }

    if let Some(secret) = &state.gateway_config.webhook_secret {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .ok_or_else(|| {
                tracing::warn!("Rejected notification without {} header", SIGNATURE_HEADER);
                AppError::Unauthorized("missing signature".to_string())
            })?
            .to_str()
            .map_err(|_| AppError::Unauthorized("unreadable signature".to_string()))?;
        if !verify_signature(secret, &body, signature) {
            tracing::warn!("Rejected notification with bad signature");
            return Err(AppError::Unauthorized("invalid signature".to_string()));
        }
    }

    let ctx = call_context(&state, &headers)?;
    let raw = std::str::from_utf8(&body)
        .map_err(|_| AppError::BadRequest("notification body is not UTF-8".to_string()))?;

    let outcome = state.orchestrator.handle_webhook_body(&ctx, raw).await?;
    Ok((StatusCode::OK, Json(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_round_trip() {
        let body = br#"{"id":"n-1"}"#;
        let signature = sign_body("s3cret", body).unwrap();
        assert!(verify_signature("s3cret", body, &signature));
        assert!(!verify_signature("other", body, &signature));
        assert!(!verify_signature("s3cret", br#"{"id":"n-2"}"#, &signature));
    }

    #[test]
    fn test_non_hex_signature_rejected() {
        assert!(!verify_signature("s3cret", b"{}", "not-hex"));
    }
}
