// Auth middleware: static API keys in the `X-API-Key` header.
//
// Keys come from SIFT_API_KEYS. An empty key set turns authentication off,
// which is only meant for local use.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use super::{ApiClient, AppState};

pub const API_KEY_HEADER: &str = "x-api-key";

/// Axum middleware: reject requests without a known API key with 401.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.api_keys.is_empty() {
        let provided = request
            .headers()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());

        let known = provided.is_some_and(|key| {
            state
                .api_keys
                .iter()
                .any(|candidate| constant_time_eq(key, candidate))
        });
        if !known {
            return super::api_error(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "A valid X-API-Key header is required",
            );
        }
    }

    request.extensions_mut().insert(ApiClient);
    next.run(request).await
}

/// Constant-time string comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.bytes()
        .zip(b.bytes())
        .fold(0u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq("key-123", "key-123"));
        assert!(!constant_time_eq("key-123", "key-124"));
        assert!(!constant_time_eq("key", "key-123"));
    }
}
