use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

/// Environment variable holding the bearer token for the HTTP API.
pub const API_KEY_ENV: &str = "DEVAGENT_API_KEY";

/// Bearer token expected on protected routes. `None` means not configured.
#[derive(Clone, Default)]
pub struct ApiKey(Option<Arc<str>>);

impl ApiKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.filter(|k| !k.is_empty()).map(Arc::from))
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(API_KEY_ENV).ok())
    }

    pub fn is_configured(&self) -> bool {
        self.0.is_some()
    }
}

pub async fn api_key_auth(State(key): State<ApiKey>, req: Request<Body>, next: Next) -> Response {
    let expected = match &key.0 {
        Some(v) => v,
        None => {
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "ok": false,
                    "error": "API key not configured"
                })),
            )
                .into_response();
        }
    };

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    match auth_header {
        Some(value) if value == format!("Bearer {}", expected) => next.run(req).await,
        _ => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok": false,
                "error": "Unauthorized"
            })),
        )
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_key_counts_as_unconfigured() {
        assert!(!ApiKey::new(Some(String::new())).is_configured());
        assert!(!ApiKey::new(None).is_configured());
        assert!(ApiKey::new(Some("secret".to_string())).is_configured());
    }
}
