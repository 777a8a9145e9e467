use crate::{service::Shortened, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::{sync::Arc, time::Duration};

// ── Request types ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ShortenRequest {
    url: String,
    /// Lifetime in seconds; absent or 0 means the link never expires.
    #[serde(default)]
    duration: u64,
    /// Caller-chosen code.
    #[serde(default)]
    shortened: Option<String>,
}

// ── Handlers ───────────────────────────────────────────────────────────────

/// POST /shorten
///
/// 200 with the new code, 202 when the url already owns that code, 409 when
/// a requested alias belongs to another url.
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ShortenRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => return bad_request(&rejection.body_text()),
    };

    // Basic URL validation
    let url = request.url.trim();
    if url.is_empty() {
        return bad_request("URL must not be empty.");
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return bad_request("URL must start with http:// or https://");
    }

    let alias = request
        .shortened
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if let Some(code) = alias {
        if !code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return bad_request("Custom code may only contain letters, numbers, '-' and '_'.");
        }
    }

    let ttl = Duration::from_secs(request.duration);
    match state.service.create(url, ttl, alias).await {
        Ok(Shortened {
            code,
            created: true,
        }) => {
            tracing::info!("Created short code '{}' -> {}", code, url);
            (StatusCode::OK, Json(json!({ "shortened": code }))).into_response()
        }
        Ok(Shortened {
            code,
            created: false,
        }) => (
            StatusCode::ACCEPTED,
            Json(json!({ "error": "already exist", "shortened": code })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use crate::handlers::testing::{app, json_body};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::json;
    use tower::ServiceExt;

    fn post(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/shorten")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn creates_then_reports_existing() {
        let (app, _state, store) = app();

        let response = app
            .clone()
            .oneshot(post(json!({ "url": "https://example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, json!({ "shortened": "3fjksi" }));

        let response = app
            .oneshot(post(json!({ "url": "https://example.com" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            json_body(response).await,
            json!({ "error": "already exist", "shortened": "3fjksi" })
        );
        assert_eq!(store.puts(), 1);
    }

    #[tokio::test]
    async fn alias_conflict_is_409() {
        let (app, state, _store) = app();

        let response = app
            .clone()
            .oneshot(post(json!({ "url": "https://a.io", "shortened": "docs" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(post(json!({ "url": "https://b.io", "shortened": "docs" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(state.service.resolve("docs").unwrap(), "https://a.io");
    }

    #[tokio::test]
    async fn duration_sets_expiry() {
        let (app, state, _store) = app();

        let response = app
            .oneshot(post(json!({ "url": "https://t.io", "shortened": "tmp", "duration": 600 })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = state.service.cache().get("tmp").unwrap();
        assert!(record.expires_at > crate::models::now_epoch());
    }

    #[tokio::test]
    async fn huge_duration_is_capped() {
        let (app, state, _store) = app();

        let response = app
            .oneshot(post(json!({ "url": "https://t.io", "shortened": "big", "duration": u64::MAX })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let record = state.service.cache().get("big").unwrap();
        assert_eq!(record.expires_at, crate::models::MAX_EXPIRES_AT);
    }

    #[tokio::test]
    async fn rejects_bad_input() {
        let (app, _state, store) = app();

        for body in [
            json!({ "url": "" }),
            json!({ "url": "ftp://files.io" }),
            json!({ "url": "https://a.io", "shortened": "no spaces" }),
            json!({ "nope": true }),
        ] {
            let response = app.clone().oneshot(post(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(json_body(response).await["error"].is_string());
        }

        let malformed = Request::builder()
            .method("POST")
            .uri("/shorten")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.oneshot(malformed).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.puts(), 0);
    }

    #[tokio::test]
    async fn storage_failure_is_500() {
        let (app, _state, store) = app();
        store.set_failing(true);

        let response = app
            .oneshot(post(json!({ "url": "https://a.io" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
