//! Shared pool endpoints

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use polislogg_core::models::{
    parse_event_time, ResetResponse, SharedCacheResponse, UploadRequest, UploadResponse,
};
use polislogg_core::pool::{client_address, contributor_id};

use crate::routes::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/shared-cache",
        get(read_pool).post(upload_events).delete(reset_pool),
    )
}

#[derive(Deserialize)]
pub struct ReadParams {
    pub since: Option<String>,
}

/// GET /shared-cache?since=<timestamp> - Records cached after `since`
async fn read_pool(
    State(state): State<AppState>,
    params: Result<Query<ReadParams>, QueryRejection>,
) -> Result<Json<SharedCacheResponse>, AppError> {
    let Query(params) = params.context("Failed to retrieve cache")?;

    let since = match params.since.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            parse_event_time(raw)
                .ok_or_else(|| anyhow::anyhow!("Invalid since timestamp: {}", raw))
                .context("Failed to retrieve cache")?,
        ),
        None => None,
    };

    Ok(Json(state.pool.read(since).await))
}

/// POST /shared-cache - Merge a batch of cached events into the pool
async fn upload_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(request) = body.context("Failed to update cache")?;

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let address = client_address(header("x-forwarded-for"), header("x-real-ip"));
    let contributor = contributor_id(address);

    Ok(Json(state.pool.write(request.events, &contributor).await))
}

/// DELETE /shared-cache - Clear the pool
async fn reset_pool(State(state): State<AppState>) -> Json<ResetResponse> {
    Json(state.pool.reset().await)
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::routes::app;
    use crate::state::AppState;

    fn event(id: i64, datetime: &str, cached_at: &str, is_archived: bool) -> Value {
        json!({
            "id": id,
            "datetime": datetime,
            "name": format!("{} Inbrott, Malmö", datetime),
            "summary": "Inbrott i lägenhet.",
            "url": format!("/aktuellt/handelser/{}", id),
            "type": "Inbrott",
            "location": { "name": "Malmö", "gps": "55.604981,13.003822" },
            "cachedAt": cached_at,
            "isArchived": is_archived
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn post(body: Value, forwarded_for: &str) -> Request<Body> {
        Request::post("/shared-cache")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", forwarded_for)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_upload_then_read() {
        let app = app(AppState::new(), 1024 * 1024);

        let (status, body) = send(
            &app,
            post(
                json!({ "events": [
                    event(1, "2024-06-01 10:00:00 +02:00", "2024-06-01T08:05:00Z", false),
                    event(2, "2024-06-02 10:00:00 +02:00", "2024-06-02T08:05:00Z", false),
                ]}),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "success": true, "newEvents": 2, "updatedEvents": 0, "totalEvents": 2, "contributors": 1 })
        );

        let (status, body) = send(&app, get("/shared-cache")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["events"][0]["id"], 2);
        assert_eq!(body["events"][0]["contributorId"], "contrib_1505998205");
        assert_eq!(body["metadata"]["totalEvents"], 2);
        assert_eq!(body["metadata"]["contributors"], json!(["contrib_1505998205"]));
    }

    #[tokio::test]
    async fn test_archive_promotion_from_second_contributor() {
        let app = app(AppState::new(), 1024 * 1024);
        let cached_at = "2024-01-01T00:00:00Z";

        send(
            &app,
            post(json!({ "events": [event(7, "2024-01-01T00:00:00Z", cached_at, false)] }), "10.0.0.1"),
        )
        .await;
        let (_, body) = send(
            &app,
            post(
                json!({ "events": [event(7, "2024-01-01T00:00:00Z", cached_at, true)] }),
                "203.0.113.7, 10.0.0.1",
            ),
        )
        .await;
        assert_eq!(body["newEvents"], 0);
        assert_eq!(body["updatedEvents"], 1);
        assert_eq!(body["contributors"], 2);

        let (_, body) = send(&app, get("/shared-cache")).await;
        assert_eq!(body["events"][0]["isArchived"], true);
        assert_eq!(body["events"][0]["contributorId"], "contrib_1392238757");
    }

    #[tokio::test]
    async fn test_since_filters_on_cached_at() {
        let app = app(AppState::new(), 1024 * 1024);
        send(
            &app,
            post(
                json!({ "events": [
                    event(1, "2024-06-01T10:00:00Z", "2024-06-01T10:00:00Z", false),
                    event(2, "2024-06-02T10:00:00Z", "2024-06-02T10:00:00Z", false),
                ]}),
                "127.0.0.1",
            ),
        )
        .await;

        let (_, body) = send(&app, get("/shared-cache?since=2024-06-01T12:00:00.000Z")).await;
        assert_eq!(body["events"].as_array().unwrap().len(), 1);
        assert_eq!(body["events"][0]["id"], 2);

        let (_, body) = send(&app, get("/shared-cache?since=2100-01-01T00:00:00Z")).await;
        assert!(body["events"].as_array().unwrap().is_empty());
        assert_eq!(body["metadata"]["totalEvents"], 2);

        let (_, body) = send(&app, get("/shared-cache?since=")).await;
        assert_eq!(body["events"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failures_are_generic_500s() {
        let app = app(AppState::new(), 1024 * 1024);

        let (status, body) = send(&app, get("/shared-cache?since=yesterday")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to retrieve cache");

        let (status, body) = send(&app, post(json!({ "items": [] }), "127.0.0.1")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to update cache");

        let request = Request::post("/shared-cache")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_upload_over_body_limit_is_rejected() {
        let app = app(AppState::new(), 64);
        let (status, _) = send(
            &app,
            post(
                json!({ "events": [event(1, "2024-06-01T10:00:00Z", "2024-06-01T10:00:00Z", false)] }),
                "127.0.0.1",
            ),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_delete_clears_pool() {
        let app = app(AppState::new(), 1024 * 1024);
        send(
            &app,
            post(
                json!({ "events": [event(1, "2024-06-01T10:00:00Z", "2024-06-01T10:00:00Z", false)] }),
                "127.0.0.1",
            ),
        )
        .await;

        let request = Request::delete("/shared-cache").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "success": true, "message": "Shared cache cleared" }));

        let (_, body) = send(&app, get("/shared-cache")).await;
        assert_eq!(body["metadata"]["totalEvents"], 0);
        assert_eq!(body["metadata"]["contributors"], json!([]));
    }
}
