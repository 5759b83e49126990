//! HTTP surface.
//!
//! | Method | Path                           | Body / result                              |
//! |--------|--------------------------------|--------------------------------------------|
//! | POST   | `/api/divination/generate`     | `{matter}` → `{id, lines, hexagram}`       |
//! | GET    | `/api/divination/result/{id}`  | `{interpretation, advice, is_ready}`       |
//! | POST   | `/api/divination/interpret`    | `{matter, hexagram, lines}` → `{interpretation, advice}` |
//! | GET    | `/api/divinations`             | stored records                             |
//! | GET    | `/healthz`                     | `serving` / `not serving` plus job counts  |
//!
//! Errors are JSON `{"detail": ...}` bodies. CORS is open to any origin,
//! method and header.

pub mod handlers;
pub mod health;

pub use health::HealthReporter;

use crate::service::DivinationService;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

#[derive(Debug, Clone)]
pub struct AppState {
    pub service: DivinationService,
    pub health: HealthReporter,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/divination/generate", post(handlers::generate))
        .route("/api/divination/result/{id}", get(handlers::result))
        .route("/api/divination/interpret", post(handlers::interpret))
        .route("/api/divinations", get(handlers::history))
        .route("/healthz", get(handlers::health))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        interpret::testing::{Behavior, Scripted},
        service::testing::service,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode, header},
    };
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(backend: std::sync::Arc<Scripted>) -> (Router, AppState) {
        let (service, _) = service(backend, 2, 8);
        let state = AppState {
            service,
            health: HealthReporter::new(),
        };
        (router(state.clone()), state)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn generate_then_poll() {
        let (app, _) = app(Scripted::reply("潜龙勿用。建议：韬光养晦。"));

        let (status, generated) =
            send(&app, post_json("/api/divination/generate", json!({"matter": "投资"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(generated["hexagram"], "乾为天");
        assert_eq!(generated["lines"], json!(vec!["old-yang"; 6]));
        let id = generated["id"].as_str().unwrap().to_string();

        let result = loop {
            let (status, body) = send(&app, get(&format!("/api/divination/result/{id}"))).await;
            assert_eq!(status, StatusCode::OK);
            if body["is_ready"] == true {
                break body;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        };
        assert_eq!(result["interpretation"], "潜龙勿用。");
        assert_eq!(result["advice"], "建议：韬光养晦。");
    }

    #[tokio::test]
    async fn unknown_and_malformed_ids_are_404() {
        let (app, _) = app(Scripted::reply("x"));

        let (status, body) = send(
            &app,
            get("/api/divination/result/1b4e28ba-2fa1-41d2-883f-0016d3cca427"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].as_str().unwrap().contains("not found"));

        let (status, body) = send(&app, get("/api/divination/result/not-a-token")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn interpret_returns_text_and_records_history() {
        let (app, _) = app(Scripted::reply("地势坤。建议：厚德载物。"));
        let payload = json!({
            "matter": "合作",
            "hexagram": "坤为地",
            "lines": ["yin", "yin", "old-yin", "yin", "yin", "yin"],
        });

        let (status, body) = send(&app, post_json("/api/divination/interpret", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"interpretation": "地势坤。", "advice": "建议：厚德载物。"}));

        let (status, history) = send(&app, get("/api/divinations")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["matter"], "合作");
        assert_eq!(history[0]["lines"][2], "old-yin");
        assert!(history[0]["createdAt"].is_string());
    }

    #[tokio::test]
    async fn interpret_degrades_instead_of_failing() {
        let (app, _) = app(Scripted::new(Behavior::Fail));
        let payload = json!({
            "matter": "m",
            "hexagram": "水火既济",
            "lines": ["yang", "yin", "yang", "yin", "yang", "yin"],
        });

        let (status, body) = send(&app, post_json("/api/divination/interpret", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["interpretation"],
            "卦象水火既济表示...(API调用失败，使用默认解读)"
        );
        assert_eq!(body["advice"], "建议顺应自然，谨慎行事。");
    }

    #[tokio::test]
    async fn invalid_lines_are_rejected_at_the_boundary() {
        let (app, _) = app(Scripted::reply("x"));

        let bad_token = json!({
            "matter": "m",
            "hexagram": "h",
            "lines": ["yang", "yin", "yang", "yin", "yang", "shaoyang"],
        });
        let (status, body) = send(&app, post_json("/api/divination/interpret", bad_token)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].as_str().unwrap().contains("shaoyang"));

        let short = json!({"matter": "m", "hexagram": "h", "lines": ["yang", "yin"]});
        let (status, _) = send(&app, post_json("/api/divination/interpret", short)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, body) =
            send(&app, post_json("/api/divination/generate", json!({"topic": "m"}))).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["detail"].is_string());
    }

    #[tokio::test]
    async fn health_follows_reporter_and_shutdown() {
        let (app, state) = app(Scripted::reply("x"));

        let (status, body) = send(&app, get("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "serving");
        assert_eq!(body["workers"], 2);

        state.health.set_not_serving();
        let (status, body) = send(&app, get("/healthz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "not serving");

        state.health.set_serving();
        state.service.shutdown().await.unwrap();
        let (status, _) = send(&app, get("/healthz")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn cors_allows_any_origin() {
        let (app, _) = app(Scripted::reply("x"));
        let request = Request::builder()
            .uri("/healthz")
            .header(header::ORIGIN, "http://example.com")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
    }
}
