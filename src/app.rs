use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::auth;
use crate::state::AppState;

pub fn build_app(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.config.static_dir);

    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .route("/health", get(|| async { "ok" })),
        )
        .fallback_service(static_files)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    // The callback query carries the provider code; log the path only.
                    let path = req.uri().path().to_string();
                    tracing::info_span!("http_request", %method, %path, status = tracing::field::Empty)
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        if status.is_server_error() {
                            tracing::error!(%status, ?latency, "response");
                        } else {
                            tracing::info!(%status, ?latency, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::fake::FakeOAuth;
    use crate::state::test_support::{fake_state, state_with_users, FlakyUserStore};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(res.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(Method::POST)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .method(Method::GET)
            .body(Body::empty())
            .unwrap()
    }

    fn location(res: &axum::response::Response) -> url::Url {
        let raw = res
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .expect("location header");
        url::Url::parse(raw).unwrap()
    }

    fn ada() -> Value {
        json!({
            "full_name": "Ada Lovelace",
            "email": "ada@example.com",
            "password": "x",
            "confirm_password": "x",
            "role": "student"
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let (state, _) = fake_state();
        let res = build_app(state).oneshot(get("/api/v1/health")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signup_returns_token_and_user() {
        let (state, _) = fake_state();
        let tokens = state.tokens.clone();
        let res = build_app(state)
            .oneshot(post_json("/api/v1/auth/signup", ada()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);

        let json = body_json(res).await;
        let claims = tokens.verify(json["token"].as_str().unwrap()).unwrap();
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.role, "student");
        assert_eq!(json["user"]["testsCreated"], 0);
        assert_eq!(json["user"]["averageScore"], 0.0);
        assert!(json["user"].get("password").is_none());
    }

    #[tokio::test]
    async fn duplicate_signup_is_400() {
        let (state, _) = fake_state();
        let app = build_app(state);
        let first = app
            .clone()
            .oneshot(post_json("/api/v1/auth/signup", ada()))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app
            .oneshot(post_json("/api/v1/auth/signup", ada()))
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::BAD_REQUEST);
        let json = body_json(second).await;
        assert_eq!(json["message"], "Email already in use");
        assert_eq!(json["error"], true);
    }

    #[tokio::test]
    async fn mismatched_passwords_are_400() {
        let (state, users) = fake_state();
        let mut body = ada();
        body["confirm_password"] = json!("y");
        let res = build_app(state)
            .oneshot(post_json("/api/v1/auth/signup", body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Passwords do not match");
        assert!(users.is_empty().await);
    }

    #[tokio::test]
    async fn malformed_signup_body_is_400() {
        let (state, users) = fake_state();
        let mut body = ada();
        body.as_object_mut().unwrap().remove("confirm_password");
        let res = build_app(state)
            .oneshot(post_json("/api/v1/auth/signup", body))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let json = body_json(res).await;
        assert_eq!(json["message"], "Invalid request");
        assert_eq!(json["error"], true);
        assert!(users.is_empty().await);
    }

    #[tokio::test]
    async fn login_without_json_content_type_is_400() {
        let (state, _) = fake_state();
        let req = Request::builder()
            .uri("/api/v1/auth/login")
            .method(Method::POST)
            .body(Body::from("email=a@b.c"))
            .unwrap();
        let res = build_app(state).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(res).await["message"], "Invalid request");
    }

    #[tokio::test]
    async fn signup_storage_failure_is_500() {
        let users = std::sync::Arc::new(FlakyUserStore {
            fail_insert: true,
            ..Default::default()
        });
        let state = state_with_users(
            users,
            FakeOAuth::with_profile("grace@example.com", "Grace Hopper"),
        );
        let res = build_app(state)
            .oneshot(post_json("/api/v1/auth/signup", ada()))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(res).await;
        assert_eq!(json["message"], "Could not access user storage");
        assert_eq!(json["error"], true);
    }

    #[tokio::test]
    async fn google_round_trip_redirects_with_token() {
        let (state, _) = fake_state();
        let tokens = state.tokens.clone();
        let frontend = state.config.frontend_url.clone();
        let app = build_app(state);

        let res = app.clone().oneshot(get("/api/v1/auth/google")).await.unwrap();
        assert!(res.status().is_redirection());
        let provider_url = location(&res);
        let csrf = provider_url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap();

        let callback = format!("/api/v1/auth/google/callback?code=abc&state={csrf}");
        let res = app.oneshot(get(&callback)).await.unwrap();
        assert!(res.status().is_redirection());
        let target = location(&res);
        assert!(target.as_str().starts_with(&frontend));
        let token = target
            .query_pairs()
            .find(|(k, _)| k == "token")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(tokens.verify(&token).unwrap().email, "grace@example.com");
    }

    #[tokio::test]
    async fn callback_with_forged_state_is_400() {
        let (state, _) = fake_state();
        let res = build_app(state)
            .oneshot(get("/api/v1/auth/google/callback?code=abc&state=random-state"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn callback_without_code_is_400() {
        let (state, _) = fake_state();
        let res = build_app(state)
            .oneshot(get("/api/v1/auth/google/callback?state=whatever"))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn me_requires_a_bearer_token() {
        let (state, _) = fake_state();
        let res = build_app(state).oneshot(get("/api/v1/me")).await.unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn me_returns_the_signed_up_user() {
        let (state, _) = fake_state();
        let app = build_app(state);
        let res = app
            .clone()
            .oneshot(post_json("/api/v1/auth/signup", ada()))
            .await
            .unwrap();
        let token = body_json(res).await["token"].as_str().unwrap().to_string();

        let req = Request::builder()
            .uri("/api/v1/me")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_json(res).await["email"], "ada@example.com");
    }
}
