use std::net::SocketAddr;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{assets, auth};

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .nest(
            "/api/v1",
            Router::new()
                .merge(auth::router())
                .merge(assets::router())
                .route("/health", get(|| async { "ok" })),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod router_tests {
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Method, Request, StatusCode},
    };
    use serde_json::Value;
    use time::{Date, Month};
    use tower::ServiceExt;
    use uuid::Uuid;

    use super::*;
    use crate::assets::repo_types::{Category, Gender, NewAsset};
    use crate::auth::{jwt::JwtKeys, repo_types::Role};

    fn token(state: &AppState, role: Role) -> String {
        JwtKeys::from_ref(state)
            .sign_access(Uuid::new_v4(), role)
            .unwrap()
    }

    fn request(method: Method, uri: &str, bearer: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(t) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn seed_asset(state: &AppState, identifier: &str) {
        state
            .engine
            .create(
                NewAsset {
                    identifier: identifier.into(),
                    firstname: "Sara".into(),
                    lastname: "Tesfaye".into(),
                    brand: "Lenovo".into(),
                    serialnumber: format!("SN-{identifier}"),
                    description: Category::Staff,
                    gender: Gender::Female,
                    phonenumber: "0911223344".into(),
                    pcowner: "DBU".into(),
                    end_year: Date::from_calendar_date(2024, Month::June, 30).unwrap(),
                    status: None,
                },
                "photo.png".into(),
            )
            .await
            .unwrap();
    }

    async fn json_body(res: axum::response::Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_is_public() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(request(Method::GET, "/api/v1/health", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn listing_requires_a_token() {
        let app = build_app(AppState::fake());
        let res = app
            .oneshot(request(Method::GET, "/api/v1/pcuser", None))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(res).await["error"], "unauthorized");
    }

    #[tokio::test]
    async fn security_role_cannot_archive() {
        let state = AppState::fake();
        seed_asset(&state, "DBU/9/1").await;
        let t = token(&state, Role::Security);

        let res = build_app(state.clone())
            .oneshot(request(
                Method::POST,
                "/api/v1/pcuser/archive?identifier=DBU%2F9%2F1",
                Some(&t),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(state.engine.get("DBU/9/1").await.is_ok());
    }

    #[tokio::test]
    async fn user_role_archives_and_security_scans() {
        let state = AppState::fake();
        seed_asset(&state, "DBU/9/2").await;

        let res = build_app(state.clone())
            .oneshot(request(
                Method::POST,
                "/api/v1/pcuser/archive?identifier=DBU%2F9%2F2",
                Some(&token(&state, Role::User)),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["msg"], "archived");

        let res = build_app(state.clone())
            .oneshot(request(
                Method::GET,
                "/api/v1/pcuser/scan?identifier=DBU%2F9%2F2",
                Some(&token(&state, Role::Security)),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["error"], "not_found");
    }

    #[tokio::test]
    async fn year_listing_uses_path_year() {
        let state = AppState::fake();
        seed_asset(&state, "DBU/9/3").await;
        let t = token(&state, Role::Security);

        let res = build_app(state.clone())
            .oneshot(request(Method::GET, "/api/v1/pcuser/year/2024", Some(&t)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body.as_array().map(Vec::len), Some(1));
        assert_eq!(body[0]["identifier"], "DBU/9/3");
    }

    #[tokio::test]
    async fn barcode_is_served_without_auth() {
        let state = AppState::fake();
        seed_asset(&state, "DBU/9/4").await;
        let record = state.engine.get("DBU/9/4").await.unwrap();

        let res = build_app(state)
            .oneshot(request(
                Method::GET,
                &format!("/api/v1/pcuser/barcodes/{}", record.barcode),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
    }

    const BOUNDARY: &str = "pctrack-test-boundary";

    fn create_form(identifier: &str, serial: &str, image_name: &str) -> Body {
        let fields = [
            ("userId", identifier),
            ("firstname", "Abebe"),
            ("lastname", "Kebede"),
            ("brand", "HP"),
            ("serialnumber", serial),
            ("description", "Student"),
            ("gender", "Male"),
            ("phonenumber", "0911000000"),
            ("pcowner", "Personal"),
            ("endYear", "2025-07-30"),
        ];
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"{image_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n\
             fake-image-bytes\r\n--{BOUNDARY}--\r\n"
        ));
        Body::from(body)
    }

    fn create_request(token: &str, form: Body) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/pcuser")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(form)
            .unwrap()
    }

    fn json_request(method: Method, uri: &str, bearer: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn multipart_create_stores_image_and_barcode() {
        let (state, storage) = AppState::fake_with_storage();
        let t = token(&state, Role::User);

        let res = build_app(state.clone())
            .oneshot(create_request(&t, create_form("DBU/1201/13", "SN-1", "me.jpg")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = json_body(res).await;
        assert_eq!(body["identifier"], "DBU/1201/13");
        assert_eq!(body["state"], "Active");

        let image = body["image"].as_str().unwrap();
        let barcode = body["barcode"].as_str().unwrap();
        assert!(image.ends_with(".jpg"));
        let keys = storage.keys();
        assert!(keys.contains(&format!("images/{image}")));
        assert!(keys.contains(&format!("barcodes/{barcode}")));
    }

    #[tokio::test]
    async fn multipart_create_rejects_gif_upload() {
        let (state, storage) = AppState::fake_with_storage();
        let t = token(&state, Role::Admin);

        let res = build_app(state.clone())
            .oneshot(create_request(&t, create_form("DBU/1/1", "SN-2", "me.gif")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "invalid_input");
        assert!(storage.keys().is_empty());
        assert!(state.engine.get("DBU/1/1").await.is_err());
    }

    #[tokio::test]
    async fn multipart_create_with_taken_serial_conflicts_without_upload() {
        let (state, storage) = AppState::fake_with_storage();
        let t = token(&state, Role::User);

        let res = build_app(state.clone())
            .oneshot(create_request(&t, create_form("DBU/2/1", "SN-3", "a.png")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let stored = storage.keys().len();

        let res = build_app(state.clone())
            .oneshot(create_request(&t, create_form("DBU/2/2", "SN-3", "b.png")))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        assert_eq!(json_body(res).await["error"], "conflict");
        assert_eq!(storage.keys().len(), stored);
    }

    #[tokio::test]
    async fn barcode_for_dotted_identifier_is_retrievable() {
        let state = AppState::fake();
        seed_asset(&state, "PC..7").await;
        let record = state.engine.get("PC..7").await.unwrap();
        assert!(record.barcode.starts_with("PC..7-"));

        let res = build_app(state)
            .oneshot(request(
                Method::GET,
                &format!("/api/v1/pcuser/barcodes/{}", record.barcode),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_year_renders_json_error() {
        let state = AppState::fake();
        let t = token(&state, Role::Security);

        let res = build_app(state)
            .oneshot(request(Method::GET, "/api/v1/pcuser/year/2024-06-01", Some(&t)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn missing_identifier_and_bad_patch_render_json_errors() {
        let state = AppState::fake();
        seed_asset(&state, "DBU/9/5").await;
        let t = token(&state, Role::User);

        let res = build_app(state.clone())
            .oneshot(request(Method::GET, "/api/v1/pcuser/search", Some(&t)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "invalid_input");

        let res = build_app(state)
            .oneshot(json_request(
                Method::PUT,
                "/api/v1/pcuser?identifier=DBU%2F9%2F5",
                Some(&t),
                serde_json::json!({ "gender": "Robot" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["error"], "invalid_input");
    }

    #[tokio::test]
    async fn admin_creates_security_account_that_can_log_in() {
        let state = AppState::fake();
        let admin = token(&state, Role::Admin);

        let res = build_app(state.clone())
            .oneshot(json_request(
                Method::POST,
                "/api/v1/users",
                Some(&admin),
                serde_json::json!({
                    "email": "Gate1@DBU.edu.et",
                    "password": "gate-pass-1",
                    "role": "security"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let created = json_body(res).await;
        assert_eq!(created["email"], "gate1@dbu.edu.et");
        assert_eq!(created["role"], "security");
        assert!(created.get("password_hash").is_none());

        let res = build_app(state.clone())
            .oneshot(request(Method::GET, "/api/v1/users?role=security", Some(&admin)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await.as_array().map(Vec::len), Some(1));

        let res = build_app(state)
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                serde_json::json!({ "email": "gate1@dbu.edu.et", "password": "gate-pass-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["user"]["role"], "security");
    }

    #[tokio::test]
    async fn deactivated_account_cannot_log_in() {
        let state = AppState::fake();
        let admin = token(&state, Role::Admin);
        let user = crate::auth::services::create_user(
            state.users.as_ref(),
            state.hasher.as_ref(),
            "clerk@dbu.edu.et",
            "clerk-pass-1",
            Role::User,
        )
        .await
        .unwrap();

        let res = build_app(state.clone())
            .oneshot(json_request(
                Method::PATCH,
                &format!("/api/v1/users/{}", user.id),
                Some(&admin),
                serde_json::json!({ "status": "inactive" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(json_body(res).await["status"], "inactive");

        let res = build_app(state)
            .oneshot(json_request(
                Method::POST,
                "/api/v1/auth/login",
                None,
                serde_json::json!({ "email": "clerk@dbu.edu.et", "password": "clerk-pass-1" }),
            ))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn user_management_is_admin_only() {
        let state = AppState::fake();
        let t = token(&state, Role::User);

        let res = build_app(state)
            .oneshot(request(Method::GET, "/api/v1/users", Some(&t)))
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(res).await["error"], "forbidden");
    }
}
