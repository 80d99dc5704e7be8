use axum::{
    extract::{DefaultBodyLimit, Request},
    http::{Method, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::app_state::AppState;
use crate::handlers;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/version", get(handlers::version::version))
        .route("/upload", post(handlers::upload::upload_report))
        .route("/sos", post(handlers::sos::receive_sos))
        .nest_service("/uploads", ServeDir::new(state.store.uploads_dir()));

    if let Some(static_dir) = &state.config.static_dir {
        router = router.fallback_service(ServeDir::new(static_dir));
    }

    router
        .layer(DefaultBodyLimit::max(state.config.max_request_bytes()))
        .layer(cors)
        .layer(middleware::from_fn(preflight_no_content))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Answers CORS preflight with 204 instead of the cors layer's 200.
async fn preflight_no_content(request: Request, next: Next) -> Response {
    let is_options = request.method() == Method::OPTIONS;
    let mut response = next.run(request).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use std::path::Path;
    use tempfile::{tempdir, TempDir};
    use tower::ServiceExt;

    const BOUNDARY: &str = "incident-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                            name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn upload_request(parts: &[Part<'_>]) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(multipart_body(parts)))
            .unwrap()
    }

    fn sos_request(body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/sos")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn test_app(tweak: impl FnOnce(&mut Config)) -> (TempDir, Config, Router) {
        let tmp = tempdir().unwrap();
        let mut config = Config {
            data_dir: tmp.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut config);
        let app = create_router(AppState::new(config.clone()));
        (tmp, config, app)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(app, request).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn json_files(dir: &Path, prefix: &str) -> Vec<Value> {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return Vec::new();
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(prefix))
            .map(|e| serde_json::from_slice(&std::fs::read(e.path()).unwrap()).unwrap())
            .collect()
    }

    fn file_count(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    fn path_of(url: &str) -> &str {
        url.strip_prefix("http://localhost:3000").unwrap()
    }

    #[tokio::test]
    async fn test_upload_without_media() {
        let (_tmp, config, app) = test_app(|_| {});

        let (status, body) = send_json(
            &app,
            upload_request(&[
                Part::Text("crime-type", "vandalism"),
                Part::Text("description", "Broken window"),
                Part::Text("latitude", "40.7128"),
                Part::Text("longitude", "-74.006"),
                Part::Text("location", "Lat: 40.7128, Lng: -74.006"),
                Part::Text("timestamp", "2024-01-01T00:00:00.000Z"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true, "photoURLs": [], "videoURL": null}));

        let reports = json_files(&config.reports_dir(), "report-");
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0],
            json!({
                "crimeType": "vandalism",
                "description": "Broken window",
                "location": {"lat": 40.7128, "lng": -74.006, "display": "Lat: 40.7128, Lng: -74.006"},
                "timestamp": "2024-01-01T00:00:00.000Z",
                "photoURLs": [],
                "videoURL": null
            })
        );
    }

    #[tokio::test]
    async fn test_uploaded_media_is_served_back() {
        let (_tmp, config, app) = test_app(|_| {});
        let photo_a: &[u8] = b"\xff\xd8\xff\xe0 first photo";
        let photo_b: &[u8] = b"\xff\xd8\xff\xe0 second photo";
        let clip: &[u8] = b"\x1a\x45\xdf\xa3 webm clip";

        let (status, body) = send_json(
            &app,
            upload_request(&[
                Part::Text("crime-type", "theft"),
                Part::File("photos", "evidence-photo-1-a.jpeg", photo_a),
                Part::File("photos", "evidence-photo-2-b.jpeg", photo_b),
                Part::File("video", "evidence-video-c.webm", clip),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let photo_urls: Vec<String> =
            serde_json::from_value(body["photoURLs"].clone()).unwrap();
        let video_url = body["videoURL"].as_str().unwrap().to_string();
        assert_eq!(photo_urls.len(), 2);
        assert!(photo_urls[0].starts_with("http://localhost:3000/uploads/photos-"));
        assert!(photo_urls[0].ends_with(".jpeg"));
        assert!(video_url.starts_with("http://localhost:3000/uploads/video-"));
        assert!(video_url.ends_with(".webm"));

        for (url, expected) in [
            (&photo_urls[0], photo_a),
            (&photo_urls[1], photo_b),
            (&video_url, clip),
        ] {
            let request = Request::builder()
                .uri(path_of(url))
                .body(Body::empty())
                .unwrap();
            let (status, bytes) = send(&app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(bytes, expected);
        }

        let reports = json_files(&config.reports_dir(), "report-");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0]["photoURLs"], body["photoURLs"]);
        assert_eq!(reports[0]["videoURL"], body["videoURL"]);
    }

    #[tokio::test]
    async fn test_urls_use_request_host() {
        let (_tmp, _config, app) = test_app(|_| {});
        let mut request = upload_request(&[Part::File("photos", "a.png", b"png")]);
        request
            .headers_mut()
            .insert(header::HOST, "incidents.example.net".parse().unwrap());

        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        let url = body["photoURLs"][0].as_str().unwrap();
        assert!(url.starts_with("http://incidents.example.net/uploads/photos-"));
        assert!(url.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_eleven_photos_rejected() {
        let (_tmp, config, app) = test_app(|_| {});
        let names: Vec<String> = (1..=11).map(|n| format!("p{}.jpeg", n)).collect();
        let parts: Vec<Part<'_>> = names
            .iter()
            .map(|n| Part::File("photos", n.as_str(), b"jpeg"))
            .collect();

        let (status, body) = send_json(&app, upload_request(&parts)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Too many files for field 'photos' (max 10)");
        assert!(json_files(&config.reports_dir(), "report-").is_empty());
    }

    #[tokio::test]
    async fn test_second_video_rejected() {
        let (_tmp, _config, app) = test_app(|_| {});
        let (status, body) = send_json(
            &app,
            upload_request(&[
                Part::File("video", "a.webm", b"one"),
                Part::File("video", "b.webm", b"two"),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Too many files for field 'video' (max 1)");
    }

    #[tokio::test]
    async fn test_unexpected_file_field_rejected() {
        let (_tmp, _config, app) = test_app(|_| {});
        let (status, body) = send_json(
            &app,
            upload_request(&[Part::File("attachment", "a.pdf", b"pdf")]),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_oversized_file_rejected_and_removed() {
        let (_tmp, config, app) = test_app(|c| c.max_file_bytes = 8);

        let (status, body) = send_json(
            &app,
            upload_request(&[Part::File("photos", "big.jpeg", b"0123456789abcdef")]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(file_count(&config.uploads_dir()), 0);
        assert!(json_files(&config.reports_dir(), "report-").is_empty());
    }

    #[tokio::test]
    async fn test_malformed_coordinates_stored_as_null() {
        let (_tmp, config, app) = test_app(|_| {});

        let (status, _) = send_json(
            &app,
            upload_request(&[
                Part::Text("latitude", "somewhere"),
                Part::Text("longitude", "12.5east"),
            ]),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let reports = json_files(&config.reports_dir(), "report-");
        assert!(reports[0]["location"]["lat"].is_null());
        assert_eq!(reports[0]["location"]["lng"], 12.5);
        assert!(reports[0]["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[tokio::test]
    async fn test_concurrent_uploads_get_distinct_files() {
        let (_tmp, config, app) = test_app(|_| {});

        let first = send_json(&app, upload_request(&[Part::File("photos", "same.jpeg", b"one")]));
        let second = send_json(&app, upload_request(&[Part::File("photos", "same.jpeg", b"two")]));
        let ((s1, b1), (s2, b2)) = tokio::join!(first, second);

        assert_eq!(s1, StatusCode::OK);
        assert_eq!(s2, StatusCode::OK);
        assert_ne!(b1["photoURLs"][0], b2["photoURLs"][0]);
        assert_eq!(file_count(&config.uploads_dir()), 2);
        assert_eq!(json_files(&config.reports_dir(), "report-").len(), 2);
    }

    #[tokio::test]
    async fn test_sos_is_stored_verbatim() {
        let (_tmp, config, app) = test_app(|_| {});
        let alert = json!({"location": {"lat": 1, "lng": 2}, "timestamp": "2024-01-01T00:00:00Z"});

        let (status, body) = send_json(&app, sos_request(&alert.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
        assert_eq!(json_files(&config.reports_dir(), "sos-"), vec![alert]);
    }

    #[tokio::test]
    async fn test_sos_arbitrary_shape_is_kept() {
        let (_tmp, config, app) = test_app(|_| {});
        let odd = json!({"note": "no location", "level": [1, 2, 3]});

        let (status, _) = send_json(&app, sos_request(&odd.to_string())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_files(&config.reports_dir(), "sos-"), vec![odd]);
    }

    #[tokio::test]
    async fn test_sos_invalid_json() {
        let (_tmp, config, app) = test_app(|_| {});

        let (status, body) = send_json(&app, sos_request("{not json")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(json_files(&config.reports_dir(), "sos-").is_empty());
    }

    #[tokio::test]
    async fn test_sos_write_failure_is_500() {
        let (tmp, _config, app) = test_app(|_| {});
        std::fs::write(tmp.path().join("reports"), b"blocker").unwrap();

        let (status, body) = send_json(&app, sos_request("{}")).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_missing_upload_is_404() {
        let (_tmp, _config, app) = test_app(|_| {});
        let request = Request::builder()
            .uri("/uploads/photos-missing.jpeg")
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_preflight_is_no_content() {
        let (_tmp, _config, app) = test_app(|_| {});
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/upload")
            .header(header::ORIGIN, "http://example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(
            response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_static_frontend_fallback() {
        let site = tempdir().unwrap();
        std::fs::write(site.path().join("index.html"), b"<h1>Report an incident</h1>").unwrap();
        let site_dir = site.path().to_path_buf();
        let (_tmp, _config, app) = test_app(move |c| c.static_dir = Some(site_dir));

        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, body) = send(&app, request).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"<h1>Report an incident</h1>");
    }

    #[tokio::test]
    async fn test_health() {
        let (_tmp, _config, app) = test_app(|_| {});
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"status": "healthy", "service": "incident-ingest"}));
    }

    #[tokio::test]
    async fn test_version() {
        let (_tmp, _config, app) = test_app(|_| {});
        let request = Request::builder().uri("/version").body(Body::empty()).unwrap();

        let (status, body) = send_json(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["service"], "incident-ingest");
        assert!(!body["version"].as_str().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upload_without_multipart_body_is_json_error() {
        let (_tmp, config, app) = test_app(|_| {});

        let content_types = [
            Some("application/json"),
            None,
            Some("multipart/form-data"),
        ];
        for content_type in content_types {
            let mut builder = Request::builder().method(Method::POST).uri("/upload");
            if let Some(content_type) = content_type {
                builder = builder.header(header::CONTENT_TYPE, content_type);
            }
            let request = builder.body(Body::from("{}")).unwrap();

            let (status, body) = send_json(&app, request).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{:?}", content_type);
            assert_eq!(body["success"], false);
            assert!(body["error"].as_str().unwrap().starts_with("Failed to read multipart data"));
        }
        assert!(json_files(&config.reports_dir(), "report-").is_empty());
    }

    #[tokio::test]
    async fn test_oversized_text_field_rejected() {
        let (_tmp, config, app) = test_app(|_| {});
        let description = "x".repeat(handlers::upload::MAX_FIELD_BYTES + 1);

        let (status, body) = send_json(
            &app,
            upload_request(&[
                Part::Text("crime-type", "theft"),
                Part::Text("description", &description),
            ]),
        )
        .await;

        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert_eq!(
            body["error"],
            format!(
                "Field 'description' exceeds the maximum size of {} bytes",
                handlers::upload::MAX_FIELD_BYTES
            )
        );
        assert!(json_files(&config.reports_dir(), "report-").is_empty());
    }

    #[tokio::test]
    async fn test_text_field_at_limit_accepted() {
        let (_tmp, config, app) = test_app(|_| {});
        let description = "y".repeat(handlers::upload::MAX_FIELD_BYTES);

        let (status, _body) = send_json(
            &app,
            upload_request(&[Part::Text("description", &description)]),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let reports = json_files(&config.reports_dir(), "report-");
        assert_eq!(reports[0]["description"].as_str().unwrap().len(), description.len());
    }
}
