//! Defines routes for the image publishing API.
//!
//! ## Structure
//! - **Publishing**
//!   - `POST   /upload`        — publish an image (multipart form)
//!   - `GET    /upload`        — remote store connection check
//!
//! - **Records**
//!   - `GET    /images`        — list active images (`type`, `category`, `limit`)
//!   - `DELETE /images/{id}`   — soft-delete an image
//!
//! - **Probes**
//!   - `GET    /healthz`, `GET /readyz`

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        image_handlers::{delete_image, list_images},
        upload_handlers::{check_connection, upload_image},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get},
};

/// Multipart framing and text fields on top of the image itself.
const FORM_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build and return the router for all API routes.
///
/// The upload route accepts bodies slightly larger than `max_upload_bytes` so
/// an oversized image is rejected by validation with a readable message rather
/// than by the transport.
pub fn routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route(
            "/upload",
            get(check_connection)
                .post(upload_image)
                .layer(DefaultBodyLimit::max(
                    max_upload_bytes.saturating_add(FORM_OVERHEAD_BYTES),
                )),
        )
        .route("/images", get(list_images))
        .route("/images/{id}", delete(delete_image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::FtpConfig,
        services::{
            image_transform::ImageOptimizer,
            metadata_store::{MetadataStore, test_support::memory_store},
            transfer_client::memory::MemoryConnector,
            upload_pipeline::{UploadPipeline, test_support::settings},
        },
    };
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use serde_json::Value;
    use std::{io::Cursor, sync::Arc};
    use tower::ServiceExt;

    const BOUNDARY: &str = "X-IMAGE-PUBLISHER-BOUNDARY";

    struct TestApp {
        router: Router,
        connector: MemoryConnector,
        store: MetadataStore,
    }

    async fn app(connector: MemoryConnector) -> TestApp {
        let store = memory_store().await;
        let settings = settings();
        let max = settings.max_upload_bytes;
        let pipeline = UploadPipeline::new(
            Arc::new(connector.clone()),
            store.clone(),
            ImageOptimizer::default(),
            settings,
        );
        let state = AppState {
            pipeline,
            store: store.clone(),
            ftp: Arc::new(FtpConfig {
                host: "ftp.example.com".into(),
                port: 21,
                user: "deploy".into(),
                password: "hunter2".into(),
                base_path: "/public_html/uploads".into(),
            }),
        };
        TestApp {
            router: routes(max).with_state(state),
            connector,
            store,
        }
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    /// Hand-built multipart body: text fields plus an optional `image` part.
    fn multipart_body(fields: &[(&str, &str)], image: Option<(&str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn upload_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn upload_then_list_by_category() {
        let app = app(MemoryConnector::default()).await;
        let image = jpeg(1800, 1200);
        let body = multipart_body(
            &[("title", "Sunset"), ("category", "hero"), ("type", "hero")],
            Some(("Sunset.JPG", "image/jpeg", image.as_slice())),
        );

        let (status, json) = send(&app.router, upload_request(body)).await;
        assert_eq!(status, StatusCode::OK, "{json}");
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["type"], "hero");
        assert_eq!(json["data"]["title"], "Sunset");
        assert!(json["data"]["url"].as_str().unwrap().ends_with(".webp"));
        assert!(
            json["data"]["originalUrl"]
                .as_str()
                .unwrap()
                .ends_with(".jpg")
        );
        assert!(
            json["data"]["ftpPath"]
                .as_str()
                .unwrap()
                .starts_with("/public_html/uploads/optimized/")
        );

        let (status, json) = send(&app.router, get_request("/images?category=hero")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 1);
        assert_eq!(json["data"][0]["title"], "Sunset");
        assert_eq!(json["data"][0]["type"], "hero");
        assert_eq!(json["data"][0]["is_active"], true);
    }

    #[tokio::test]
    async fn unsupported_type_is_a_bad_request() {
        let app = app(MemoryConnector::default()).await;
        let body = multipart_body(&[], Some(("notes.txt", "text/plain", &b"hello"[..])));

        let (status, json) = send(&app.router, upload_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"].as_str().unwrap().contains("text/plain"));
        assert_eq!(app.connector.state().opens, 0);
    }

    #[tokio::test]
    async fn missing_file_is_a_bad_request() {
        let app = app(MemoryConnector::default()).await;
        let body = multipart_body(&[("title", "Nothing")], None);

        let (status, json) = send(&app.router, upload_request(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "No file uploaded");
    }

    #[tokio::test]
    async fn transfer_failure_returns_500_with_code() {
        let connector =
            MemoryConnector::default().with(|r| r.fail_put_containing = Some("/optimized/".into()));
        let app = app(connector).await;
        let image = jpeg(64, 64);
        let body = multipart_body(&[], Some(("a.jpg", "image/jpeg", image.as_slice())));

        let (status, json) = send(&app.router, upload_request(body)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Upload failed");
        assert_eq!(json["code"], "552");
        assert!(json["details"].as_str().is_some());

        let (_, json) = send(&app.router, get_request("/images")).await;
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn connection_check_lists_remote_base() {
        let app = app(MemoryConnector::default()).await;
        let image = jpeg(32, 32);
        let body = multipart_body(&[], Some(("a.jpg", "image/jpeg", image.as_slice())));
        send(&app.router, upload_request(body)).await;

        let (status, json) = send(&app.router, get_request("/upload")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
        assert_eq!(json["path"], "/public_html/uploads");
        let files = json["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f["type"] == "d"));
    }

    #[tokio::test]
    async fn connection_check_failure_hides_password() {
        let app = app(MemoryConnector::default().with(|r| r.fail_open = true)).await;

        let (status, json) = send(&app.router, get_request("/upload")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["success"], false);
        assert_eq!(json["config"]["host"], "ftp.example.com");
        assert_eq!(json["config"]["user"], "deploy");
        assert!(!json.to_string().contains("hunter2"));
    }

    #[tokio::test]
    async fn list_ignores_empty_filters_and_bad_limit() {
        let app = app(MemoryConnector::default()).await;
        for (title, category) in [("One", "hero"), ("Two", "hero"), ("Three", "product")] {
            app.store
                .insert(&crate::services::metadata_store::test_support::record(
                    title, category, "hero",
                ))
                .await
                .unwrap();
        }

        let (status, json) = send(
            &app.router,
            get_request("/images?type=&category=&limit=abc"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["count"], 3);

        let (_, json) = send(&app.router, get_request("/images?category=hero")).await;
        let titles: Vec<_> = json["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["title"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(titles, ["Two", "One"]);

        let (_, json) = send(&app.router, get_request("/images?limit=1")).await;
        assert_eq!(json["count"], 1);
    }

    #[tokio::test]
    async fn delete_hides_image_and_second_delete_is_404() {
        let app = app(MemoryConnector::default()).await;
        let id = app
            .store
            .insert(&crate::services::metadata_store::test_support::record(
                "Old", "hero", "hero",
            ))
            .await
            .unwrap();

        let delete_req = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/images/{id}"))
                .body(Body::empty())
                .unwrap()
        };
        let (status, json) = send(&app.router, delete_req()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);

        let (status, _) = send(&app.router, delete_req()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, json) = send(&app.router, get_request("/images")).await;
        assert_eq!(json["count"], 0);
    }

    #[tokio::test]
    async fn probes_report_ok() {
        let app = app(MemoryConnector::default()).await;
        let (status, json) = send(&app.router, get_request("/healthz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "ok");

        let (status, json) = send(&app.router, get_request("/readyz")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["checks"]["sqlite"]["ok"], true);
    }
}
