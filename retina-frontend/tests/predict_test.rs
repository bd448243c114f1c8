mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_string, multipart_body, upload_request, FailingStorage, StubLoader, TestApp};
use retina_frontend::startup::build_router;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::util::ServiceExt;

#[tokio::test]
async fn upload_is_graded_saved_and_archived() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "10011_right.png", "image/png", b"fake png bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("Moderate"));
    assert!(html.contains("0.0500, 0.1500, 0.6000, 0.1500, 0.0500"));
    assert!(html.contains("2.1000"));
    assert!(html.contains("1.9000"));

    let saved = app.saved_uploads();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_name().unwrap(), "10011_right.png");
    assert_eq!(std::fs::read(&saved[0]).unwrap(), b"fake png bytes");
    let served = saved[0].strip_prefix(app.data_dir.path()).unwrap();
    assert!(html.contains(&format!("/uploads/{}", served.display())));

    let archived = app.archive_dir.path().join("image/10011_right.png");
    assert_eq!(std::fs::read(archived).unwrap(), b"fake png bytes");
}

#[tokio::test]
async fn model_is_loaded_once_across_requests() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    for name in ["a.png", "b.png", "c.png"] {
        let body = multipart_body("image", name, "image/png", b"bytes");
        let response = router.clone().oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(app.loads(), 1);
}

#[tokio::test]
async fn client_path_in_file_name_is_stripped() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "../../escape.png", "image/png", b"bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let saved = app.saved_uploads();
    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].file_name().unwrap(), "escape.png");
    assert!(saved[0].starts_with(app.data_dir.path()));
    assert!(app.archive_dir.path().join("image/escape.png").is_file());
}

#[tokio::test]
async fn uploads_with_the_same_name_are_kept_apart() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    for data in [b"left eye".as_slice(), b"right eye".as_slice()] {
        let body = multipart_body("image", "fundus.png", "image/png", data);
        let response = router.clone().oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.contains("fundus.png"));
    }

    let mut contents: Vec<Vec<u8>> = app
        .saved_uploads()
        .iter()
        .map(|path| std::fs::read(path).unwrap())
        .collect();
    contents.sort();
    assert_eq!(contents, vec![b"left eye".to_vec(), b"right eye".to_vec()]);
}

#[tokio::test]
async fn missing_image_field_is_bad_request() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("document", "eye.png", "image/png", b"bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "bad request!");
    assert_eq!(app.loads(), 0);
}

#[tokio::test]
async fn non_image_content_type_is_bad_request() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "notes.txt", "text/plain", b"hello");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "bad request!");
    assert!(app.saved_uploads().is_empty());
}

#[tokio::test]
async fn empty_upload_is_bad_request() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "eye.png", "image/png", b"");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_multipart_post_is_bad_request() {
    let app = TestApp::new(StubLoader::working()).await;
    let router = build_router(app.state.clone());

    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"image": "x"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "bad request!");
}

#[tokio::test]
async fn unavailable_model_is_service_unavailable() {
    let app = TestApp::new(StubLoader::broken()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "eye.png", "image/png", b"bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    // Nothing is archived when no prediction was made.
    assert!(!app.archive_dir.path().join("image/eye.png").exists());
}

#[tokio::test]
async fn archive_failure_still_returns_results() {
    let archive = Arc::new(FailingStorage::default());
    let app = TestApp::with_archive(StubLoader::working(), archive.clone()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "eye.png", "image/png", b"bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("Moderate"));
    assert!(html.contains("2.1000"));
    assert_eq!(archive.attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn undecodable_image_is_bad_request() {
    let app = TestApp::new(StubLoader::unreadable_images()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "eye.png", "image/png", b"not really a png");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert!(body["error"].as_str().unwrap().contains("not an image"));
    assert!(!app.archive_dir.path().join("image/eye.png").exists());
}

#[tokio::test]
async fn remote_backend_failure_is_bad_gateway() {
    let app = TestApp::new(StubLoader::remote_down()).await;
    let router = build_router(app.state.clone());

    let body = multipart_body("image", "eye.png", "image/png", b"bytes");
    let response = router.oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    assert!(!app.archive_dir.path().join("image/eye.png").exists());
}
