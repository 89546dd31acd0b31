//! End-to-end protocol tests driven through the router.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tower::ServiceExt;

use oci_registry::api;
use oci_registry::config::Config;
use oci_registry::utils::state::AppState;

const EMPTY_DIGEST: &str =
    "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SAMPLE_MANIFEST: &str = r#"{
    "schemaVersion": 2,
    "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
    "config": {
        "mediaType": "application/vnd.docker.container.image.v1+json",
        "size": 1493,
        "digest": "sha256:6858809bf669cc5da7cb6af83d0fae838284d12e1be0182f92f6bd96559873e3"
    },
    "layers": [
        {
            "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
            "size": 764618,
            "digest": "sha256:df8698476c65c2ee7ca0e9dbc2b1c8b1c91bce555819a9aaab724ac64241ba67"
        }
    ]
}"#;

/// Registry over a throwaway root; the TempDir must outlive the router.
fn test_registry() -> (axum::Router, TempDir) {
    let root = TempDir::new().expect("could not create storage root");
    let config = Config {
        host: "localhost".into(),
        port: 5080,
        storage_backend: "FILESYSTEM".into(),
        root_dir: root.path().to_path_buf(),
    };
    let app = api::create_router(Arc::new(AppState::new(config)));
    (app, root)
}

fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

async fn read_body(response: axum::response::Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

/// Runs POST → PATCH → PUT for one blob and returns its digest.
async fn push_blob(app: &axum::Router, name: &str, data: &'static [u8]) -> String {
    let digest = sha256_digest(data);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v2/{name}/blobs/uploads/"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from(data))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    digest
}

async fn push_manifest(app: &axum::Router, name: &str, tag: &str, body: &'static str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/v2/{name}/manifests/{tag}"))
                .header(
                    header::CONTENT_TYPE,
                    "application/vnd.docker.distribution.manifest.v2+json",
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    response.headers()["docker-content-digest"]
        .to_str()
        .unwrap()
        .to_owned()
}

#[tokio::test]
async fn support_probe() {
    let (app, _root) = test_registry();

    let response = app
        .oneshot(Request::builder().uri("/v2/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
    assert_eq!(&read_body(response).await[..], b"{}");
}

#[tokio::test]
async fn sessioned_push_of_a_one_byte_blob() {
    let (app, _root) = test_registry();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/lib/x/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();
    assert!(location.starts_with("/v2/lib/x/blobs/uploads/"));

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("A"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::RANGE], "0-1");
    assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");

    let digest = sha256_digest(b"A");
    assert_eq!(
        digest,
        "sha256:559aead08264d5795d3909718cdd05abd49572e84fe55590eef31a88a08fdffd"
    );
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers()[header::LOCATION].to_str().unwrap(),
        format!("/v2/lib/x/blobs/{digest}")
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/v2/lib/x/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "1");
    assert_eq!(
        response.headers()["docker-content-digest"].to_str().unwrap(),
        digest
    );
}

#[tokio::test]
async fn pulled_blob_bytes_hash_back_to_their_digest() {
    let (app, _root) = test_registry();
    let digest = push_blob(&app, "lib/x", b"some layer bytes").await;

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/lib/x/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_body(response).await;
    assert_eq!(sha256_digest(&body), digest);
}

#[tokio::test]
async fn monolithic_push_of_an_empty_blob() {
    let (app, _root) = test_registry();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/v2/lib/x/blobs/uploads/?digest={EMPTY_DIGEST}"))
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(
        response.headers()[header::LOCATION].to_str().unwrap(),
        format!("/v2/lib/x/blobs/{EMPTY_DIGEST}")
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("HEAD")
                .uri(format!("/v2/lib/x/blobs/{EMPTY_DIGEST}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::CONTENT_LENGTH], "0");
}

#[tokio::test]
async fn manifest_pull_by_tag_and_by_digest() {
    let (app, _root) = test_registry();
    let digest = push_manifest(&app, "lib/x", "latest", SAMPLE_MANIFEST).await;
    assert!(digest.starts_with("sha256:"));
    assert_eq!(digest, sha256_digest(SAMPLE_MANIFEST.as_bytes()));

    let by_tag = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/manifests/latest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(by_tag.status(), StatusCode::OK);
    assert_eq!(
        by_tag.headers()[header::CONTENT_TYPE],
        "application/vnd.docker.distribution.manifest.v2+json"
    );
    assert_eq!(
        by_tag.headers()["docker-content-digest"].to_str().unwrap(),
        digest
    );

    let by_digest = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/lib/x/manifests/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(by_digest.status(), StatusCode::OK);
    assert_eq!(
        by_digest.headers()["docker-content-digest"].to_str().unwrap(),
        digest
    );

    let tag_body = read_body(by_tag).await;
    let digest_body = read_body(by_digest).await;
    assert_eq!(tag_body, digest_body);

    let manifest: serde_json::Value = serde_json::from_slice(&tag_body).unwrap();
    assert_eq!(manifest["schemaVersion"], 2);
    assert_eq!(manifest["layers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_blob_renders_the_error_envelope() {
    let (app, _root) = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!(
                    "/v2/lib/x/blobs/sha256:{}",
                    "0".repeat(64)
                ))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json; charset=utf-8"
    );
    assert_eq!(
        response.headers()["docker-distribution-api-version"],
        "registry/2.0"
    );
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "BLOB_UNKNOWN");
    assert_eq!(body["message"], "blob unknown to registry");
}

#[tokio::test]
async fn malformed_digest_is_rejected_up_front() {
    let (app, _root) = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/blobs/not-a-digest")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "DIGEST_INVALID");
}

#[tokio::test]
async fn tag_listing_is_sorted_and_paginated() {
    let (app, _root) = test_registry();
    for tag in ["v2", "v1", "v3"] {
        push_manifest(&app, "lib/x", tag, SAMPLE_MANIFEST).await;
    }

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["name"], "lib/x");
    assert_eq!(
        body["tags"],
        serde_json::json!(["v1", "v2", "v3"])
    );

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/tags/list?n=2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.headers().contains_key(header::LINK));
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["tags"], serde_json::json!(["v1", "v2"]));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/tags/list?n=2&last=v2")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["tags"], serde_json::json!(["v3"]));
}

#[tokio::test]
async fn tag_listing_of_an_unknown_repository() {
    let (app, _root) = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/tags/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "NAME_UNKNOWN");
}

#[tokio::test]
async fn chunked_upload_enforces_contiguous_ranges() {
    let (app, _root) = test_registry();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/lib/x/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header(header::CONTENT_RANGE, "0-4/10")
                .header(header::CONTENT_LENGTH, 5)
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::RANGE], "0-5");

    // a gap is refused and must not disturb the session file
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header(header::CONTENT_RANGE, "bytes 7-9/10")
                .header(header::CONTENT_LENGTH, 3)
                .body(Body::from("rld"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "BLOB_UPLOAD_UNKNOWN");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header(header::CONTENT_RANGE, "5-9/10")
                .header(header::CONTENT_LENGTH, 5)
                .body(Body::from("world"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(response.headers()[header::RANGE], "0-10");

    let digest = sha256_digest(b"helloworld");
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("{location}?digest={digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/v2/lib/x/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(&read_body(response).await[..], b"helloworld");
}

#[tokio::test]
async fn mismatched_content_length_is_size_invalid() {
    let (app, _root) = test_registry();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/lib/x/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();

    let response = app
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .header(header::CONTENT_RANGE, "0-9/20")
                .header(header::CONTENT_LENGTH, 5)
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "SIZE_INVALID");
}

#[tokio::test]
async fn deleting_a_tag_leaves_other_tags_reachable() {
    let (app, _root) = test_registry();
    let digest = push_manifest(&app, "lib/x", "v1", SAMPLE_MANIFEST).await;
    push_manifest(&app, "lib/x", "v2", SAMPLE_MANIFEST).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/v2/lib/x/manifests/v1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/v2/lib/x/manifests/v1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "MANIFEST_UNKNOWN");

    for reference in ["v2".to_string(), digest] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/lib/x/manifests/{reference}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "lost {reference}");
    }

    // deleting the same tag again is a client error
    let response = app
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/v2/lib/x/manifests/v1")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn deleted_blobs_become_unknown() {
    let (app, _root) = test_registry();
    let digest = push_blob(&app, "lib/x", b"to be removed").await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/v2/lib/x/blobs/{digest}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    for method in ["GET", "DELETE"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(format!("/v2/lib/x/blobs/{digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

#[tokio::test]
async fn pushing_the_same_image_twice_is_idempotent() {
    let (app, _root) = test_registry();

    for _ in 0..2 {
        let blob_digest = push_blob(&app, "lib/x", b"layer data").await;
        let manifest_digest = push_manifest(&app, "lib/x", "latest", SAMPLE_MANIFEST).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/lib/x/blobs/{blob_digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&read_body(response).await[..], b"layer data");

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/v2/lib/x/manifests/{manifest_digest}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

#[tokio::test]
async fn manifest_push_by_digest_is_unsupported() {
    let (app, _root) = test_registry();
    let digest = sha256_digest(SAMPLE_MANIFEST.as_bytes());

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/v2/lib/x/manifests/{digest}"))
                .body(Body::from(SAMPLE_MANIFEST))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "UNSUPPORTED");
}

#[tokio::test]
async fn invalid_manifest_body_is_rejected() {
    let (app, _root) = test_registry();

    let response = app
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/v2/lib/x/manifests/latest")
                .body(Body::from("not a manifest"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(body["code"], "MANIFEST_INVALID");
}

#[tokio::test]
async fn upload_status_reports_progress() {
    let (app, _root) = test_registry();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v2/lib/x/blobs/uploads/")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let location = response.headers()[header::LOCATION].to_str().unwrap().to_owned();

    app.clone()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri(&location)
                .body(Body::from("12345"))
                .unwrap(),
        )
        .await
        .unwrap();

    let response = app
        .oneshot(
            Request::builder()
                .uri(&location)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()[header::RANGE], "0-5");
}
