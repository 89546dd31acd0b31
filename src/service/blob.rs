use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, Response, StatusCode};
use serde_json::json;
use tokio_util::io::ReaderStream;

use crate::error::{ErrorCode, RegistryError, Result};
use crate::grammar::Digest;
use crate::manifest::MEDIA_TYPE_OCTET_STREAM;
use crate::storage::content::predict_docker_content_type;
use crate::utils::state::AppState;
use crate::utils::validation::is_valid_name;

fn require_valid_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        return Ok(());
    }
    Err(RegistryError::from_code(ErrorCode::NameInvalid).with_detail(json!({ "name": name })))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn is_octet_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == MEDIA_TYPE_OCTET_STREAM)
}

/// Parses `[bytes ]<start>-<end>[/<total>]`.
fn parse_content_range(raw: &str) -> Option<(u64, u64)> {
    let raw = raw.strip_prefix("bytes ").unwrap_or(raw);
    let range = raw.split('/').next()?;
    let (start, end) = range.split_once('-')?;
    let start = start.trim().parse().ok()?;
    let end = end.trim().parse().ok()?;
    (start <= end).then_some((start, end))
}

/// GET /v2/<name>/blobs/<digest>
pub(crate) async fn get_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    let digest: Digest = digest.parse()?;

    let (file, info) = state.storage.find_blob_by_image(&name, &digest).await?;
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(
            header::CONTENT_TYPE,
            predict_docker_content_type(&info.file_name),
        )
        .header(header::CONTENT_LENGTH, info.size)
        .header(header::ACCEPT_RANGES, "bytes")
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::from_stream(ReaderStream::new(file)))
        .unwrap())
}

/// HEAD /v2/<name>/blobs/<digest>
pub(crate) async fn head_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    let digest: Digest = digest.parse()?;

    let info = state
        .storage
        .check_blob_by_reference(&name, &digest.to_string())
        .await?;
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(
            header::CONTENT_TYPE,
            predict_docker_content_type(&info.file_name),
        )
        .header(header::CONTENT_LENGTH, info.size)
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::empty())
        .unwrap())
}

/// POST /v2/<name>/blobs/uploads/
///
/// Monolithic when the body is an octet-stream and a digest query is
/// present; otherwise opens a session.
pub(crate) async fn post_blob_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;

    match params.get("digest") {
        Some(raw) if is_octet_stream(&headers) => {
            let digest: Digest = raw.parse()?;
            state
                .storage
                .put_blob_by_reference(
                    &digest.to_string(),
                    &name,
                    request.into_body().into_data_stream(),
                )
                .await?;
            Ok(Response::builder()
                .status(StatusCode::CREATED)
                .header(header::LOCATION, format!("/v2/{name}/blobs/{digest}"))
                .header("Docker-Content-Digest", digest.to_string())
                .body(Body::empty())
                .unwrap())
        }
        _ => {
            let session = state.storage.issue_session();
            Ok(Response::builder()
                .status(StatusCode::ACCEPTED)
                .header(
                    header::LOCATION,
                    format!("/v2/{name}/blobs/uploads/{session}"),
                )
                .header("Docker-Upload-UUID", session)
                .header(header::RANGE, "0-0")
                .body(Body::empty())
                .unwrap())
        }
    }
}

/// PATCH /v2/<name>/blobs/uploads/<session>
///
/// Full replace without `Content-Range`; offset-checked append with it.
pub(crate) async fn patch_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session)): Path<(String, String)>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;

    let size = match headers
        .get(header::CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
    {
        None => {
            state
                .storage
                .put_blob_by_reference(&session, &name, request.into_body().into_data_stream())
                .await?
        }
        Some(raw) => {
            let (start, end) = parse_content_range(raw).ok_or_else(|| {
                RegistryError::from_code(ErrorCode::BlobUploadInvalid)
                    .with_message("invalid Content-Range header")
                    .with_detail(json!({ "range": raw }))
            })?;
            if let Some(length) = content_length(&headers) {
                if end - start + 1 != length {
                    return Err(RegistryError::from_code(ErrorCode::SizeInvalid)
                        .with_detail(json!({ "range": raw, "length": length })));
                }
            }
            state
                .storage
                .append_blob_by_reference(
                    &name,
                    &session,
                    request.into_body().into_data_stream(),
                    start,
                )
                .await?
        }
    };

    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header(
            header::LOCATION,
            format!("/v2/{name}/blobs/uploads/{session}"),
        )
        .header("Docker-Upload-UUID", session)
        .header(header::RANGE, format!("0-{size}"))
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::empty())
        .unwrap())
}

/// PUT /v2/<name>/blobs/uploads/<session>?digest=<digest>
///
/// An octet-stream body is appended as the final chunk before the
/// session file is renamed into its digest directory.
pub(crate) async fn put_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session)): Path<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;

    let digest: Digest = params
        .get("digest")
        .ok_or_else(|| {
            RegistryError::from_code(ErrorCode::DigestInvalid)
                .with_message("digest query parameter is required")
        })?
        .parse()?;

    if is_octet_stream(&headers) {
        let current = state
            .storage
            .check_blob_by_reference(&name, &session)
            .await
            .map(|info| info.size)
            .unwrap_or(0);
        state
            .storage
            .append_blob_by_reference(
                &name,
                &session,
                request.into_body().into_data_stream(),
                current,
            )
            .await?;
    }

    state
        .storage
        .ensure_put_blob_by_session(&session, &name, &digest)
        .await?;

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, format!("/v2/{name}/blobs/{digest}"))
        .header("Docker-Content-Digest", digest.to_string())
        .body(Body::empty())
        .unwrap())
}

/// GET /v2/<name>/blobs/uploads/<session> — upload progress probe.
pub(crate) async fn get_upload_status_handler(
    State(state): State<Arc<AppState>>,
    Path((name, session)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;

    let info = state
        .storage
        .check_blob_by_reference(&name, &session)
        .await
        .map_err(|e| {
            if e.code() == ErrorCode::BlobUnknown {
                RegistryError::from_code(ErrorCode::BlobUploadUnknown)
                    .with_detail(json!({ "session": session }))
            } else {
                e
            }
        })?;

    Ok(Response::builder()
        .status(StatusCode::NO_CONTENT)
        .header(
            header::LOCATION,
            format!("/v2/{name}/blobs/uploads/{session}"),
        )
        .header("Docker-Upload-UUID", session)
        .header(header::RANGE, format!("0-{}", info.size))
        .body(Body::empty())
        .unwrap())
}

/// DELETE /v2/<name>/blobs/<digest>
pub(crate) async fn delete_blob_handler(
    State(state): State<Arc<AppState>>,
    Path((name, digest)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    let digest: Digest = digest.parse()?;

    state.storage.delete_blob_by_image(&name, &digest).await?;
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Body::empty())
        .unwrap())
}
