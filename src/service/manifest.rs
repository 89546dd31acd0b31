use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, Response, StatusCode};
use serde_json::json;

use crate::error::{ErrorCode, RegistryError, Result};
use crate::manifest::{TagList, MEDIA_TYPE_MANIFEST};
use crate::utils::state::AppState;
use crate::utils::validation::{is_valid_digest, is_valid_name, is_valid_reference, is_valid_tag};

fn require_valid_name(name: &str) -> Result<()> {
    if is_valid_name(name) {
        return Ok(());
    }
    Err(RegistryError::from_code(ErrorCode::NameInvalid).with_detail(json!({ "name": name })))
}

/// GET /v2/<name>/manifests/<reference>
///
/// `reference` is a tag or a digest; a tag resolves through its tag
/// file. The response carries the resolved digest so clients can pin
/// content fetched by tag.
pub(crate) async fn get_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    if !is_valid_reference(&reference) {
        return Err(RegistryError::from_code(ErrorCode::ManifestInvalid)
            .with_detail(json!({ "reference": reference })));
    }

    let (manifest, digest) = state
        .storage
        .find_manifest_by_image(&name, &reference)
        .await?;
    let body = serde_json::to_vec(&manifest)
        .map_err(|e| RegistryError::wrap(e, ErrorCode::Unknown))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MEDIA_TYPE_MANIFEST)
        .header(header::CONTENT_LENGTH, body.len())
        .header("Docker-Content-Digest", digest)
        .body(Body::from(body))
        .unwrap())
}

/// HEAD /v2/<name>/manifests/<reference>
pub(crate) async fn head_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    if !is_valid_reference(&reference) {
        return Err(RegistryError::from_code(ErrorCode::ManifestInvalid)
            .with_detail(json!({ "reference": reference })));
    }

    let (manifest, digest) = state
        .storage
        .find_manifest_by_image(&name, &reference)
        .await?;
    let body = serde_json::to_vec(&manifest)
        .map_err(|e| RegistryError::wrap(e, ErrorCode::Unknown))?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MEDIA_TYPE_MANIFEST)
        .header(header::CONTENT_LENGTH, body.len())
        .header("Docker-Content-Digest", digest)
        .body(Body::empty())
        .unwrap())
}

/// PUT /v2/<name>/manifests/<tag>
///
/// Manifests are only pushed by tag; a digest reference is refused.
pub(crate) async fn put_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
    request: Request,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    if is_valid_digest(&reference) {
        return Err(RegistryError::from_code(ErrorCode::Unsupported)
            .with_detail(json!({ "reference": reference })));
    }
    if !is_valid_tag(&reference) {
        return Err(
            RegistryError::from_code(ErrorCode::TagInvalid).with_detail(json!({ "tag": reference }))
        );
    }

    let (_, digest) = state
        .storage
        .create_manifest(request.into_body().into_data_stream(), &name, &reference)
        .await?;

    Ok(Response::builder()
        .status(StatusCode::CREATED)
        .header(header::LOCATION, format!("/v2/{name}/manifests/{reference}"))
        .header("Docker-Content-Digest", digest)
        .body(Body::empty())
        .unwrap())
}

/// DELETE /v2/<name>/manifests/<tag>
pub(crate) async fn delete_manifest_handler(
    State(state): State<Arc<AppState>>,
    Path((name, reference)): Path<(String, String)>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;
    if !is_valid_tag(&reference) {
        return Err(
            RegistryError::from_code(ErrorCode::TagInvalid).with_detail(json!({ "tag": reference }))
        );
    }

    state
        .storage
        .delete_manifest_by_image(&name, &reference)
        .await?;
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .body(Body::empty())
        .unwrap())
}

/// GET /v2/<name>/tags/list[?n=<int>&last=<tag>]
pub(crate) async fn get_tag_list_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response<Body>> {
    require_valid_name(&name)?;

    let mut tags = state.storage.list_tags(&name).await?;
    tags.sort();

    if let Some(last) = params.get("last") {
        match tags.iter().position(|tag| tag == last) {
            Some(index) => tags = tags.split_off(index + 1),
            None => tags.clear(),
        }
    }

    let mut next_link = None;
    if let Some(n) = params.get("n") {
        let n: usize = n.parse().map_err(|_| {
            RegistryError::from_code(ErrorCode::Unsupported)
                .with_message("n must be a non-negative integer")
        })?;
        if n > 0 && tags.len() > n {
            let last_on_page = tags[n - 1].clone();
            tags.truncate(n);
            next_link = Some(format!(
                "</v2/{name}/tags/list?n={n}&last={last_on_page}>; rel=\"next\""
            ));
        }
    }

    let body = serde_json::to_vec(&TagList { name, tags })
        .map_err(|e| RegistryError::wrap(e, ErrorCode::Unknown))?;

    let mut response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(link) = next_link {
        response = response.header(header::LINK, link);
    }
    Ok(response.body(Body::from(body)).unwrap())
}
