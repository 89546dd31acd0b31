use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, HeaderMap, Method, Response, StatusCode};
use axum::routing::{any, get};
use axum::Router;

use crate::error::{ErrorCode, RegistryError, Result};
use crate::service::blob::{
    delete_blob_handler, get_blob_handler, get_upload_status_handler, head_blob_handler,
    patch_blob_handler, post_blob_handler, put_blob_handler,
};
use crate::service::manifest::{
    delete_manifest_handler, get_manifest_handler, get_tag_list_handler, head_manifest_handler,
    put_manifest_handler,
};
use crate::utils::state::AppState;

pub fn create_v2_router() -> Router<Arc<AppState>> {
    Router::new()
        // Determine support
        .route("/", get(determining_support))
        .route("/{*tail}", any(dispatch_handler))
}

/// GET /v2/ — protocol support probe.
async fn determining_support() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{}"))
        .unwrap()
}

/// Repository names contain `/`, so routes cannot bind them as single
/// path parameters. The wildcard tail is split and matched instead,
/// treating the last segments as the operation selector and whatever
/// precedes them as the name.
async fn dispatch_handler(
    State(state): State<Arc<AppState>>,
    Path(tail): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    request: Request,
) -> Result<Response<Body>> {
    let method = request.method().clone();
    let segments: Vec<&str> = tail.split('/').collect();

    match segments.as_slice() {
        // /{name}/manifests/{reference}
        [name @ .., "manifests", reference] if !name.is_empty() => {
            let name = name.join("/");
            let reference = reference.to_string();
            match method {
                Method::GET => get_manifest_handler(State(state), Path((name, reference))).await,
                Method::HEAD => head_manifest_handler(State(state), Path((name, reference))).await,
                Method::PUT => {
                    put_manifest_handler(State(state), Path((name, reference)), request).await
                }
                Method::DELETE => {
                    delete_manifest_handler(State(state), Path((name, reference))).await
                }
                _ => Err(RegistryError::from_code(ErrorCode::Unsupported)),
            }
        }
        // /{name}/blobs/{digest}
        [name @ .., "blobs", digest] if !name.is_empty() && *digest != "uploads" => {
            let name = name.join("/");
            let digest = digest.to_string();
            match method {
                Method::GET => get_blob_handler(State(state), Path((name, digest))).await,
                Method::HEAD => head_blob_handler(State(state), Path((name, digest))).await,
                Method::DELETE => delete_blob_handler(State(state), Path((name, digest))).await,
                _ => Err(RegistryError::from_code(ErrorCode::Unsupported)),
            }
        }
        // /{name}/blobs/uploads/
        [name @ .., "blobs", "uploads", session] if !name.is_empty() && session.is_empty() => {
            let name = name.join("/");
            if method == Method::POST {
                post_blob_handler(State(state), Path(name), Query(params), headers, request).await
            } else {
                Err(RegistryError::from_code(ErrorCode::Unsupported))
            }
        }
        // /{name}/blobs/uploads/{session}
        [name @ .., "blobs", "uploads", session] if !name.is_empty() => {
            let name = name.join("/");
            let session = session.to_string();
            match method {
                Method::PATCH => {
                    patch_blob_handler(State(state), Path((name, session)), headers, request).await
                }
                Method::PUT => {
                    put_blob_handler(
                        State(state),
                        Path((name, session)),
                        Query(params),
                        headers,
                        request,
                    )
                    .await
                }
                Method::GET => {
                    get_upload_status_handler(State(state), Path((name, session))).await
                }
                _ => Err(RegistryError::from_code(ErrorCode::Unsupported)),
            }
        }
        // /{name}/tags/list
        [name @ .., "tags", "list"] if !name.is_empty() => {
            let name = name.join("/");
            if method == Method::GET {
                get_tag_list_handler(State(state), Path(name), Query(params)).await
            } else {
                Err(RegistryError::from_code(ErrorCode::Unsupported))
            }
        }
        _ => Err(RegistryError::from_code(ErrorCode::Unknown)
            .with_status(StatusCode::NOT_FOUND)
            .with_message("not found")),
    }
}
