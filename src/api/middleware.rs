use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;

/// Stamps the headers every registry response must carry, error
/// envelopes included.
pub async fn distribution_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "Docker-Distribution-Api-Version",
        HeaderValue::from_static("registry/2.0"),
    );
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));
    response
}
