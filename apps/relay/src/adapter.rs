//! HTTP to tunnel adapter
//!
//! Turns inbound public HTTP requests into request frames, parks on the
//! correlator, and maps the tunnel's answer (or failure) back onto HTTP.
//! Two entry points reach this module: the host-based middleware, which
//! intercepts any request whose Host header names a registered subdomain,
//! and the path-based `/t/{subdomain}/...` routes.

use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use localhosted_common::constants::{MAX_FRAME_SIZE_BYTES, REQUEST_TIMEOUT_SECS};
use localhosted_common::protocol::{TunnelRequest, TunnelResponse};
use localhosted_common::{TunnelError, decode_body, encode_body, headers_to_map, subdomain};

use crate::AppState;

/// Response headers scoped to a single connection, never proxied
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Host-based entry point, layered ahead of the fixed routes.
///
/// A request whose Host header is one label under the root domain is tunnel
/// traffic and short-circuits here; everything else falls through to the
/// router (landing page, health, path-based routes).
pub async fn host_router(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let host = req
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    match subdomain::extract(host, &state.config.domain) {
        Some(label) => {
            let label = label.to_string();
            let path = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/".to_string());
            debug!(subdomain = %label, %path, "Host-based tunnel request");
            forward_http(&state, &label, path, req).await
        }
        None => next.run(req).await,
    }
}

/// `ANY /t/{subdomain}`: path-based entry with an empty rest
pub async fn path_tunnel_root(
    State(state): State<AppState>,
    Path(subdomain): Path<String>,
    req: Request,
) -> Response {
    let path = match req.uri().query() {
        Some(query) => format!("/?{}", query),
        None => "/".to_string(),
    };
    forward_http(&state, &subdomain, path, req).await
}

/// `ANY /t/{subdomain}/{rest...}`: the prefix is stripped before forwarding
pub async fn path_tunnel(
    State(state): State<AppState>,
    Path((subdomain, rest)): Path<(String, String)>,
    req: Request,
) -> Response {
    let path = match req.uri().query() {
        Some(query) => format!("/{}?{}", rest, query),
        None => format!("/{}", rest),
    };
    forward_http(&state, &subdomain, path, req).await
}

/// `ANY /t` and `/t/`: no subdomain segment to route on
pub async fn missing_subdomain() -> Response {
    error_response(&TunnelError::SubdomainMissing, None)
}

/// Common flow once a subdomain and forwarded path are chosen: frame the
/// request, run it through the correlator, write the tunnel's answer.
async fn forward_http(state: &AppState, subdomain: &str, path: String, req: Request) -> Response {
    let method = req.method().to_string();
    let headers = headers_to_map(req.headers());

    let body = match axum::body::to_bytes(req.into_body(), MAX_FRAME_SIZE_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(subdomain, error = %e, "Failed to read request body");
            return error_response(
                &TunnelError::Http(format!("Failed to read request body: {}", e)),
                Some(subdomain),
            );
        }
    };

    let request = TunnelRequest {
        id: Uuid::new_v4(),
        method,
        path,
        headers,
        body: encode_body(&body),
    };

    match state
        .registry
        .forward(subdomain, request, Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .await
    {
        Ok(response) => tunnel_response(subdomain, response),
        Err(e) => error_response(&e, Some(subdomain)),
    }
}

/// Write a tunnel response back as HTTP: status, headers minus the
/// hop-by-hop set, the two tunnel headers, and the decoded body.
fn tunnel_response(subdomain: &str, response: TunnelResponse) -> Response {
    let status = match StatusCode::from_u16(response.status_code) {
        Ok(status) => status,
        Err(_) => {
            warn!(subdomain, status_code = response.status_code, "Agent sent an invalid status code");
            return error_response(
                &TunnelError::InvalidMessage(format!(
                    "Invalid status code from agent: {}",
                    response.status_code
                )),
                Some(subdomain),
            );
        }
    };

    let body = match decode_body(response.body.as_deref()) {
        Ok(bytes) => bytes,
        Err(e) => return error_response(&TunnelError::Base64(e), Some(subdomain)),
    };

    let mut http_response = Response::new(Body::from(body));
    *http_response.status_mut() = status;

    let headers = http_response.headers_mut();
    for (name, value) in &response.headers {
        if is_hop_by_hop(name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }
    headers.insert("x-powered-by", HeaderValue::from_static("LocalHosted"));
    if let Ok(value) = HeaderValue::from_str(subdomain) {
        headers.insert("x-tunnel-subdomain", value);
    }

    http_response
}

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Map a tunnel failure onto the public JSON error surface
fn error_response(err: &TunnelError, subdomain: Option<&str>) -> Response {
    let status =
        StatusCode::from_u16(err.public_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let title = match err {
        TunnelError::SubdomainMissing => "Bad Request",
        TunnelError::TunnelNotFound(_) => "Tunnel Not Found",
        TunnelError::RequestTimeout(_) => "Gateway Timeout",
        _ => "Bad Gateway",
    };

    let mut body = json!({
        "error": title,
        "message": err.to_string(),
    });
    if let (Some(sub), Some(map)) = (subdomain, body.as_object_mut()) {
        map.insert("subdomain".to_string(), json!(sub));
    }

    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use localhosted_common::encode_body;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_hop_by_hop_matching_is_case_insensitive() {
        assert!(is_hop_by_hop("connection"));
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("TRANSFER-ENCODING"));
        assert!(is_hop_by_hop("Keep-Alive"));
        assert!(!is_hop_by_hop("content-type"));
        assert!(!is_hop_by_hop("x-custom"));
    }

    #[tokio::test]
    async fn test_tunnel_response_copies_headers_and_body() {
        let mut frame = TunnelResponse::new(Uuid::new_v4(), 200);
        frame
            .headers
            .insert("Content-Type".to_string(), "text/plain".to_string());
        frame
            .headers
            .insert("Transfer-Encoding".to_string(), "chunked".to_string());
        frame
            .headers
            .insert("Connection".to_string(), "keep-alive".to_string());
        frame.body = encode_body(b"OK");

        let response = tunnel_response("demo", frame);
        assert_eq!(response.status(), StatusCode::OK);

        let headers = response.headers();
        assert_eq!(headers.get("content-type").unwrap(), "text/plain");
        assert!(headers.get("transfer-encoding").is_none());
        assert!(headers.get("connection").is_none());
        assert_eq!(headers.get("x-powered-by").unwrap(), "LocalHosted");
        assert_eq!(headers.get("x-tunnel-subdomain").unwrap(), "demo");

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_tunnel_response_empty_body() {
        let frame = TunnelResponse::new(Uuid::new_v4(), 204);
        let response = tunnel_response("demo", frame);
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_tunnel_response_invalid_status_code() {
        let frame = TunnelResponse::new(Uuid::new_v4(), 42);
        let response = tunnel_response("demo", frame);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_tunnel_response_invalid_base64_body() {
        let mut frame = TunnelResponse::new(Uuid::new_v4(), 200);
        frame.body = Some("not base64!!!".to_string());
        let response = tunnel_response("demo", frame);
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_error_response_not_found() {
        let err = TunnelError::TunnelNotFound("demo".to_string());
        let response = error_response(&err, Some("demo"));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Tunnel Not Found");
        assert_eq!(body["subdomain"], "demo");
        assert!(body["message"].as_str().unwrap().contains("demo"));
    }

    #[tokio::test]
    async fn test_error_response_timeout() {
        let err = TunnelError::RequestTimeout("demo".to_string());
        let response = error_response(&err, Some("demo"));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Gateway Timeout");
        assert_eq!(body["subdomain"], "demo");
    }

    #[tokio::test]
    async fn test_error_response_disconnected() {
        let err = TunnelError::TunnelDisconnected("demo".to_string());
        let response = error_response(&err, Some("demo"));
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Bad Gateway");
    }

    #[tokio::test]
    async fn test_missing_subdomain_response() {
        let response = missing_subdomain().await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["error"], "Bad Request");
        assert!(body.get("subdomain").is_none());
    }
}
