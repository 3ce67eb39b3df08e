use crate::server::ApiState;
use axum::body::{Body, to_bytes};
use axum::extract::{ConnectInfo, Path, Query, Request, State};
use axum::response::Response;
use http::header::{CONTENT_LENGTH, TRANSFER_ENCODING};
use http::{HeaderName, HeaderValue, StatusCode};
use perch_core::message::ProxyResponse;
use perch_dispatch::InboundRequest;
use std::collections::HashMap;
use std::net::SocketAddr;
use tracing::debug;

/// Identity of the caller, inserted by whatever authentication layer sits
/// in front of the dispatch routes.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub String);

/// `ANY /api/v1/plugins/{plugin_id}/{*path}`
pub async fn dispatch(
    State(state): State<ApiState>,
    Path(params): Path<HashMap<String, String>>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();

    let body = match to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, limit = state.max_body_bytes, "Request body rejected");
            return into_response(ProxyResponse::failure(413, "request body too large"));
        }
    };

    let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let inbound = InboundRequest {
        plugin_id: params.get("plugin_id").cloned().unwrap_or_default(),
        method: parts.method.as_str().to_string(),
        path: params.get("path").cloned().unwrap_or_default(),
        headers,
        query,
        body,
        user_id: parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|u| u.0.clone()),
        peer: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip()),
    };

    into_response(state.dispatcher.handle(inbound).await)
}

/// Convert a plugin-layer response into an axum response.
///
/// Framing headers are left to the server; headers that are not valid HTTP
/// are dropped.
pub fn into_response(resp: ProxyResponse) -> Response {
    let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut out = Response::new(Body::from(resp.body));
    *out.status_mut() = status;

    for (name, value) in resp.headers {
        let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) else {
            debug!(header = %name, "Dropping invalid response header");
            continue;
        };
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        out.headers_mut().insert(name, value);
    }
    out
}
