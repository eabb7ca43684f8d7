use crate::error::ApiResult;
use crate::state::AppState;
use crate::stats::AccessContext;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// GET /{short_uri} - Redirect to the origin URL.
///
/// The domain half of the full short URL is the request's `Host` header,
/// falling back to `server.default_domain`.
pub async fn redirect(
    State(state): State<AppState>,
    Path(short_uri): Path<String>,
    req: Request,
) -> ApiResult<Response> {
    let (parts, _) = req.into_parts();
    let headers = &parts.headers;
    let domain = request_domain(headers).unwrap_or(&state.config.server.default_domain);
    let access = AccessContext {
        remote_addr: parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string()),
        user_agent: header_text(headers, header::USER_AGENT),
        referer: header_text(headers, header::REFERER),
    };

    let resolution = state.resolver.resolve_in(domain, &short_uri, access).await?;

    let location = HeaderValue::from_str(&resolution.origin_url).map_err(|_| {
        crate::error::ApiError::Internal(format!(
            "stored origin for {} is not a valid header value",
            resolution.full_short_url
        ))
    })?;
    Ok((StatusCode::FOUND, [(header::LOCATION, location)]).into_response())
}

fn request_domain(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|h| !h.is_empty())
}

fn header_text(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
