//! Ready-made gateway router that redirects clients to pool members.

use tracing::{debug, warn};
use url::Url;

use crate::http::request::Request;
use crate::http::response::{Response, StatusCode};
use crate::server::router::{Handler, handler};

/// Answers every request with a `307` pointing at the next member in
/// round-robin order. Outside a pool gateway it answers `503`.
pub fn redirect() -> Handler {
    handler(|ctx, request, response| {
        let Some(port) = ctx.next_port() else {
            warn!(port = ctx.port(), "Redirect router used outside a server pool");
            response.end(StatusCode::ServiceUnavailable);
            return;
        };

        match member_location(request, ctx.host(), port) {
            Ok(location) => {
                debug!(gateway = ctx.port(), member = port, %location, "Redirecting to member");
                *response = Response::redirect(location.as_str());
            }
            Err(e) => {
                warn!(gateway = ctx.port(), error = %e, "Cannot build member location");
                response.end(StatusCode::BadRequest);
            }
        }
    })
}

/// Builds `http://<host>:<port><resource>`.
///
/// The host is taken from the request's `Host` field when it parses,
/// otherwise `fallback_host` is used.
pub fn member_location(request: &Request, fallback_host: &str, port: u16) -> Result<Url, url::ParseError> {
    let host = request
        .field("Host")
        .and_then(|h| Url::parse(&format!("http://{}", h)).ok())
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| fallback_host.to_string());

    let mut url = Url::parse(&format!("http://{}/", host))?;
    url.set_port(Some(port))
        .map_err(|_| url::ParseError::InvalidPort)?;
    url.join(request.resource().unwrap_or("/"))
}
