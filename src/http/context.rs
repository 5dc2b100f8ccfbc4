//! Identity resolution for inbound requests.

use std::net::{IpAddr, SocketAddr};

use axum::extract::ConnectInfo;
use axum::http::Request;

use crate::ratelimit::{Principal, RequestContext};

/// Build the governor context for a request.
///
/// The principal comes from request extensions (set by the upstream auth
/// layer). The client address comes from the connection, or from proxy
/// headers when `trust_proxy` is set.
pub fn request_context<B>(request: &Request<B>, trust_proxy: bool) -> RequestContext {
    let mut ctx = RequestContext::new(request.uri().path());

    if let Some(ip) = client_ip(request, trust_proxy) {
        ctx = ctx.with_remote_addr(ip);
    }
    if let Some(principal) = request.extensions().get::<Principal>() {
        ctx = ctx.with_principal(principal.clone());
    }

    ctx
}

fn client_ip<B>(request: &Request<B>, trust_proxy: bool) -> Option<IpAddr> {
    if trust_proxy {
        if let Some(ip) = forwarded_ip(request) {
            return Some(ip);
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn forwarded_ip<B>(request: &Request<B>) -> Option<IpAddr> {
    let headers = request.headers();

    // Leftmost entry is the original client.
    let from_xff = headers
        .get("X-Forwarded-For")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|ip| ip.trim().parse().ok());

    from_xff.or_else(|| {
        headers
            .get("X-Real-IP")
            .and_then(|v| v.to_str().ok())
            .and_then(|ip| ip.trim().parse().ok())
    })
}
