//! Caller address lookup, used by clients to derive a voter identity.

use std::net::{IpAddr, SocketAddr};

use axum::{extract::ConnectInfo, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IpResponse {
    pub ip: String,
}

/// GET /api/ip - Returns `{"ip": "..."}` in the same shape as public lookup services.
///
/// Priority: X-Forwarded-For (first entry), X-Real-IP, socket address.
pub async fn lookup_ip(
    headers: HeaderMap,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Json<IpResponse> {
    let ip = client_ip(&headers, Some(peer))
        .map(|ip| ip.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    Json(IpResponse { ip })
}

pub(crate) fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for") {
        forwarded
            .to_str()
            .ok()
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
    } else if let Some(real_ip) = headers.get("x-real-ip") {
        real_ip.to_str().ok().and_then(|s| s.trim().parse::<IpAddr>().ok())
    } else {
        peer.map(|addr| addr.ip())
    }
}
