use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use hmac::{Hmac, Mac};
use log::{debug, trace};
use regex::Regex;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // The left-most entry is the original client
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(ip_from_forwarded);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.peer_addr().map(|a| a.ip());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr
    })
}

fn ip_from_forwarded(header: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"for="?\[?(?P<ip>[0-9A-Fa-f:.]+)"#).ok()?;
    re.captures(header).and_then(|caps| caps.name("ip")).and_then(|m| IpAddr::from_str(m.as_str()).ok())
}

/// Base64-encoded HMAC-SHA256 of `data`, as sent by the bank-transfer provider.
pub fn calculate_hmac(secret: &str, data: &[u8]) -> Option<String> {
    let mac = keyed_mac(secret)?.chain_update(data);
    Some(base64::encode(mac.finalize().into_bytes()))
}

/// Hex-encoded Stripe `v1` signature: HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn calculate_stripe_signature(secret: &str, timestamp: i64, body: &[u8]) -> Option<String> {
    let mac = stripe_mac(secret, timestamp, body)?;
    Some(hex::encode(mac.finalize().into_bytes()))
}

pub(crate) fn stripe_mac(secret: &str, timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
    let mac = keyed_mac(secret)?.chain_update(timestamp.to_string().as_bytes()).chain_update(b".").chain_update(body);
    Some(mac)
}

pub(crate) fn keyed_mac(secret: &str) -> Option<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()
}
