//! Origin policy and client IP derivation.

use super::http::RequestHead;
use ipnet::Ipv4Net;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;

/// Decide whether a WebSocket upgrade's Origin is acceptable.
///
/// A missing Origin is accepted. Otherwise the origin must either appear in
/// the configured allow list verbatim, or resolve to a loopback / RFC-1918
/// host, which are always trusted.
pub fn origin_allowed(origin: Option<&str>, allowed: &[String]) -> bool {
    let Some(origin) = origin else {
        return true;
    };
    if allowed.iter().any(|a| a == origin) {
        return true;
    }
    origin_host(origin).is_some_and(is_private_host)
}

/// Extract the host from an origin string like `https://host:port`.
fn origin_host(origin: &str) -> Option<&str> {
    let authority = origin
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(origin);
    let authority = authority.split(['/', '?']).next()?;

    if let Some(bracketed) = authority.strip_prefix('[') {
        // IPv6 literal, e.g. [::1]:7001
        return bracketed.split(']').next();
    }
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => Some(host),
        _ => Some(authority),
    }
}

/// Loopback names and RFC-1918 IPv4 ranges.
fn is_private_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") || host == "127.0.0.1" || host == "::1" {
        return true;
    }
    let Ok(ip) = Ipv4Addr::from_str(host) else {
        return false;
    };
    private_nets().iter().any(|net| net.contains(&ip))
}

fn private_nets() -> [Ipv4Net; 3] {
    [
        Ipv4Net::new(Ipv4Addr::new(10, 0, 0, 0), 8).expect("static net"),
        Ipv4Net::new(Ipv4Addr::new(172, 16, 0, 0), 12).expect("static net"),
        Ipv4Net::new(Ipv4Addr::new(192, 168, 0, 0), 16).expect("static net"),
    ]
}

/// Derive the client IP for a connection.
///
/// Preference order: first `X-Forwarded-For` hop when syntactically a valid
/// IP, then `X-Real-IP`, then `CF-Connecting-IP`, then the peer address.
/// IPv4-mapped IPv6 (`::ffff:a.b.c.d`) is unwrapped.
pub fn client_ip(peer: IpAddr, head: &RequestHead) -> String {
    let forwarded = head
        .header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|hop| IpAddr::from_str(hop).is_ok());

    let derived = forwarded
        .or_else(|| {
            head.header("x-real-ip")
                .map(str::trim)
                .filter(|v| IpAddr::from_str(v).is_ok())
        })
        .or_else(|| {
            head.header("cf-connecting-ip")
                .map(str::trim)
                .filter(|v| IpAddr::from_str(v).is_ok())
        })
        .map(str::to_string)
        .unwrap_or_else(|| peer.to_string());

    derived
        .strip_prefix("::ffff:")
        .map(str::to_string)
        .unwrap_or(derived)
}
