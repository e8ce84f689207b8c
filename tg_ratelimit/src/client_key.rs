//! Client identifier normalisation
//!
//! Buckets are keyed by host only. The port is stripped so that every
//! connection from one machine shares a budget, and the IPv6 loopback is
//! folded into the IPv4 one so that "localhost" gets a single bucket.

const IPV6_LOOPBACK: &str = "::1";
const IPV4_LOOPBACK: &str = "127.0.0.1";

/// Turn a remote address into the key used for rate limiting
///
/// Accepts `ip:port`, `[ipv6]:port` and `host:port`. Anything that does not
/// split into a host and a port is used as-is.
pub fn normalize(remote_addr: &str) -> String {
    let host = split_host(remote_addr).unwrap_or(remote_addr);

    if host == IPV6_LOOPBACK {
        IPV4_LOOPBACK.to_string()
    } else {
        host.to_string()
    }
}

/// Host part of `host:port` or `[host]:port`, `None` when the address has no port
///
/// Follows the usual host/port splitting rules: the port may be any text,
/// including empty, but an unbracketed host may not contain a colon.
fn split_host(addr: &str) -> Option<&str> {
    let colon = addr.rfind(':')?;

    let host = if let Some(rest) = addr.strip_prefix('[') {
        // Index of ']' in `addr`; it must sit right before the last colon
        let close = rest.find(']')? + 1;
        if close + 1 != colon {
            return None;
        }
        &addr[1..close]
    } else {
        let host = &addr[..colon];
        if host.contains(':') {
            return None;
        }
        host
    };

    if host.contains(['[', ']']) || addr[colon + 1..].contains(['[', ']']) {
        return None;
    }

    Some(host)
}
