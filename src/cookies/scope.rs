//! Cookie `Domain` scoping for subdomain-shared sessions.
//!
//! Follows the RFC 2109 style one-level heuristic: the session cookie is
//! widened by exactly one label so that sibling subdomains share it. There
//! is no public suffix list, so `example.co.uk` widens to `co.uk`, which
//! browsers will reject. Disable subdomain persistence for such hosts.

/// Whether a cookie for `host` may carry a wildcard `Domain` attribute.
///
/// Rejects the loopback and any-interface literals, bare hostnames without
/// a dot, and hosts with three or more dots whose last label is numeric
/// (IPv4-looking addresses).
pub fn is_eligible_domain(host: &str) -> bool {
    if host == "0.0.0.0" || host == "127.0.0.1" {
        return false;
    }

    let dots = host.matches('.').count();
    if dots == 0 {
        return false;
    }

    if dots >= 3 {
        if let Some((_, last)) = host.rsplit_once('.') {
            if !last.is_empty() && last.parse::<i64>().is_ok() {
                return false;
            }
        }
    }

    true
}

/// Strip one leading label so the domain covers one level of subdomains.
///
/// `a.b.example.com` becomes `b.example.com` and `b.example.com` becomes
/// `example.com`. A host with a single dot is already the widest domain
/// allowed and is returned unchanged.
pub fn widen_to_parent_domain(host: &str) -> &str {
    if host.matches('.').count() < 2 {
        return host;
    }
    match host.split_once('.') {
        Some((_, parent)) if !parent.is_empty() => parent,
        _ => host,
    }
}

/// Drop a trailing `:port` from a `Host` header value.
pub fn host_without_port(host: &str) -> &str {
    match host.find(':') {
        Some(idx) if idx > 0 => &host[..idx],
        _ => host,
    }
}

/// The `Domain` attribute for a session cookie issued to `host`, if the
/// host may share its cookie with subdomains.
pub fn cookie_domain(host: &str) -> Option<String> {
    let host = host_without_port(host);
    if !is_eligible_domain(host) {
        return None;
    }
    Some(format!(".{}", widen_to_parent_domain(host)))
}
