//! SSRF (Server-Side Request Forgery) protection for remote-URL ingestion
//!
//! Outbound fetches made on behalf of a caller are checked twice:
//! - up front, by `validate_url_for_ssrf` (scheme, allowlist, host name,
//!   resolved addresses)
//! - at connect time, by `GuardedResolver`, which refuses to hand private
//!   addresses to the HTTP connector; redirect hops are re-checked by the
//!   client's redirect policy (see `remote::guarded_client`)

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use reqwest::Url;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use stowage_core::constants::DEFAULT_URL_UPLOAD_MAX_REDIRECTS;
use thiserror::Error;
use tokio::net::lookup_host;

/// Rules applied to every server-initiated fetch.
#[derive(Debug, Clone)]
pub struct SsrfPolicy {
    /// Allow loopback/private/link-local targets (tests and trusted intranets only)
    pub allow_private_ips: bool,
    /// If set, only these domains and their subdomains may be fetched
    pub allowlist: Option<Vec<String>>,
    pub max_redirects: usize,
}

impl Default for SsrfPolicy {
    fn default() -> Self {
        Self {
            allow_private_ips: false,
            allowlist: None,
            max_redirects: DEFAULT_URL_UPLOAD_MAX_REDIRECTS,
        }
    }
}

/// A fetch target rejected by the policy.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct SsrfViolation(pub String);

/// Validate URL to prevent SSRF attacks
///
/// 1. Checks URL scheme (must be http/https)
/// 2. Checks the allowlist if configured
/// 3. Rejects literal private/internal IP addresses and internal hostnames
/// 4. Resolves the hostname and validates every resolved IP (prevents DNS rebinding)
pub async fn validate_url_for_ssrf(url: &str, policy: &SsrfPolicy) -> Result<(), SsrfViolation> {
    let parsed_url =
        Url::parse(url).map_err(|e| SsrfViolation(format!("Invalid URL format: {}", e)))?;

    check_url(&parsed_url, policy)?;

    let host = host_of(&parsed_url)?;
    if host.parse::<IpAddr>().is_ok() || policy.allow_private_ips {
        return Ok(());
    }

    let port = parsed_url.port_or_known_default().unwrap_or(80);
    let resolved: Vec<IpAddr> = match lookup_host((host.as_str(), port)).await {
        Ok(addrs) => addrs.map(|socket_addr| socket_addr.ip()).collect(),
        Err(e) => {
            tracing::warn!(host = %host, error = %e, "DNS resolution failed for SSRF validation");
            return Err(SsrfViolation(format!(
                "Hostname could not be resolved (SSRF check): {}",
                e
            )));
        }
    };

    if let Some(ip) = resolved.iter().find(|ip| is_private_ip(ip)) {
        return Err(SsrfViolation(format!(
            "Hostname resolves to private/internal IP address: {}",
            ip
        )));
    }

    Ok(())
}

/// Synchronous checks that need no DNS: scheme, allowlist, literal IPs and
/// internal host names. Used for the initial URL and for each redirect hop.
pub fn check_url(url: &Url, policy: &SsrfPolicy) -> Result<(), SsrfViolation> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(SsrfViolation(
            "URL must start with http:// or https://".to_string(),
        ));
    }

    let host = host_of(url)?;

    if let Some(allowed_domains) = &policy.allowlist {
        let is_allowed = allowed_domains.iter().any(|allowed| {
            let allowed_lower = allowed.to_lowercase();
            host == allowed_lower || host.ends_with(&format!(".{}", allowed_lower))
        });

        if !is_allowed {
            return Err(SsrfViolation(format!(
                "URL hostname '{}' is not in the allowed list",
                host
            )));
        }
    }

    if policy.allow_private_ips {
        return Ok(());
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_ip(&ip) {
            return Err(SsrfViolation(
                "Private/internal IP addresses are not allowed".to_string(),
            ));
        }
        return Ok(());
    }

    if host == "localhost"
        || host.ends_with(".localhost")
        || host.ends_with(".local")
        || host.ends_with(".internal")
        || host.ends_with(".corp")
    {
        return Err(SsrfViolation(
            "Localhost and internal hostnames are not allowed".to_string(),
        ));
    }

    Ok(())
}

/// Lowercased host without IPv6 brackets.
fn host_of(url: &Url) -> Result<String, SsrfViolation> {
    let host = url
        .host_str()
        .ok_or_else(|| SsrfViolation("URL must have a host".to_string()))?;
    Ok(host
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_lowercase())
}

/// Check if an IP address is private/internal
///
/// Returns true for:
/// - IPv4 private ranges: 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
/// - IPv4 shared address space: 100.64.0.0/10
/// - IPv4 localhost: 127.0.0.0/8
/// - IPv4 link-local (incl. cloud metadata): 169.254.0.0/16
/// - IPv4 multicast and reserved: 224.0.0.0/3
/// - IPv4 "this network": 0.0.0.0/8
/// - IPv6 loopback, unspecified, multicast, link-local (fe80::/10), unique local (fc00::/7)
/// - IPv4-mapped IPv6 addresses of any of the above
pub fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(ipv4) => is_private_ipv4(ipv4),
        IpAddr::V6(ipv6) => {
            // IPv4-mapped addresses (::ffff:x.x.x.x) would otherwise bypass the V4 checks
            if let Some(ipv4) = ipv6.to_ipv4_mapped() {
                return is_private_ipv4(&ipv4);
            }
            ipv6.is_loopback()
                || ipv6.is_unspecified()
                || ipv6.is_multicast()
                || is_ipv6_link_local(ipv6)
                || is_ipv6_unique_local(ipv6)
        }
    }
}

fn is_private_ipv4(ip: &Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 10
        || (octets[0] == 172 && (16..=31).contains(&octets[1]))
        || (octets[0] == 192 && octets[1] == 168)
        || (octets[0] == 100 && (64..=127).contains(&octets[1]))
        || octets[0] == 127
        || (octets[0] == 169 && octets[1] == 254)
        || octets[0] >= 224
        || octets[0] == 0
}

fn is_ipv6_link_local(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    segments[0] & 0xffc0 == 0xfe80
}

fn is_ipv6_unique_local(ip: &Ipv6Addr) -> bool {
    let segments = ip.segments();
    segments[0] & 0xfe00 == 0xfc00
}

/// DNS resolver for the outbound HTTP client that never returns a
/// disallowed address, so a connection (initial or after a redirect) can
/// only be opened to addresses that passed the check.
#[derive(Debug, Clone)]
pub struct GuardedResolver {
    allow_private_ips: bool,
}

impl GuardedResolver {
    pub fn new(allow_private_ips: bool) -> Self {
        Self { allow_private_ips }
    }
}

impl Resolve for GuardedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let allow_private_ips = self.allow_private_ips;
        let host = name.as_str().to_string();

        Box::pin(async move {
            resolve_guarded(host, allow_private_ips)
                .await
                .map(|addrs| Box::new(addrs.into_iter()) as Addrs)
        })
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn resolve_guarded(host: String, allow_private_ips: bool) -> Result<Vec<SocketAddr>, BoxError> {
    let addrs: Vec<SocketAddr> = lookup_host((host.as_str(), 0)).await?.collect();

    if addrs.is_empty() {
        return Err(SsrfViolation(format!("Hostname '{}' did not resolve", host)).into());
    }

    if !allow_private_ips {
        if let Some(addr) = addrs.iter().find(|addr| is_private_ip(&addr.ip())) {
            tracing::warn!(
                host = %host,
                ip = %addr.ip(),
                "Refusing connection to private/internal address"
            );
            return Err(SsrfViolation(format!(
                "Hostname '{}' resolves to private/internal IP address: {}",
                host,
                addr.ip()
            ))
            .into());
        }
    }

    Ok(addrs)
}
