//! Outbound HTTP for remote-URL ingestion.
//!
//! Every request goes through a client built by `guarded_client`, whose DNS
//! resolver and redirect policy enforce the `SsrfPolicy` on each hop.

use crate::ssrf::{check_url, validate_url_for_ssrf, GuardedResolver, SsrfPolicy, SsrfViolation};
use crate::traits::{ByteReader, StorageError, StorageResult};
use futures::TryStreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::redirect::{Attempt, Policy};
use reqwest::Response;
use std::error::Error as StdError;
use std::sync::Arc;
use tokio_util::io::StreamReader;

/// Response metadata learned before (or while) transferring a remote body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteProbe {
    /// URL after following redirects
    pub final_url: String,
    /// `Content-Type` as sent by the remote
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// A remote body ready to be streamed into an upload.
pub struct RemoteBody {
    pub probe: RemoteProbe,
    pub reader: ByteReader,
}

/// Build the HTTP client used for all server-initiated fetches.
pub fn guarded_client(policy: &SsrfPolicy) -> StorageResult<reqwest::Client> {
    let redirect_policy = policy.clone();

    reqwest::Client::builder()
        .dns_resolver(Arc::new(GuardedResolver::new(policy.allow_private_ips)))
        .redirect(Policy::custom(move |attempt| {
            follow_redirect(attempt, &redirect_policy)
        }))
        .build()
        .map_err(|e| StorageError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn follow_redirect(attempt: Attempt<'_>, policy: &SsrfPolicy) -> reqwest::redirect::Action {
    if attempt.previous().len() > policy.max_redirects {
        return attempt.error(format!(
            "Too many redirects (limit {})",
            policy.max_redirects
        ));
    }

    match check_url(attempt.url(), policy) {
        Ok(()) => attempt.follow(),
        Err(violation) => {
            tracing::warn!(
                target_url = %attempt.url(),
                reason = %violation,
                "Blocked redirect"
            );
            attempt.error(violation)
        }
    }
}

/// `HEAD` a remote URL to learn its final location, type and size.
pub async fn probe_remote(
    client: &reqwest::Client,
    policy: &SsrfPolicy,
    url: &str,
) -> StorageResult<RemoteProbe> {
    validate_url_for_ssrf(url, policy)
        .await
        .map_err(|e| StorageError::SsrfBlocked(e.to_string()))?;

    let response = client
        .head(url)
        .send()
        .await
        .map_err(|e| classify_http_error(e, url))?
        .error_for_status()
        .map_err(|e| StorageError::Transfer(format!("Remote probe of {} failed: {}", url, e)))?;

    Ok(probe_of(&response))
}

/// `GET` a remote URL and expose its body as a reader.
pub async fn fetch_remote(
    client: &reqwest::Client,
    policy: &SsrfPolicy,
    url: &str,
) -> StorageResult<RemoteBody> {
    validate_url_for_ssrf(url, policy)
        .await
        .map_err(|e| StorageError::SsrfBlocked(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| classify_http_error(e, url))?
        .error_for_status()
        .map_err(|e| StorageError::Transfer(format!("Remote fetch of {} failed: {}", url, e)))?;

    let probe = probe_of(&response);
    let body = Box::pin(response.bytes_stream().map_err(std::io::Error::other));
    let reader: ByteReader = Box::pin(StreamReader::new(body));

    Ok(RemoteBody { probe, reader })
}

fn probe_of(response: &Response) -> RemoteProbe {
    let headers = response.headers();

    // Read the header directly: for HEAD responses the body size hint is 0.
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    RemoteProbe {
        final_url: response.url().to_string(),
        content_type: headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        content_length,
    }
}

/// Map a client error to a storage error, surfacing SSRF refusals raised by
/// the resolver or the redirect policy as `SsrfBlocked`.
pub fn classify_http_error(err: reqwest::Error, url: &str) -> StorageError {
    let mut source: Option<&(dyn StdError + 'static)> = Some(&err);
    while let Some(current) = source {
        if let Some(violation) = current.downcast_ref::<SsrfViolation>() {
            return StorageError::SsrfBlocked(violation.to_string());
        }
        source = current.source();
    }

    StorageError::Transfer(format!("Failed to fetch {}: {}", url, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    fn permissive() -> SsrfPolicy {
        SsrfPolicy {
            allow_private_ips: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn probe_reads_headers_and_follows_redirects() {
        let mut server = mockito::Server::new_async().await;
        let _redirect = server
            .mock("HEAD", "/old/report.pdf")
            .with_status(302)
            .with_header("location", "/files/report.pdf")
            .create_async()
            .await;
        let _target = server
            .mock("HEAD", "/files/report.pdf")
            .with_status(200)
            .with_header("content-type", "application/pdf; charset=binary")
            .with_header("content-length", "2048")
            .create_async()
            .await;

        let policy = permissive();
        let client = guarded_client(&policy).unwrap();
        let probe = probe_remote(&client, &policy, &format!("{}/old/report.pdf", server.url()))
            .await
            .unwrap();

        assert_eq!(probe.final_url, format!("{}/files/report.pdf", server.url()));
        assert_eq!(
            probe.content_type.as_deref(),
            Some("application/pdf; charset=binary")
        );
        assert_eq!(probe.content_length, Some(2048));
    }

    #[tokio::test]
    async fn fetch_streams_the_body() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/hello.txt")
            .with_status(200)
            .with_header("content-type", "text/plain")
            .with_body("hello world")
            .create_async()
            .await;

        let policy = permissive();
        let client = guarded_client(&policy).unwrap();
        let mut body = fetch_remote(&client, &policy, &format!("{}/hello.txt", server.url()))
            .await
            .unwrap();

        let mut content = String::new();
        body.reader.read_to_string(&mut content).await.unwrap();
        assert_eq!(content, "hello world");
        assert_eq!(body.probe.content_type.as_deref(), Some("text/plain"));
    }

    #[tokio::test]
    async fn redirect_limit_is_enforced() {
        let mut server = mockito::Server::new_async().await;
        let _loop = server
            .mock("HEAD", "/loop")
            .with_status(302)
            .with_header("location", "/loop")
            .expect_at_least(1)
            .create_async()
            .await;

        let policy = SsrfPolicy {
            allow_private_ips: true,
            max_redirects: 2,
            ..Default::default()
        };
        let client = guarded_client(&policy).unwrap();
        let err = probe_remote(&client, &policy, &format!("{}/loop", server.url()))
            .await
            .unwrap_err();

        assert!(matches!(err, StorageError::Transfer(_)));
    }

    #[tokio::test]
    async fn loopback_is_blocked_before_any_request() {
        let mut server = mockito::Server::new_async().await;
        let never = server
            .mock("GET", "/secret")
            .expect(0)
            .create_async()
            .await;

        let policy = SsrfPolicy::default();
        let client = guarded_client(&policy).unwrap();
        let result = fetch_remote(&client, &policy, &format!("{}/secret", server.url())).await;

        assert!(matches!(result, Err(StorageError::SsrfBlocked(_))));
        never.assert_async().await;
    }

    #[tokio::test]
    async fn redirect_into_private_range_is_blocked() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("HEAD", "/bounce")
            .with_status(302)
            .with_header("location", "http://169.254.169.254/latest/meta-data/")
            .create_async()
            .await;

        // The first hop is allowed by an allowlist-only policy for the test
        // server; the redirect target is checked against the strict rules.
        let entry_policy = permissive();
        let strict_hops = SsrfPolicy {
            allow_private_ips: false,
            allowlist: None,
            max_redirects: 5,
        };
        let client = reqwest::Client::builder()
            .redirect(Policy::custom(move |attempt| {
                follow_redirect(attempt, &strict_hops)
            }))
            .build()
            .unwrap();

        let err = probe_remote(&client, &entry_policy, &format!("{}/bounce", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SsrfBlocked(_)), "got {:?}", err);
    }
}
