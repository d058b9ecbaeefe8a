//! Shared HTTP plumbing for provider adapters.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;

use super::retry::NonRetryable;

pub(crate) fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Longest response body quoted in an error.
const BODY_SNIPPET: usize = 300;

pub(crate) fn snippet(body: &str) -> &str {
    match body.char_indices().nth(BODY_SNIPPET) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Error for a non-success status. Client errors other than 429 are not retried.
pub(crate) fn status_error(service: &str, status: StatusCode, body: &str) -> anyhow::Error {
    let message = format!("{} returned HTTP {}: {}", service, status, snippet(body));
    if status.is_client_error() && status != StatusCode::TOO_MANY_REQUESTS {
        NonRetryable(message).into()
    } else {
        anyhow::anyhow!(message)
    }
}

/// Mark `err` as not worth retrying, keeping its full context chain in the message.
pub(crate) fn permanent(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<NonRetryable>().is_some() {
        return err;
    }
    NonRetryable(format!("{:#}", err)).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_are_permanent() {
        let err = status_error("tts", StatusCode::UNAUTHORIZED, "bad key");
        assert!(err.downcast_ref::<NonRetryable>().is_some());
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn test_rate_limit_and_server_errors_retry() {
        let err = status_error("tts", StatusCode::TOO_MANY_REQUESTS, "");
        assert!(err.downcast_ref::<NonRetryable>().is_none());
        let err = status_error("tts", StatusCode::BAD_GATEWAY, "");
        assert!(err.downcast_ref::<NonRetryable>().is_none());
    }

    #[test]
    fn test_permanent_keeps_context() {
        let err = permanent(anyhow::anyhow!("timed out").context("request failed"));
        let inner = err.downcast_ref::<NonRetryable>().unwrap();
        assert_eq!(inner.0, "request failed: timed out");

        let already = permanent(status_error("tts", StatusCode::FORBIDDEN, "no"));
        assert!(already.to_string().contains("403"));
    }

    #[test]
    fn test_snippet_truncates_long_bodies() {
        let long = "x".repeat(1000);
        assert_eq!(snippet(&long).len(), BODY_SNIPPET);
        assert_eq!(snippet("short"), "short");
    }
}
