//! Shared HTTP plumbing for the REST clients. Each client owns one
//! long-lived connection pool built here; a pool that cannot be built is
//! a startup failure surfaced as a transport error, never papered over.

use crate::domain::errors::TransportError;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use std::time::Duration;

/// Every external call is bounded by this, end to end.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 3;

/// Builds the retrying client a service talks through. Transient
/// failures back off exponentially up to [`MAX_RETRIES`] attempts.
pub fn build_client(service: &'static str) -> Result<ClientWithMiddleware, TransportError> {
    let inner = reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| TransportError::Request {
            service,
            reason: format!("client construction failed: {e}"),
        })?;

    let backoff = ExponentialBackoff::builder().build_with_max_retries(MAX_RETRIES);
    Ok(ClientBuilder::new(inner)
        .with(RetryTransientMiddleware::new_with_policy(backoff))
        .build())
}

/// Assembles a URL with query parameters, delegating the encoding to the
/// url parser rather than escaping by hand.
pub fn url_with_params<'a, I>(base: &str, params: I) -> Result<reqwest::Url, TransportError>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    reqwest::Url::parse_with_params(base, params).map_err(|e| TransportError::Request {
        service: "url",
        reason: format!("invalid url {base}: {e}"),
    })
}
