//! HTTP client with rate limiting, cookies and proxy support.
//!
//! This module provides a wrapper around `reqwest::Client` that adds:
//! * Request rate limiting so the upstream does not block us
//! * A session cookie jar, kept for the lifetime of the client
//! * Consistent timeouts, `User-Agent` and proxy settings
//!
//! It also defines the [`Transport`] seam through which the operation
//! client and the downloader perform their GET requests.
//!
//! # Example
//!
//! ```rust
//! use zhangmen::{config::Config, http::{Client, Transport}};
//!
//! let client = Client::new(&Config::default())?;
//! let response = client.get(url).await?;
//! if response.status.is_success() {
//!     println!("{} bytes", response.body.len());
//! }
//! ```

use std::{future::Future, num::NonZeroU32, sync::Arc, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{Method, StatusCode, Url};
use reqwest_cookie_store::CookieStoreMutex;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Outcome of a GET request that reached the server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: StatusCode,

    /// `Content-Length` as declared by the server, if any.
    pub content_length: Option<u64>,

    pub body: Vec<u8>,
}

impl Response {
    /// Whether fewer bytes arrived than the server declared.
    #[must_use]
    pub fn is_truncated(&self) -> bool {
        self.content_length
            .is_some_and(|declared| (self.body.len() as u64) < declared)
    }
}

/// Performs GET requests.
///
/// Errors are reserved for requests that did not produce a complete
/// response: connection failures, timeouts and bodies cut short. A response
/// with an unsuccessful status is still `Ok`.
pub trait Transport {
    fn get(&self, url: Url) -> impl Future<Output = Result<Response>> + Send;
}

/// HTTP client with built-in rate limiting and cookie support.
pub struct Client {
    /// Direct access to underlying client without rate limiting.
    pub unlimited: reqwest::Client,

    /// Rate limiter shared by all requests of this client.
    rate_limiter: DefaultDirectRateLimiter,

    /// Session cookies set by the service.
    pub cookie_jar: Arc<CookieStoreMutex>,
}

impl Client {
    /// Duration to keep idle connections alive.
    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Creates a new client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// * The rate limit is zero
    /// * The proxy address is rejected
    /// * HTTP client creation fails
    pub fn new(config: &Config) -> Result<Self> {
        let cookie_jar = Arc::new(CookieStoreMutex::default());

        let mut http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .read_timeout(config.read_timeout)
            .user_agent(&config.user_agent)
            .cookie_provider(Arc::clone(&cookie_jar));

        // Only the configured proxy is used, never one from the environment
        // that `reqwest` would otherwise pick up on its own.
        http_client = match config.proxy {
            Some(ref proxy) => http_client.proxy(reqwest::Proxy::http(proxy.url())?),
            None => http_client.no_proxy(),
        };

        let calls = NonZeroU32::new(config.rate_limit_calls)
            .ok_or_else(|| Error::invalid_argument("rate limit calls must not be zero"))?;
        let replenish_interval = config.rate_limit_interval / calls.get();
        let quota = Quota::with_period(replenish_interval)
            .ok_or_else(|| Error::invalid_argument("rate limit interval must not be zero"))?
            .allow_burst(calls);

        Ok(Self {
            unlimited: http_client.build()?,
            rate_limiter: governor::RateLimiter::direct(quota),
            cookie_jar,
        })
    }

    /// Executes a request with rate limiting.
    ///
    /// # Errors
    ///
    /// Returns error if the request cannot be sent or no response arrives.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        // Sequential use only, so no jitter is needed.
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}

impl Transport for Client {
    fn get(&self, url: Url) -> impl Future<Output = Result<Response>> + Send {
        async move {
            trace!("GET {url}");
            let response = self.execute(reqwest::Request::new(Method::GET, url)).await?;

            let status = response.status();
            let content_length = response.content_length();
            let body = response.bytes().await?.to_vec();

            Ok(Response {
                status,
                content_length,
                body,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_when_body_shorter_than_declared() {
        let response = Response {
            status: StatusCode::OK,
            content_length: Some(10),
            body: vec![0; 4],
        };
        assert!(response.is_truncated());

        let undeclared = Response {
            content_length: None,
            ..response
        };
        assert!(!undeclared.is_truncated());
    }

    #[test]
    fn zero_rate_limit_is_rejected() {
        let config = Config {
            rate_limit_calls: 0,
            ..Config::default()
        };
        assert!(Client::new(&config).is_err());
    }
}
