//! Client configuration.
//!
//! Every field has a default that works against the live service. A TOML
//! file may override any of them:
//!
//! ```toml
//! proxy = "127.0.0.1:8080"
//! cache_ttl = 86400        # seconds
//! retry_backoff = 1000     # milliseconds
//! attempts_per_source = 3
//! empty_run = 5
//! ```

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};

use crate::{error::Result, proxy::Proxy};

#[serde_as]
#[derive(Clone, Debug, Hash, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Host serving the `/x` operation endpoint.
    pub host: String,

    /// `User-Agent` sent with every request. The service turns away
    /// clients that do not look like a desktop browser.
    pub user_agent: String,

    /// Optional HTTP proxy, fixed for the lifetime of the client.
    pub proxy: Option<Proxy>,

    /// Maximum age of a cached operation response.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub cache_ttl: Duration,

    /// Attempts per download source before moving on to the next one.
    pub attempts_per_source: u32,

    /// Pause between attempts on the same download source.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_backoff: Duration,

    /// Consecutive empty categories that end a catalog scan.
    pub empty_run: u32,

    /// Timeout for individual network reads.
    #[serde_as(as = "DurationSeconds<u64>")]
    pub read_timeout: Duration,

    /// Maximum requests per `rate_limit_interval`.
    pub rate_limit_calls: u32,

    #[serde_as(as = "DurationSeconds<u64>")]
    pub rate_limit_interval: Duration,
}

impl Config {
    pub const DEFAULT_HOST: &'static str = "box.zhangmen.baidu.com";

    /// Firefox 43 on Linux.
    pub const DEFAULT_USER_AGENT: &'static str =
        "Mozilla/5.0 (X11; Linux x86_64; rv:43.0) Gecko/20100101 Firefox/43.0";

    /// Loads the configuration from a TOML file.
    ///
    /// Fields missing from the file keep their defaults.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file cannot be read or is not valid TOML
    /// for this structure.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config = toml::from_str(&contents)?;
        trace!("config: {config:#?}");
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_owned(),
            user_agent: Self::DEFAULT_USER_AGENT.to_owned(),
            proxy: None,
            cache_ttl: Duration::from_secs(24 * 60 * 60),
            attempts_per_source: 3,
            retry_backoff: Duration::from_secs(1),
            empty_run: 5,
            read_timeout: Duration::from_secs(30),
            rate_limit_calls: 50,
            rate_limit_interval: Duration::from_secs(5),
        }
    }
}
