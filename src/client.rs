//! Operation client for the music box service.
//!
//! Every metadata operation follows the same path:
//!
//! 1. Build the canonical [`Query`] for the operation
//! 2. Look its cache key up in the [`ResponseCache`], fetching the document
//!    over HTTP on a miss or when the cached copy expired
//! 3. Parse the document into its root node
//! 4. Extract typed records
//!
//! Operation fetches are not retried: a transport failure or unsuccessful
//! status is returned to the caller. Only the
//! [`Downloader`](crate::downloader::Downloader) retries, and only for audio.
//!
//! # Example
//!
//! ```rust
//! use zhangmen::{client::Client, config::Config};
//!
//! let mut client = Client::new(&Config::default())?;
//! for playlist in client.category(1).await? {
//!     let songs = client.playlist(&playlist.id).await?;
//!     println!("{}: {} songs", playlist.name, songs.len());
//! }
//! ```

use std::time::Duration;

use url::Url;

use crate::{
    cache::ResponseCache,
    config::Config,
    error::{Error, Result},
    http::{self, Transport},
    protocol::{category, playlist, sources, Document, DownloadSource, Playlist, Song},
    query::Query,
};

/// Source of the `.r` nonce, a fraction in `[0, 1)`.
pub type NonceFn = fn() -> f64;

pub struct Client<T = http::Client> {
    transport: T,
    cache: ResponseCache,
    cache_ttl: Duration,
    endpoint: Url,
    nonce: NonceFn,
}

impl Client {
    /// Creates a client that talks to the service over HTTP.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the HTTP client cannot be built with the
    /// configuration or the configured host does not form a valid URL.
    pub fn new(config: &Config) -> Result<Self> {
        Self::with_transport(config, http::Client::new(config)?)
    }
}

impl<T> Client<T>
where
    T: Transport,
{
    /// Creates a client on top of any [`Transport`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the configured host does not form a valid URL.
    pub fn with_transport(config: &Config, transport: T) -> Result<Self> {
        let endpoint = Url::parse(&format!("http://{}/x", config.host))?;

        Ok(Self {
            transport,
            cache: ResponseCache::new(),
            cache_ttl: config.cache_ttl,
            endpoint,
            nonce: fastrand::f64,
        })
    }

    /// Replaces the nonce source.
    #[must_use]
    pub fn with_nonce(mut self, nonce: NonceFn) -> Self {
        self.nonce = nonce;
        self
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Cache of operation responses.
    ///
    /// Covers all metadata, but not audio.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Replaces the cache, for example with one loaded from disk.
    pub fn set_cache(&mut self, cache: ResponseCache) {
        self.cache = cache;
    }

    /// The URL a live fetch of `query` would use, with a fresh nonce.
    ///
    /// # Errors
    ///
    /// Will return `Err` if no valid URL can be built.
    pub fn op_url(&self, query: &Query) -> Result<Url> {
        query.request_url(&self.endpoint, (self.nonce)())
    }

    /// Performs a numbered operation and parses its response.
    ///
    /// Served from the cache when an earlier response to the same logical
    /// query is younger than the TTL.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the response is not cached and fetching it
    /// fails or returns an unsuccessful status.
    pub async fn op(&mut self, query: &Query) -> Result<Document> {
        let key = query.cache_key();
        let url = self.op_url(query)?;

        let Self {
            transport,
            cache,
            cache_ttl,
            ..
        } = self;

        let raw = cache
            .get_or_fetch(&key, *cache_ttl, || async move {
                debug!("fetching {url}");
                let response = transport.get(url).await?;
                if !response.status.is_success() {
                    return Err(Error::from(response.status));
                }
                Ok(response.body)
            })
            .await?;

        let document = Document::parse(raw);
        trace!("op {}: {document:#?}", query.opcode());
        Ok(document)
    }

    /// Lists the playlists in a category.
    ///
    /// Categories are numbered from 1 onwards.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation fails; see [`op`](Self::op).
    pub async fn category(&mut self, category_id: u32) -> Result<Vec<Playlist>> {
        let document = self.op(&category::query(category_id)).await?;
        Ok(category::parse(&document))
    }

    /// Lists the songs in a playlist.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation fails; see [`op`](Self::op).
    pub async fn playlist(&mut self, playlist_id: &str) -> Result<Vec<Song>> {
        let document = self.op(&playlist::query(playlist_id)).await?;
        Ok(playlist::parse(&document))
    }

    /// The number of songs the service reports for a playlist.
    ///
    /// Shares its cached response with [`playlist`](Self::playlist).
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation fails; see [`op`](Self::op).
    pub async fn playlist_count(&mut self, playlist_id: &str) -> Result<u64> {
        let document = self.op(&playlist::query(playlist_id)).await?;
        Ok(playlist::count(&document))
    }

    /// Resolves the candidate download locations of a song, in the order
    /// they should be tried.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the operation fails; see [`op`](Self::op).
    pub async fn resolve_sources(&mut self, song: &Song) -> Result<Vec<DownloadSource>> {
        let document = self.op(&sources::query(song)).await?;
        Ok(sources::parse(&document))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use reqwest::StatusCode;

    use super::*;
    use crate::{error::ErrorKind, http::Response};

    /// Transport that answers from a script and records every request.
    ///
    /// Responses are matched by the value of the `op` parameter, or by the
    /// full URL for binary fetches. Each entry is consumed in order; the
    /// last one repeats.
    #[derive(Default)]
    pub(crate) struct Scripted {
        script: Mutex<HashMap<String, Vec<Result<Response>>>>,
        pub(crate) requests: Mutex<Vec<Url>>,
    }

    impl Scripted {
        pub(crate) fn respond(self, target: &str, response: Result<Response>) -> Self {
            self.script
                .lock()
                .unwrap()
                .entry(target.to_owned())
                .or_default()
                .push(response);
            self
        }

        pub(crate) fn ok(self, target: &str, body: &[u8]) -> Self {
            self.respond(target, Ok(ok(body)))
        }

        pub(crate) fn requests(&self) -> Vec<Url> {
            self.requests.lock().unwrap().clone()
        }

        fn target(url: &Url) -> String {
            url.query_pairs()
                .find(|(key, _)| key == "op")
                .map_or_else(|| url.to_string(), |(_, op)| format!("op={op}"))
        }
    }

    impl Transport for Scripted {
        async fn get(&self, url: Url) -> Result<Response> {
            self.requests.lock().unwrap().push(url.clone());

            let target = Self::target(&url);
            let mut script = self.script.lock().unwrap();
            let responses = script
                .get_mut(&target)
                .ok_or_else(|| Error::unavailable(format!("nothing scripted for {target}")))?;
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                match &responses[0] {
                    Ok(response) => Ok(response.clone()),
                    Err(e) => Err(Error::new(e.kind, e.to_string())),
                }
            }
        }
    }

    pub(crate) fn ok(body: &[u8]) -> Response {
        Response {
            status: StatusCode::OK,
            content_length: Some(body.len() as u64),
            body: body.to_vec(),
        }
    }

    pub(crate) fn status(status: StatusCode) -> Response {
        Response {
            status,
            content_length: Some(0),
            body: Vec::new(),
        }
    }

    pub(crate) const PLAYLIST_XML: &[u8] = b"<?xml version=\"1.0\"?><result><count>2</count>\
        <data><id>11</id><name>First$$Singer$$$$</name></data>\
        <data><id>12</id><name>Plain</name></data></result>";

    pub(crate) fn client(transport: Scripted) -> Client<Scripted> {
        Client::with_transport(&Config::default(), transport)
            .unwrap()
            .with_nonce(|| 0.42)
    }

    #[test]
    fn op_url_has_nonce() {
        let client = client(Scripted::default());
        let url = client.op_url(&playlist::query("600")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://box.zhangmen.baidu.com/x?op=22&listid=600&.r=0.4200000000000000"
        );
    }

    #[test]
    fn every_live_url_gets_a_fresh_nonce() {
        let client = Client::with_transport(&Config::default(), Scripted::default()).unwrap();
        let query = playlist::query("600");

        let nonce = |url: Url| {
            url.query_pairs()
                .find(|(key, _)| key == ".r")
                .map(|(_, value)| value.into_owned())
                .unwrap()
        };
        let first = nonce(client.op_url(&query).unwrap());
        let second = nonce(client.op_url(&query).unwrap());

        assert_ne!(first, second);
        assert!(first.starts_with("0.") && first.len() == 18);
        assert_eq!(query.cache_key(), "listid=600&op=22");
    }

    #[tokio::test]
    async fn op_returns_result_root() {
        let mut client = client(Scripted::default().ok("op=22", PLAYLIST_XML));
        let document = client.op(&playlist::query("600")).await.unwrap();
        assert_eq!(document.root().name(), "result");
    }

    #[tokio::test]
    async fn repeated_op_is_served_from_cache() {
        let mut client = client(Scripted::default().ok("op=22", PLAYLIST_XML));

        let first = client.playlist("600").await.unwrap();
        assert!(client.cache().contains_key("listid=600&op=22"));

        let second = client.playlist("600").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(client.playlist_count("600").await.unwrap(), 2);
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn playlist_splits_names() {
        let mut client = client(Scripted::default().ok("op=22", PLAYLIST_XML));
        let songs = client.playlist("600").await.unwrap();

        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].id, "11");
        assert_eq!(songs[0].title, "First");
        assert_eq!(songs[0].author, "Singer");
        assert_eq!(songs[1].title, "Plain");
        assert_eq!(songs[1].author, "Plain");
    }

    #[tokio::test]
    async fn category_and_sources_use_their_opcodes() {
        let mut client = client(
            Scripted::default()
                .ok(
                    "op=3",
                    b"<result><data><id>600</id><name>Hits</name><tcount>2</tcount></data></result>",
                )
                .ok(
                    "op=12",
                    b"<result><url><encode>http://a.example/m/xyz</encode>\
                      <decode>1.mp3</decode></url></result>",
                ),
        );

        let playlists = client.category(1).await.unwrap();
        assert_eq!(playlists[0].id, "600");
        assert_eq!(playlists[0].song_count, 2);

        let song = Song::from_name("11".to_owned(), "First$$Singer$$$$".into());
        let sources = client.resolve_sources(&song).await.unwrap();
        assert_eq!(sources[0].url, "http://a.example/m/1.mp3");

        let requests = client.transport().requests();
        assert_eq!(requests[0].query(), Some("op=3&list_cat=1&.r=0.4200000000000000"));
        assert!(requests[1]
            .as_str()
            .contains("title=First%24%24Singer%24%24%24%24&url=&listenreelect=0"));
    }

    #[tokio::test]
    async fn unsuccessful_status_is_a_fetch_failure() {
        let mut client = client(
            Scripted::default().respond("op=3", Ok(status(StatusCode::SERVICE_UNAVAILABLE))),
        );

        let err = client.category(1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unavailable);
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_retry() {
        let mut client = client(
            Scripted::default().respond("op=3", Err(Error::deadline_exceeded("timed out"))),
        );

        assert!(client.category(1).await.is_err());
        assert_eq!(client.transport().requests().len(), 1);
    }
}
