//! Audio downloads with bounded retries across sources.
//!
//! The service usually offers several sources for a song, and any of them
//! may time out, hang up half-way, refuse the request or answer with an
//! error page instead of audio. The [`Downloader`] works through the
//! sources in the order the service listed them:
//!
//! * A transport failure (timeout, reset, truncated body) is retried on
//!   the same source after a fixed pause, up to the per-source attempt
//!   limit.
//! * An unsuccessful status or a body that is not audio abandons the
//!   source at once.
//! * The first body that passes the audio check is returned.
//!
//! When no source yields audio the result is `None`, so callers can report
//! the song as failed and carry on with the next one.
//!
//! Audio is fetched directly and never cached.

use std::time::Duration;

use url::Url;

use crate::{
    client::Client,
    config::Config,
    error::Result,
    http::Transport,
    protocol::{DownloadSource, Song},
};

/// Marker at the start of a file with an ID3v2 tag.
const ID3V2_MARKER: &[u8] = b"ID3";

/// Marker at the start of an ID3v1 tag, which fills the last 128 bytes.
const ID3V1_MARKER: &[u8] = b"TAG";

/// Size of the trailing window searched for [`ID3V1_MARKER`].
const TRAILER_LEN: usize = 256;

/// Outcome of a single attempt at one source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Attempt {
    /// Valid audio.
    Success(Vec<u8>),

    /// The request did not complete; the same source may work next time.
    TransientFailure,

    /// The source answered, but not with audio. Not worth retrying.
    PermanentFailure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Downloader {
    attempts_per_source: u32,
    backoff: Duration,
}

impl Downloader {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            attempts_per_source: config.attempts_per_source.max(1),
            backoff: config.retry_backoff,
        }
    }

    /// Downloads the audio of `song`.
    ///
    /// Returns `Ok(None)` when every source failed.
    ///
    /// # Errors
    ///
    /// Will return `Err` only if the sources of `song` cannot be resolved.
    pub async fn fetch<T>(&self, client: &mut Client<T>, song: &Song) -> Result<Option<Vec<u8>>>
    where
        T: Transport,
    {
        let sources = client.resolve_sources(song).await?;
        if sources.is_empty() {
            warn!("no sources for {} - {}", song.author, song.title);
        }

        Ok(self.fetch_from(client.transport(), &sources).await)
    }

    /// Tries `sources` in order and returns the first valid audio.
    pub async fn fetch_from<T>(&self, transport: &T, sources: &[DownloadSource]) -> Option<Vec<u8>>
    where
        T: Transport,
    {
        for source in sources {
            let Ok(url) = Url::parse(&source.url) else {
                warn!("skipping source with invalid url {}", source.url);
                continue;
            };

            for attempt in 1..=self.attempts_per_source {
                match Self::attempt(transport, url.clone()).await {
                    Attempt::Success(bits) => {
                        debug!("downloaded {} bytes from {url}", bits.len());
                        return Some(bits);
                    }
                    Attempt::PermanentFailure => break,
                    Attempt::TransientFailure => {
                        if attempt < self.attempts_per_source {
                            debug!(
                                "retrying {url} in {:.1}s (attempt {attempt} of {})",
                                self.backoff.as_secs_f32(),
                                self.attempts_per_source
                            );
                            tokio::time::sleep(self.backoff).await;
                        } else {
                            warn!("giving up on {url} after {attempt} attempts");
                        }
                    }
                }
            }
        }

        None
    }

    async fn attempt<T>(transport: &T, url: Url) -> Attempt
    where
        T: Transport,
    {
        let response = match transport.get(url.clone()).await {
            Ok(response) => response,
            Err(e) if e.is_transient() => {
                debug!("transient failure from {url}: {e}");
                return Attempt::TransientFailure;
            }
            Err(e) => {
                warn!("abandoning {url}: {e}");
                return Attempt::PermanentFailure;
            }
        };

        if !response.status.is_success() {
            warn!("abandoning {url}: HTTP status {}", response.status);
            return Attempt::PermanentFailure;
        }

        if response.is_truncated() {
            debug!(
                "short read from {url}: {} of {:?} bytes",
                response.body.len(),
                response.content_length
            );
            return Attempt::TransientFailure;
        }

        if is_audio(&response.body) {
            Attempt::Success(response.body)
        } else {
            warn!("abandoning {url}: response is not audio");
            Attempt::PermanentFailure
        }
    }
}

/// Whether `bits` look like an MP3 file rather than an error page.
///
/// Accepts a leading ID3v2 tag, or an ID3v1 tag at the start of the last
/// 256 bytes.
#[must_use]
pub fn is_audio(bits: &[u8]) -> bool {
    if bits.starts_with(ID3V2_MARKER) {
        return true;
    }

    bits.len()
        .checked_sub(TRAILER_LEN)
        .is_some_and(|start| bits[start..].starts_with(ID3V1_MARKER))
}
