//! On-disk copy of the response cache.
//!
//! A scan of the whole catalog takes hundreds of requests, so the cache is
//! written to a JSON file between runs and read back at startup. Entries
//! keep the time they were fetched, so the usual TTL applies to them.
//!
//! # File Format
//!
//! ```json
//! [
//!   {
//!     "key": "listid=600&op=22",
//!     "fetched_at": 1700000000,
//!     "payload": "PHJlc3VsdD4uLi48L3Jlc3VsdD4="
//!   }
//! ]
//! ```
//!
//! `fetched_at` is in seconds since the UNIX epoch and `payload` holds the
//! raw document, base64 encoded since it need not be UTF-8.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
    time::SystemTime,
};

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, TimestampSeconds};

use crate::{
    cache::{CacheEntry, ResponseCache},
    error::Result,
};

/// File name of the store in the home directory.
pub const DEFAULT_FILE_NAME: &str = ".zhangmen_cache.json";

#[serde_as]
#[derive(Debug, Deserialize, Serialize)]
struct StoredEntry {
    key: String,

    #[serde_as(as = "TimestampSeconds<i64>")]
    fetched_at: SystemTime,

    payload: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Store {
    path: PathBuf,
}

impl Store {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.zhangmen_cache.json`, or `None` without a home directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        env::var_os("HOME")
            .filter(|home| !home.is_empty())
            .map(|home| PathBuf::from(home).join(DEFAULT_FILE_NAME))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the cache, starting afresh if that fails.
    ///
    /// A missing file is expected on the first run; anything else that
    /// goes wrong is logged.
    #[must_use]
    pub fn load(&self) -> ResponseCache {
        match self.try_load() {
            Ok(cache) => {
                debug!("loaded {} cached responses from {}", cache.len(), self.path.display());
                cache
            }
            Err(e) => {
                warn!("ignoring cache in {}: {e}", self.path.display());
                ResponseCache::new()
            }
        }
    }

    /// Reads the cache.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file exists but cannot be read or is not a
    /// valid store.
    pub fn try_load(&self) -> Result<ResponseCache> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ResponseCache::new()),
            Err(e) => return Err(e.into()),
        };

        let stored: Vec<StoredEntry> = serde_json::from_slice(&contents)?;
        stored
            .into_iter()
            .map(|entry| -> Result<(String, CacheEntry)> {
                let payload = BASE64_STANDARD.decode(entry.payload)?;
                Ok((
                    entry.key,
                    CacheEntry {
                        fetched_at: entry.fetched_at,
                        payload,
                    },
                ))
            })
            .collect()
    }

    /// Writes the whole cache, logging any failure.
    ///
    /// Losing the store only costs refetching, so callers carry on either
    /// way.
    pub fn save(&self, cache: &ResponseCache) {
        if let Err(e) = self.try_save(cache) {
            warn!("could not save cache to {}: {e}", self.path.display());
        }
    }

    /// Writes the whole cache.
    ///
    /// The file is replaced in one step, so an interrupted write leaves the
    /// previous version intact.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the file cannot be written.
    pub fn try_save(&self, cache: &ResponseCache) -> Result<()> {
        let mut stored: Vec<_> = cache
            .iter()
            .map(|(key, entry)| StoredEntry {
                key: key.to_owned(),
                fetched_at: entry.fetched_at,
                payload: BASE64_STANDARD.encode(&entry.payload),
            })
            .collect();
        stored.sort_unstable_by(|a, b| a.key.cmp(&b.key));

        let partial = self.path.with_extension("json.partial");
        fs::write(&partial, serde_json::to_vec(&stored)?)?;
        fs::rename(&partial, &self.path)?;

        trace!("saved {} cached responses to {}", stored.len(), self.path.display());
        Ok(())
    }
}
