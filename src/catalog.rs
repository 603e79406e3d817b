//! Walking the catalog category by category.
//!
//! Categories are numbered from 1 without a known upper bound. The service
//! answers queries for unused numbers with an empty list, and gaps occur
//! between used ones, so a scan only ends after a run of consecutive empty
//! categories.

use std::fmt;

use crate::{client::Client, error::Error, http::Transport, protocol::Playlist};

/// How a catalog scan ended.
#[derive(Debug)]
pub enum EndOfCatalog {
    /// A run of empty categories ending at `last`.
    EmptyRun { last: u32 },

    /// Querying category `at` failed.
    Failed { at: u32, error: Error },
}

impl EndOfCatalog {
    /// The ordinal of the last category queried.
    #[must_use]
    pub fn ordinal(&self) -> u32 {
        match self {
            Self::EmptyRun { last } => *last,
            Self::Failed { at, .. } => *at,
        }
    }
}

impl fmt::Display for EndOfCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyRun { last } => write!(f, "end of catalog after category {last}"),
            Self::Failed { at, error } => write!(f, "category {at} failed: {error}"),
        }
    }
}

/// Queries categories 1, 2, … and hands every result to `visit`, empty
/// ones included.
///
/// Stops after `empty_run` consecutive empty categories, or at the first
/// failure. An `empty_run` of 0 is treated as 1.
pub async fn scan<T, F>(client: &mut Client<T>, empty_run: u32, mut visit: F) -> EndOfCatalog
where
    T: Transport,
    F: FnMut(&Client<T>, u32, &[Playlist]),
{
    let threshold = empty_run.max(1);
    let mut empty = 0;

    for category in 1..=u32::MAX {
        let playlists = match client.category(category).await {
            Ok(playlists) => playlists,
            Err(error) => {
                error!("scanning category {category} failed: {error}");
                return EndOfCatalog::Failed {
                    at: category,
                    error,
                };
            }
        };

        visit(client, category, &playlists);

        if playlists.is_empty() {
            empty += 1;
            trace!("category {category} is empty ({empty} of {threshold})");
            if empty >= threshold {
                debug!("end of catalog at category {category}");
                return EndOfCatalog::EmptyRun { last: category };
            }
        } else {
            empty = 0;
        }
    }

    // Every category number was queried.
    EndOfCatalog::EmptyRun { last: u32::MAX }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::tests::{client, Scripted},
        error::ErrorKind,
    };

    const ONE: &[u8] = b"<result><data><id>1</id><name>A</name><tcount>3</tcount></data></result>";
    const NONE: &[u8] = b"<result></result>";

    fn scripted(bodies: &[&[u8]]) -> Scripted {
        // Every category is keyed by its `op`, so answers are consumed in
        // query order.
        bodies
            .iter()
            .fold(Scripted::default(), |transport, body| transport.ok("op=3", body))
    }

    #[tokio::test]
    async fn stops_after_run_of_empty_categories() {
        let mut client = client(scripted(&[ONE, ONE, ONE, NONE]));
        let mut visited = Vec::new();

        let end = scan(&mut client, 5, |_, category, playlists| {
            visited.push((category, playlists.len()));
        })
        .await;

        assert!(matches!(end, EndOfCatalog::EmptyRun { last: 8 }));
        assert_eq!(end.ordinal(), 8);
        assert_eq!(
            visited,
            [(1, 1), (2, 1), (3, 1), (4, 0), (5, 0), (6, 0), (7, 0), (8, 0)]
        );
    }

    #[tokio::test]
    async fn gap_shorter_than_threshold_resets_run() {
        let mut client = client(scripted(&[ONE, NONE, NONE, ONE, NONE]));
        let mut categories = Vec::new();

        let end = scan(&mut client, 3, |_, category, _| categories.push(category)).await;

        assert_eq!(end.ordinal(), 7);
        assert_eq!(categories, [1, 2, 3, 4, 5, 6, 7]);
    }

    #[tokio::test]
    async fn failure_ends_scan_with_ordinal() {
        let mut client = client(
            Scripted::default()
                .ok("op=3", ONE)
                .respond("op=3", Err(Error::unavailable("connection refused"))),
        );

        let end = scan(&mut client, 5, |_, _, _| {}).await;

        match end {
            EndOfCatalog::Failed { at, error } => {
                assert_eq!(at, 2);
                assert_eq!(error.kind, ErrorKind::Unavailable);
            }
            EndOfCatalog::EmptyRun { .. } => panic!("expected failure"),
        }
    }

    #[tokio::test]
    async fn visitor_sees_cache_filling_up() {
        let mut client = client(scripted(&[ONE, NONE]));
        let mut cached = Vec::new();

        scan(&mut client, 1, |client, _, _| cached.push(client.cache().len())).await;

        assert_eq!(cached, [1, 2]);
    }
}
