//! Playlists of a category (opcode 3).
//!
//! # Wire Format
//!
//! ```xml
//! <result>
//!   <data>
//!     <id>600</id>
//!     <name><![CDATA[Playlist name]]></name>
//!     <tcount>100</tcount>
//!   </data>
//! </result>
//! ```

use super::{leading_int, Document, Node};
use crate::query::Query;

pub const OPCODE: u32 = 3;

/// Lists the playlists in category `category_id`.
#[must_use]
pub fn query(category_id: u32) -> Query {
    Query::new(OPCODE).param("list_cat", category_id)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Playlist {
    pub id: String,
    pub name: String,
    pub song_count: u64,
}

impl From<&Node> for Playlist {
    fn from(node: &Node) -> Self {
        Self {
            id: node.text_of("id"),
            name: node.text_of("name"),
            song_count: u64::try_from(leading_int(&node.text_of("tcount"))).unwrap_or_default(),
        }
    }
}

#[must_use]
pub fn parse(document: &Document) -> Vec<Playlist> {
    document
        .root()
        .descendants("data")
        .into_iter()
        .map(Playlist::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_playlists() {
        let document = Document::parse(
            b"<result>\
              <data><id>600</id><name>Hits</name><tcount>100</tcount></data>\
              <data><id>601</id><name>Oldies</name><tcount>many</tcount></data>\
              </result>",
        );

        assert_eq!(
            parse(&document),
            [
                Playlist {
                    id: "600".to_owned(),
                    name: "Hits".to_owned(),
                    song_count: 100,
                },
                Playlist {
                    id: "601".to_owned(),
                    name: "Oldies".to_owned(),
                    song_count: 0,
                },
            ]
        );
    }

    #[test]
    fn query_uses_list_cat() {
        assert_eq!(query(1).cache_key(), "list_cat=1&op=3");
    }
}
