//! Songs of a playlist (opcode 22).
//!
//! # Wire Format
//!
//! ```xml
//! <?xml version="1.0" encoding="gb2312"?>
//! <result>
//!   <count>1</count>
//!   <data>
//!     <id>1234</id>
//!     <name><![CDATA[Song Title$$Artist Name$$$$]]></name>
//!   </data>
//! </result>
//! ```
//!
//! The `name` field packs title and author. It is also what the service
//! wants back, byte for byte in the document's encoding, when resolving
//! download sources, so songs keep it as [`EncodedText`].

use std::sync::LazyLock;

use regex_lite::Regex;

use super::{leading_int, Document, Node};
use crate::{query::Query, text::EncodedText};

pub const OPCODE: u32 = 22;

/// Splits `"<title>$$<author>$$$$"` names.
static NAME_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*)\$\$(.*)\$\$\$\$").expect("invalid name pattern"));

/// Lists the songs in playlist `playlist_id`.
#[must_use]
pub fn query(playlist_id: &str) -> Query {
    Query::new(OPCODE).param("listid", playlist_id)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Song {
    pub id: String,

    /// The name as sent by the service, in the document's encoding.
    pub raw_name: EncodedText,

    pub title: String,
    pub author: String,
}

impl Song {
    /// Builds a song from its packed `name`, in UTF-8.
    ///
    /// Without the `$$` separators, both title and author are the whole
    /// name.
    #[must_use]
    pub fn from_name(id: String, raw_name: EncodedText) -> Self {
        let name = raw_name.to_utf8();
        let (title, author) = match NAME_PATTERN.captures(&name) {
            Some(captures) => (captures[1].to_owned(), captures[2].to_owned()),
            None => (name.to_string(), name.to_string()),
        };

        Self {
            id,
            raw_name,
            title,
            author,
        }
    }

    fn from_node(node: &Node, document: &Document) -> Self {
        let raw_name = EncodedText::new(node.raw_of("name"), document.encoding());
        Self::from_name(node.text_of("id"), raw_name)
    }
}

#[must_use]
pub fn parse(document: &Document) -> Vec<Song> {
    document
        .root()
        .descendants("data")
        .into_iter()
        .map(|node| Song::from_node(node, document))
        .collect()
}

/// The song count the document reports, which may differ from the number
/// of `<data>` records it holds.
#[must_use]
pub fn count(document: &Document) -> u64 {
    u64::try_from(leading_int(&document.root().text_of("count"))).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use encoding_rs::GBK;

    use super::*;

    #[test]
    fn splits_title_and_author() {
        let song = Song::from_name("1".to_owned(), "Song Title$$Artist Name$$$$".into());
        assert_eq!(song.title, "Song Title");
        assert_eq!(song.author, "Artist Name");
    }

    #[test]
    fn name_without_separator_is_title_and_author() {
        let song = Song::from_name("1".to_owned(), "Untitled".into());
        assert_eq!(song.title, "Untitled");
        assert_eq!(song.author, "Untitled");
        assert_eq!(song.raw_name.as_bytes(), b"Untitled");
    }

    #[test]
    fn keeps_raw_name_in_document_encoding() {
        let mut raw = b"<?xml version=\"1.0\" encoding=\"gb2312\"?>\
                        <result><count>5</count><data><id>9</id><name>"
            .to_vec();
        // "你好$$Artist$$$$"
        raw.extend_from_slice(&[0xc4, 0xe3, 0xba, 0xc3]);
        raw.extend_from_slice(b"$$Artist$$$$</name></data></result>");

        let document = Document::parse(&raw);
        let songs = parse(&document);
        assert_eq!(songs.len(), 1);
        assert_eq!(count(&document), 5);

        let song = &songs[0];
        assert_eq!(song.id, "9");
        assert_eq!(song.title, "你好");
        assert_eq!(song.author, "Artist");
        assert_eq!(song.raw_name.encoding(), GBK);
        assert_eq!(&song.raw_name.as_bytes()[..4], &[0xc4, 0xe3, 0xba, 0xc3]);
    }

    #[test]
    fn raw_name_survives_characters_outside_gbk() {
        let mut name = vec![0x81, 0x30, 0x81, 0x30];
        name.extend_from_slice(b"x$$A$$$$");

        let mut raw = b"<?xml version=\"1.0\" encoding=\"gb2312\"?><result><data><id>1</id><name>"
            .to_vec();
        raw.extend_from_slice(&name);
        raw.extend_from_slice(b"</name></data></result>");

        let songs = parse(&Document::parse(&raw));
        assert_eq!(songs[0].raw_name.as_bytes(), name);
        assert_eq!(songs[0].title, "\u{80}x");
        assert_eq!(songs[0].author, "A");
    }

    #[test]
    fn padded_names_keep_their_spaces() {
        let document = Document::parse(
            b"<result><data><id>2</id><name><![CDATA[ Padded$$B$$$$ ]]></name></data></result>",
        );

        let songs = parse(&document);
        assert_eq!(songs[0].raw_name.as_bytes(), b" Padded$$B$$$$ ");
        assert_eq!(songs[0].title, " Padded");
        assert_eq!(songs[0].author, "B");
    }
}
