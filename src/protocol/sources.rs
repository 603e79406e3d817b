//! Download sources of a song (opcode 12).
//!
//! # Wire Format
//!
//! ```xml
//! <result>
//!   <count>2</count>
//!   <url>
//!     <encode><![CDATA[http://zhangmenshiting.baidu.com/data2/music/bWxwbm9o]]></encode>
//!     <decode><![CDATA[8795371.mp3?xcode=5d1b2a]]></decode>
//!     <type>8</type>
//!     <lrid>8795</lrid>
//!     <flag>1</flag>
//!   </url>
//! </result>
//! ```
//!
//! `encode` carries an obfuscated path whose last segment is replaced by
//! `decode` to obtain the actual file URL.

use super::{leading_int, Document, Node};
use crate::{protocol::Song, query::Query};

pub const OPCODE: u32 = 12;

/// Resolves the download sources of `song`.
///
/// The title goes back exactly as the service sent it, in its original
/// encoding.
#[must_use]
pub fn query(song: &Song) -> Query {
    Query::new(OPCODE)
        .param("count", 1)
        .param("mtype", 1)
        .param_bytes("title", song.raw_name.as_bytes())
        .param("url", "")
        .param("listenreelect", 0)
}

/// A candidate URL for a song's audio, in upstream priority order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct DownloadSource {
    pub url: String,
    pub kind: i64,
    pub lyrics_id: i64,
    pub flag: String,
}

impl From<&Node> for DownloadSource {
    fn from(node: &Node) -> Self {
        Self {
            url: join_url(&node.text_of("encode"), &node.text_of("decode")),
            kind: leading_int(&node.text_of("type")),
            lyrics_id: leading_int(&node.text_of("lrid")),
            flag: node.text_of("flag"),
        }
    }
}

#[must_use]
pub fn parse(document: &Document) -> Vec<DownloadSource> {
    document
        .root()
        .descendants("url")
        .into_iter()
        .map(DownloadSource::from)
        .collect()
}

/// Replaces the file name of `encoded` with `file_name`.
fn join_url(encoded: &str, file_name: &str) -> String {
    let file_name = file_name.trim_start_matches('/');
    match encoded.rfind('/') {
        Some(slash) => format!("{}/{file_name}", &encoded[..slash]),
        None => file_name.to_owned(),
    }
}
