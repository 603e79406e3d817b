//! Minimal XML document tree for operation responses.
//!
//! Responses are small and their schema is undocumented, so they are
//! parsed into a plain element tree that record parsers search by tag
//! name. Parsing never fails: a document that breaks off or is malformed
//! keeps whatever was read up to that point.
//!
//! The service declares its encoding (usually `gb2312`) in the XML
//! declaration. Markup is ASCII in every such encoding, so the body is
//! parsed as it arrived: every element keeps the bytes of its text in the
//! declared encoding next to their UTF-8 decoding. Some fields must go
//! back to the service byte for byte.

use std::borrow::Cow;

use encoding_rs::{Encoding, UTF_8};
use quick_xml::{
    escape::resolve_predefined_entity,
    events::{BytesRef, BytesStart, Event},
    Reader,
};

/// An element with its direct text and child elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Node {
    name: String,

    /// Text in the document's encoding, entities resolved.
    raw: Vec<u8>,

    text: String,
    children: Vec<Node>,
}

impl Node {
    fn from_start(start: &BytesStart<'_>) -> Self {
        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).into_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// All text inside this element and its descendants, in document order.
    #[must_use]
    pub fn inner_text(&self) -> Cow<'_, str> {
        if self.children.is_empty() {
            return Cow::Borrowed(&self.text);
        }

        let mut text = self.text.clone();
        for child in &self.children {
            text.push_str(&child.inner_text());
        }
        Cow::Owned(text)
    }

    /// Like [`inner_text`](Self::inner_text), in the document's encoding.
    #[must_use]
    pub fn inner_raw(&self) -> Cow<'_, [u8]> {
        if self.children.is_empty() {
            return Cow::Borrowed(&self.raw);
        }

        let mut raw = self.raw.clone();
        for child in &self.children {
            raw.extend_from_slice(&child.inner_raw());
        }
        Cow::Owned(raw)
    }

    /// All descendants named `name`, in document order.
    #[must_use]
    pub fn descendants(&self, name: &str) -> Vec<&Node> {
        let mut found = Vec::new();
        self.collect(name, &mut found);
        found
    }

    fn collect<'a>(&'a self, name: &str, found: &mut Vec<&'a Node>) {
        for child in &self.children {
            if child.name == name {
                found.push(child);
            }
            child.collect(name, found);
        }
    }

    /// The first descendant named `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Node> {
        self.children.iter().find_map(|child| {
            if child.name == name {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// Trimmed inner text of the first descendant named `name`, or an empty
    /// string.
    #[must_use]
    pub fn text_of(&self, name: &str) -> String {
        self.find(name)
            .map(|node| node.inner_text().trim().to_owned())
            .unwrap_or_default()
    }

    /// Untrimmed inner bytes of the first descendant named `name`, or none.
    #[must_use]
    pub fn raw_of(&self, name: &str) -> Vec<u8> {
        self.find(name)
            .map(|node| node.inner_raw().into_owned())
            .unwrap_or_default()
    }
}

/// A parsed response: its root element and the encoding it was sent in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Document {
    root: Node,
    encoding: &'static Encoding,
}

impl Document {
    /// Parses a raw response body.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let (encoding, bom_len) = detect_encoding(raw);
        let body = &raw[bom_len..];

        if encoding.is_ascii_compatible() {
            return Self {
                root: parse_root(body, encoding),
                encoding,
            };
        }

        // UTF-16 markup is not ASCII, so the body is transcoded first and
        // its text kept as UTF-8.
        let (text, _) = encoding.decode_without_bom_handling(body);
        Self {
            root: parse_root(text.as_bytes(), UTF_8),
            encoding: UTF_8,
        }
    }

    /// The root element. Unnamed and empty if the body held no elements.
    #[must_use]
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// The encoding the text of the document is in, UTF-8 if it declared
    /// none.
    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }
}

/// Finds the encoding from a byte order mark or the XML declaration, and
/// the length of the byte order mark.
fn detect_encoding(raw: &[u8]) -> (&'static Encoding, usize) {
    if let Some(found) = Encoding::for_bom(raw) {
        return found;
    }

    let mut reader = Reader::from_reader(raw);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Decl(decl)) => {
                let label = decl.encoding().and_then(Result::ok);
                let encoding = label
                    .and_then(|label| Encoding::for_label(&label))
                    .unwrap_or(UTF_8);
                return (encoding, 0);
            }
            Ok(Event::Start(_) | Event::Empty(_) | Event::Eof) | Err(_) => return (UTF_8, 0),
            Ok(_) => buf.clear(),
        }
    }
}

fn parse_root(body: &[u8], encoding: &'static Encoding) -> Node {
    // Text is not trimmed here: entity references split it into several
    // events, and the spaces next to them belong to the text.
    let mut reader = Reader::from_reader(body);

    // Open elements; the bottom one collects top-level elements.
    let mut stack = vec![Node::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => stack.push(Node::from_start(&start)),
            Ok(Event::Empty(start)) => {
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(Node::from_start(&start));
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() > 1 {
                    close(&mut stack, encoding);
                }
            }
            Ok(Event::Text(text)) => {
                if let Some(node) = stack.last_mut() {
                    node.raw.extend_from_slice(&text);
                }
            }
            Ok(Event::CData(data)) => {
                if let Some(node) = stack.last_mut() {
                    node.raw.extend_from_slice(&data);
                }
            }
            Ok(Event::GeneralRef(reference)) => {
                if let Some(node) = stack.last_mut() {
                    resolve_reference(&reference, encoding, &mut node.raw);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "malformed document at byte {}: {e}",
                    reader.error_position()
                );
                break;
            }
        }
    }

    // Keep whatever was read of elements that never closed.
    while stack.len() > 1 {
        close(&mut stack, encoding);
    }

    let mut top = stack.pop().unwrap_or_default();
    if top.children.is_empty() {
        Node::default()
    } else {
        top.children.swap_remove(0)
    }
}

/// Appends the expansion of `reference` to `raw`, in `encoding`.
///
/// Unknown entities are kept as written.
fn resolve_reference(reference: &BytesRef<'_>, encoding: &'static Encoding, raw: &mut Vec<u8>) {
    if let Ok(Some(chr)) = reference.resolve_char_ref() {
        let mut utf8 = [0; 4];
        let (bytes, _, _) = encoding.encode(chr.encode_utf8(&mut utf8));
        raw.extend_from_slice(&bytes);
        return;
    }

    let name = String::from_utf8_lossy(reference);
    match resolve_predefined_entity(&name) {
        Some(resolved) => raw.extend_from_slice(resolved.as_bytes()),
        None => {
            raw.push(b'&');
            raw.extend_from_slice(reference);
            raw.push(b';');
        }
    }
}

/// Pops the innermost open element into its parent, decoding its text.
fn close(stack: &mut Vec<Node>, encoding: &'static Encoding) {
    if let Some(mut node) = stack.pop() {
        let (text, malformed) = encoding.decode_without_bom_handling(&node.raw);
        if malformed {
            warn!("<{}> is not valid {}", node.name, encoding.name());
        }
        node.text = text.into_owned();

        if let Some(parent) = stack.last_mut() {
            parent.children.push(node);
        }
    }
}
