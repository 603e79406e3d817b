//! Text that remembers the encoding it came in.
//!
//! The service answers in GB2312/GBK and expects some fields sent back in
//! that same encoding rather than in UTF-8. [`EncodedText`] keeps the raw
//! bytes together with their encoding, with explicit conversions for
//! display ([`EncodedText::to_utf8`]) and re-transmission
//! ([`EncodedText::as_bytes`]).

use std::{borrow::Cow, fmt};

use encoding_rs::{Encoding, UTF_8};

#[derive(Clone, PartialEq, Eq, Hash)]
pub struct EncodedText {
    bytes: Vec<u8>,
    encoding: &'static Encoding,
}

impl EncodedText {
    /// Wraps bytes that are already in `encoding`.
    #[must_use]
    pub fn new(bytes: Vec<u8>, encoding: &'static Encoding) -> Self {
        Self { bytes, encoding }
    }

    /// Encodes UTF-8 `text` into `encoding`.
    ///
    /// Characters that `encoding` cannot represent become numeric
    /// character references, as `encoding_rs` does for HTML forms.
    #[must_use]
    pub fn encode(text: &str, encoding: &'static Encoding) -> Self {
        let (bytes, output_encoding, unmappable) = encoding.encode(text);
        if unmappable {
            warn!(
                "\"{text}\" cannot be represented in {}",
                output_encoding.name()
            );
        }

        Self {
            bytes: bytes.into_owned(),
            encoding: output_encoding,
        }
    }

    /// The raw bytes, in [`encoding`](Self::encoding).
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn encoding(&self) -> &'static Encoding {
        self.encoding
    }

    /// Decodes the text to UTF-8, replacing malformed sequences.
    #[must_use]
    pub fn to_utf8(&self) -> Cow<'_, str> {
        self.encoding.decode_without_bom_handling(&self.bytes).0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl Default for EncodedText {
    fn default() -> Self {
        Self::new(Vec::new(), UTF_8)
    }
}

impl From<&str> for EncodedText {
    fn from(text: &str) -> Self {
        Self::new(text.as_bytes().to_vec(), UTF_8)
    }
}

impl fmt::Display for EncodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_utf8())
    }
}

impl fmt::Debug for EncodedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({})", self.to_utf8(), self.encoding.name())
    }
}

#[cfg(test)]
mod tests {
    use encoding_rs::GBK;

    use super::*;

    #[test]
    fn round_trips_through_gbk() {
        let text = EncodedText::encode("你好", GBK);
        assert_eq!(text.as_bytes(), &[0xc4, 0xe3, 0xba, 0xc3]);
        assert_eq!(text.encoding(), GBK);
        assert_eq!(text.to_utf8(), "你好");
        assert_eq!(text.to_string(), "你好");
    }

    #[test]
    fn utf8_text_is_unchanged() {
        let text = EncodedText::from("Song Title$$Artist Name$$$$");
        assert_eq!(text.as_bytes(), b"Song Title$$Artist Name$$$$");
        assert_eq!(text.encoding(), UTF_8);
    }
}
