//! Operations and records of the music box service.
//!
//! The service answers numbered operations on a single endpoint with XML
//! documents. Each submodule covers one operation: its opcode, the query
//! it sends and a parser for the records in its response.
//!
//! | opcode | module         | records                          |
//! |--------|----------------|----------------------------------|
//! | 3      | [`category`]   | [`Playlist`] per `<data>`        |
//! | 22     | [`playlist`]   | [`Song`] per `<data>`            |
//! | 12     | [`sources`]    | [`DownloadSource`] per `<url>`   |
//!
//! # Robustness
//!
//! The schema is undocumented and not always consistent. Parsers never
//! fail: a missing or malformed field becomes an empty string or zero.

pub mod category;
pub mod playlist;
pub mod sources;
pub mod xml;

pub use category::Playlist;
pub use playlist::Song;
pub use sources::DownloadSource;
pub use xml::{Document, Node};

/// Parses the leading integer of `text`, or zero if there is none.
///
/// Leading whitespace and a sign are accepted and anything after the
/// digits is ignored, so `"12 songs"` is 12 and `"n/a"` is 0.
#[must_use]
pub fn leading_int(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let value = digits
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0_i64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(i64::from(digit - b'0'))
        });

    if negative {
        -value
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_int_defaults_to_zero() {
        assert_eq!(leading_int("42"), 42);
        assert_eq!(leading_int(" 12 songs"), 12);
        assert_eq!(leading_int("-3"), -3);
        assert_eq!(leading_int("n/a"), 0);
        assert_eq!(leading_int(""), 0);
    }
}
