//! Canonical query strings for numbered operations.
//!
//! Every request to the service is a GET on `/x` with an `op` parameter
//! selecting the operation, the operation's own parameters and a random
//! `.r` nonce that keeps intermediate caches from answering for the
//! service. A [`Query`] has two renderings:
//!
//! * [`Query::cache_key`]: parameters sorted by key, without the nonce.
//!   Two queries with the same logical parameters always share a key.
//! * [`Query::request_query`]: parameters in insertion order with the
//!   nonce appended. Only ever sent over the wire.
//!
//! # Example
//!
//! ```rust
//! use zhangmen::query::Query;
//!
//! let query = Query::new(22).param("listid", 600);
//! assert_eq!(query.cache_key(), "listid=600&op=22");
//! assert_eq!(query.request_query(0.42), "op=22&listid=600&.r=0.4200000000000000");
//! ```

use std::fmt;

use url::{form_urlencoded, Url};

use crate::error::Result;

/// Name of the nonce parameter.
const NONCE_KEY: &str = ".r";

/// An operation number and its parameters, percent-encoded.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Query {
    opcode: u32,
    pairs: Vec<(String, String)>,
}

impl Query {
    /// Starts a query for `opcode`, with `op` as its first parameter.
    #[must_use]
    pub fn new(opcode: u32) -> Self {
        Self {
            opcode,
            pairs: vec![("op".to_owned(), opcode.to_string())],
        }
    }

    /// Appends a parameter, percent-encoding its UTF-8 text.
    #[must_use]
    pub fn param(self, key: &str, value: impl fmt::Display) -> Self {
        let value = value.to_string();
        self.param_bytes(key, value.as_bytes())
    }

    /// Appends a parameter whose value is sent as raw bytes.
    ///
    /// Needed for text that the service expects back in the encoding it
    /// originally sent it in, which is not necessarily UTF-8.
    #[must_use]
    pub fn param_bytes(mut self, key: &str, value: &[u8]) -> Self {
        self.pairs.push((encode(key.as_bytes()), encode(value)));
        self
    }

    #[must_use]
    pub fn opcode(&self) -> u32 {
        self.opcode
    }

    /// Encoded `(key, value)` pairs in insertion order.
    #[must_use]
    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// The lookup key for cached responses to this query.
    ///
    /// Independent of parameter order, and never includes the nonce.
    #[must_use]
    pub fn cache_key(&self) -> String {
        let mut sorted: Vec<_> = self.pairs.iter().collect();
        sorted.sort();
        join(sorted)
    }

    /// The query string to send, ending in the `.r` nonce.
    ///
    /// `nonce` is a fraction in `[0, 1)` and is rendered with 16 decimals.
    #[must_use]
    pub fn request_query(&self, nonce: f64) -> String {
        format!("{}&{NONCE_KEY}={nonce:.16}", join(&self.pairs))
    }

    /// The full request URL against an operation `endpoint`.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the result is not a valid URL, which can only
    /// happen for a malformed endpoint.
    pub fn request_url(&self, endpoint: &Url, nonce: f64) -> Result<Url> {
        let url = format!("{}?{}", endpoint.as_str(), self.request_query(nonce));
        Ok(Url::parse(&url)?)
    }
}

fn encode(bytes: &[u8]) -> String {
    form_urlencoded::byte_serialize(bytes).collect()
}

fn join<'a>(pairs: impl IntoIterator<Item = &'a (String, String)>) -> String {
    pairs
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_sorted() {
        assert_eq!(
            Query::new(22).param("listid", 600).cache_key(),
            "listid=600&op=22"
        );
    }

    #[test]
    fn cache_key_ignores_parameter_order() {
        let ab = Query::new(3).param("a", 1).param("b", 2);
        let ba = Query::new(3).param("b", 2).param("a", 1);
        assert_eq!(ab.cache_key(), ba.cache_key());
        assert_ne!(ab.request_query(0.5), ba.request_query(0.5));
    }

    #[test]
    fn request_keeps_insertion_order_and_appends_nonce() {
        let query = Query::new(22).param("listid", 600);
        assert_eq!(
            query.request_query(0.42),
            "op=22&listid=600&.r=0.4200000000000000"
        );

        let endpoint = Url::parse("http://box.zhangmen.baidu.com/x").unwrap();
        assert_eq!(
            query.request_url(&endpoint, 0.42).unwrap().as_str(),
            "http://box.zhangmen.baidu.com/x?op=22&listid=600&.r=0.4200000000000000"
        );
    }

    #[test]
    fn nonce_never_reaches_cache_key() {
        let query = Query::new(22).param("listid", 600);
        let key = query.cache_key();
        let _ = query.request_query(0.1234);
        assert_eq!(query.cache_key(), key);
        assert!(!key.contains(NONCE_KEY));
    }

    #[test]
    fn values_are_percent_encoded() {
        let query = Query::new(12)
            .param("url", "")
            .param("title", "a b&c")
            .param_bytes("raw", &[0xc4, 0xe3]);
        assert_eq!(query.pairs()[1], ("url".to_owned(), String::new()));
        assert_eq!(query.pairs()[2].1, "a+b%26c");
        assert_eq!(query.pairs()[3].1, "%C4%E3");
    }
}
