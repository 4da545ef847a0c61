//! CoAP option numbers and the option multimap.
//!
//! # Design Decisions
//! - Options are kept sorted by number; repeated numbers keep insertion order
//! - Values are opaque bytes; typed accessors decode on demand
//! - Uint options use the minimal big-endian encoding (RFC 7252 §3.2)

use bytes::Bytes;

pub const IF_MATCH: u16 = 1;
pub const URI_HOST: u16 = 3;
pub const ETAG: u16 = 4;
pub const IF_NONE_MATCH: u16 = 5;
pub const OBSERVE: u16 = 6;
pub const URI_PORT: u16 = 7;
pub const LOCATION_PATH: u16 = 8;
pub const URI_PATH: u16 = 11;
pub const CONTENT_FORMAT: u16 = 12;
pub const MAX_AGE: u16 = 14;
pub const URI_QUERY: u16 = 15;
pub const ACCEPT: u16 = 17;
pub const LOCATION_QUERY: u16 = 20;
pub const BLOCK2: u16 = 23;
pub const BLOCK1: u16 = 27;
pub const SIZE2: u16 = 28;
pub const PROXY_URI: u16 = 35;
pub const PROXY_SCHEME: u16 = 39;
pub const SIZE1: u16 = 60;

/// A single option instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoapOption {
    pub number: u16,
    pub value: Bytes,
}

/// Ordered multimap of options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptionSet {
    options: Vec<CoapOption>,
}

impl OptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an option after any existing options with the same number.
    pub fn push(&mut self, number: u16, value: impl Into<Bytes>) {
        let index = self.options.partition_point(|o| o.number <= number);
        self.options.insert(
            index,
            CoapOption {
                number,
                value: value.into(),
            },
        );
    }

    /// Replace every instance of `number` with a single value.
    pub fn set(&mut self, number: u16, value: impl Into<Bytes>) {
        self.remove(number);
        self.push(number, value);
    }

    pub fn set_uint(&mut self, number: u16, value: u32) {
        self.set(number, encode_uint(value));
    }

    pub fn push_uint(&mut self, number: u16, value: u32) {
        self.push(number, encode_uint(value));
    }

    /// Remove every instance of `number`, returning how many were removed.
    pub fn remove(&mut self, number: u16) -> usize {
        let before = self.options.len();
        self.options.retain(|o| o.number != number);
        before - self.options.len()
    }

    pub fn contains(&self, number: u16) -> bool {
        self.options.iter().any(|o| o.number == number)
    }

    pub fn first(&self, number: u16) -> Option<&Bytes> {
        self.options
            .iter()
            .find(|o| o.number == number)
            .map(|o| &o.value)
    }

    pub fn all(&self, number: u16) -> impl Iterator<Item = &Bytes> {
        self.options
            .iter()
            .filter(move |o| o.number == number)
            .map(|o| &o.value)
    }

    pub fn uint(&self, number: u16) -> Option<u32> {
        self.first(number).map(|v| decode_uint(v))
    }

    /// All values of a string option; values that are not UTF-8 are skipped.
    pub fn strings(&self, number: u16) -> Vec<String> {
        self.all(number)
            .filter_map(|v| std::str::from_utf8(v).ok())
            .map(str::to_string)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoapOption> {
        self.options.iter()
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    // --- Typed accessors ---

    pub fn proxy_uri(&self) -> Option<&str> {
        self.first(PROXY_URI).and_then(|v| std::str::from_utf8(v).ok())
    }

    pub fn set_proxy_uri(&mut self, uri: &str) {
        self.set(PROXY_URI, Bytes::copy_from_slice(uri.as_bytes()));
    }

    pub fn has_proxy_uri(&self) -> bool {
        self.contains(PROXY_URI)
    }

    pub fn uri_path(&self) -> Vec<String> {
        self.strings(URI_PATH)
    }

    pub fn uri_query(&self) -> Vec<String> {
        self.strings(URI_QUERY)
    }

    pub fn content_format(&self) -> Option<u16> {
        self.uint(CONTENT_FORMAT).and_then(|v| u16::try_from(v).ok())
    }

    pub fn set_content_format(&mut self, format: u16) {
        self.set_uint(CONTENT_FORMAT, u32::from(format));
    }

    pub fn max_age(&self) -> Option<u32> {
        self.uint(MAX_AGE)
    }
}

/// Minimal big-endian encoding: zero encodes as the empty string.
pub fn encode_uint(value: u32) -> Bytes {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    Bytes::copy_from_slice(&bytes[skip..])
}

pub fn decode_uint(value: &[u8]) -> u32 {
    value
        .iter()
        .take(4)
        .fold(0u32, |acc, b| (acc << 8) | u32::from(*b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_numbers_sorted_and_repeats_in_order() {
        let mut options = OptionSet::new();
        options.push(URI_QUERY, "b=2");
        options.push(URI_PATH, "a");
        options.push(URI_QUERY, "c=3");
        options.push(URI_PATH, "b");
        options.push(IF_MATCH, "x");

        let numbers: Vec<u16> = options.iter().map(|o| o.number).collect();
        assert_eq!(numbers, vec![IF_MATCH, URI_PATH, URI_PATH, URI_QUERY, URI_QUERY]);
        assert_eq!(options.uri_path(), vec!["a", "b"]);
        assert_eq!(options.uri_query(), vec!["b=2", "c=3"]);
    }

    #[test]
    fn set_replaces_all_instances() {
        let mut options = OptionSet::new();
        options.push(ETAG, "one");
        options.push(ETAG, "two");
        options.set(ETAG, "three");
        assert_eq!(options.all(ETAG).count(), 1);
        assert_eq!(options.first(ETAG).unwrap().as_ref(), b"three");
    }

    #[test]
    fn uint_encoding_is_minimal() {
        assert!(encode_uint(0).is_empty());
        assert_eq!(encode_uint(60).as_ref(), &[60]);
        assert_eq!(encode_uint(0x1234).as_ref(), &[0x12, 0x34]);
        assert_eq!(decode_uint(&encode_uint(86_400)), 86_400);
    }
}
