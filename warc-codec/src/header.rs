// Copyright 2025 Janek Bevendorff
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! WARC named fields and the record header map.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io;

pub const WARC_RECORD_ID: &str = "WARC-Record-ID";
pub const WARC_DATE: &str = "WARC-Date";
pub const WARC_TYPE: &str = "WARC-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";
pub const CONTENT_TYPE: &str = "Content-Type";
pub const WARC_CONCURRENT_TO: &str = "WARC-Concurrent-To";
pub const WARC_BLOCK_DIGEST: &str = "WARC-Block-Digest";
pub const WARC_PAYLOAD_DIGEST: &str = "WARC-Payload-Digest";
pub const WARC_IP_ADDRESS: &str = "WARC-IP-Address";
pub const WARC_REFERS_TO: &str = "WARC-Refers-To";
pub const WARC_TARGET_URI: &str = "WARC-Target-URI";
pub const WARC_TRUNCATED: &str = "WARC-Truncated";
pub const WARC_WARCINFO_ID: &str = "WARC-Warcinfo-ID";
pub const WARC_FILENAME: &str = "WARC-Filename";
pub const WARC_PROFILE: &str = "WARC-Profile";
pub const WARC_IDENTIFIED_PAYLOAD_TYPE: &str = "WARC-Identified-Payload-Type";
pub const WARC_SEGMENT_ORIGIN_ID: &str = "WARC-Segment-Origin-ID";
pub const WARC_SEGMENT_NUMBER: &str = "WARC-Segment-Number";
pub const WARC_SEGMENT_TOTAL_LENGTH: &str = "WARC-Segment-Total-Length";

/// Official spellings of all defined WARC named fields.
pub const DEFINED_FIELDS: [&str; 19] = [
    WARC_RECORD_ID,
    WARC_DATE,
    WARC_TYPE,
    CONTENT_LENGTH,
    CONTENT_TYPE,
    WARC_CONCURRENT_TO,
    WARC_BLOCK_DIGEST,
    WARC_PAYLOAD_DIGEST,
    WARC_IP_ADDRESS,
    WARC_REFERS_TO,
    WARC_TARGET_URI,
    WARC_TRUNCATED,
    WARC_WARCINFO_ID,
    WARC_FILENAME,
    WARC_PROFILE,
    WARC_IDENTIFIED_PAYLOAD_TYPE,
    WARC_SEGMENT_ORIGIN_ID,
    WARC_SEGMENT_NUMBER,
    WARC_SEGMENT_TOTAL_LENGTH,
];

/// Canonicalize a header field name.
///
/// The key is first brought into MIME-style `Title-Case-With-Dashes`. If the
/// result names a defined WARC field, the official spelling is returned instead
/// (`warc-record-id` becomes `WARC-Record-ID`). Other keys keep the title-cased form.
///
/// The function is idempotent and case-insensitive over the defined field set.
pub fn canonical_key(key: &str) -> String {
    let key = key.trim();
    if let Some(defined) = DEFINED_FIELDS.iter().find(|f| f.eq_ignore_ascii_case(key)) {
        return defined.to_string();
    }

    let mut out = String::with_capacity(key.len());
    let mut upper = true;
    for c in key.chars() {
        if upper {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c.to_ascii_lowercase());
        }
        upper = c == '-';
    }
    out
}

/// Dict-like type representing a WARC header block.
///
/// Keys are stored canonicalized and there is at most one value per key.
/// Iteration yields fields in sorted key order, which is also the order
/// in which they are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    headers: BTreeMap<String, String>,
}

impl HeaderMap {
    /// Create a new, empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get value for (case-insensitive) header key.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.headers.get(&canonical_key(key)).map(String::as_str)
    }

    /// Check if a (case-insensitive) header key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.headers.contains_key(&canonical_key(key))
    }

    /// Insert a header, replacing any existing value of the same key.
    ///
    /// # Arguments
    ///
    /// * `key` - Header key
    /// * `value` - Header value, surrounding whitespace is trimmed
    pub fn set(&mut self, key: impl AsRef<str>, value: impl AsRef<str>) {
        self.headers.insert(canonical_key(key.as_ref()), value.as_ref().trim().to_string());
    }

    /// Remove a header and return its value.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.headers.remove(&canonical_key(key))
    }

    /// Append a folded continuation line to the value of `key`.
    pub(crate) fn append_continuation(&mut self, key: &str, value: &str) {
        let value = value.trim();
        match self.headers.get_mut(key) {
            Some(v) if v.is_empty() => v.push_str(value),
            Some(v) if !value.is_empty() => {
                v.push(' ');
                v.push_str(value);
            }
            Some(_) => {}
            None => {
                self.headers.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// Iterator of keys and values in sorted key order.
    pub fn iter(&self) -> Iter<'_> {
        Iter(self.headers.iter())
    }

    /// Iterator of header keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.headers.keys().map(String::as_str)
    }

    /// Iterator of header values.
    pub fn values(&self) -> impl Iterator<Item = &str> + '_ {
        self.headers.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn clear(&mut self) {
        self.headers.clear();
    }

    /// Write header fields into stream.
    ///
    /// Fields are written as `Key: Value\r\n` in sorted key order. Fields with
    /// empty values are omitted. The terminating blank line is not written.
    pub fn write_to<W: io::Write>(&self, writer: &mut W) -> io::Result<usize> {
        let mut bytes_written = 0usize;
        for (key, value) in self.iter().filter(|(_, v)| !v.is_empty()) {
            writer.write_all(key.as_bytes())?;
            writer.write_all(b": ")?;
            writer.write_all(value.as_bytes())?;
            writer.write_all(b"\r\n")?;
            bytes_written += key.len() + value.len() + 4;
        }
        Ok(bytes_written)
    }
}

/// Iterator over the fields of a [`HeaderMap`].
pub struct Iter<'a>(btree_map::Iter<'a, String, String>);

impl<'a> Iterator for Iter<'a> {
    type Item = (&'a str, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.0.size_hint()
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = (&'a str, &'a str);
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = HeaderMap::new();
        iter.into_iter().for_each(|(k, v)| map.set(k, v));
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("warc-record-id", WARC_RECORD_ID)]
    #[case("WARC-DATE", WARC_DATE)]
    #[case("Warc-TYPE", WARC_TYPE)]
    #[case("warc-CONCURRENt-to", WARC_CONCURRENT_TO)]
    #[case("warC-block-digest", WARC_BLOCK_DIGEST)]
    #[case("Warc-payload-Digest", WARC_PAYLOAD_DIGEST)]
    #[case("warc-ip-Address", WARC_IP_ADDRESS)]
    #[case("warc-refers-To", WARC_REFERS_TO)]
    #[case("warc-target-Uri", WARC_TARGET_URI)]
    #[case("warc-truncated", WARC_TRUNCATED)]
    #[case("warc-warcinfo-Id", WARC_WARCINFO_ID)]
    #[case("warc-filename", WARC_FILENAME)]
    #[case("warc-profile", WARC_PROFILE)]
    #[case("warc-identified-payload-Type", WARC_IDENTIFIED_PAYLOAD_TYPE)]
    #[case("warc-segment-Number", WARC_SEGMENT_NUMBER)]
    #[case("warc-segment-origin-Id", WARC_SEGMENT_ORIGIN_ID)]
    #[case("warc-segment-total-Length", WARC_SEGMENT_TOTAL_LENGTH)]
    #[case("CONTENT-LENGTH", CONTENT_LENGTH)]
    #[case("content-type", CONTENT_TYPE)]
    #[case("x-custom-FIELD", "X-Custom-Field")]
    #[case("  software ", "Software")]
    #[case("json-metadata", "Json-Metadata")]
    fn test_canonical_key(#[case] input: &str, #[case] expected: &str) {
        let key = canonical_key(input);
        assert_eq!(key, expected);
        assert_eq!(canonical_key(&key), key);
    }

    #[test]
    fn test_canonical_key_case_insensitive() {
        assert_eq!(canonical_key("warc-record-id"), canonical_key("WARC-RECORD-ID"));
        assert_eq!(canonical_key("Warc-Record-Id"), WARC_RECORD_ID);
        assert_eq!(canonical_key(""), "");
    }

    #[test]
    fn test_header_map() {
        let mut h = HeaderMap::new();
        assert_eq!(h.get(""), None);

        h.set("warc-record-id", "test_id");
        assert_eq!(h.get("WARC-Record-ID"), Some("test_id"));
        assert!(h.contains_key("Warc-Record-Id"));

        h.set("WARC-RECORD-ID", "  other_id ");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("warc-record-id"), Some("other_id"));

        h.set("content-length", "3");
        assert_eq!(h.values().collect::<Vec<_>>(), vec!["3", "other_id"]);

        assert_eq!(h.remove("warc-record-ID"), Some("other_id".to_string()));
        assert_eq!(h.remove(CONTENT_LENGTH), Some("3".to_string()));
        assert!(h.is_empty());
    }

    #[test]
    fn test_header_map_sorted_write() {
        let mut h: HeaderMap = [
            ("warc-type", "response"),
            ("content-length", "5"),
            ("warc-truncated", ""),
            ("x-extra", "yes"),
            ("warc-date", "2000-01-01T00:00:00Z"),
        ]
        .into_iter()
        .collect();
        h.set("WARC-Block-Digest", "");

        let keys: Vec<&str> = h.keys().collect();
        assert_eq!(
            keys,
            vec![CONTENT_LENGTH, WARC_BLOCK_DIGEST, WARC_DATE, WARC_TRUNCATED, WARC_TYPE, "X-Extra"]
        );

        let mut buf = Vec::new();
        let n = h.write_to(&mut buf).unwrap();
        let expected = "Content-Length: 5\r\n\
                        WARC-Date: 2000-01-01T00:00:00Z\r\n\
                        WARC-Type: response\r\n\
                        X-Extra: yes\r\n";
        assert_eq!(String::from_utf8(buf).unwrap(), expected);
        assert_eq!(n, expected.len());
    }

    #[test]
    fn test_append_continuation() {
        let mut h = HeaderMap::new();
        h.set("X-Folded", "first");
        h.append_continuation("X-Folded", "  second ");
        assert_eq!(h.get("x-folded"), Some("first second"));
    }
}
