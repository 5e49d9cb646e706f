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

//! HTTP messages embedded in WARC record blocks.

use encoding::all::WINDOWS_1252;
use encoding::{DecoderTrap, Encoding};

use crate::error::{Error, Result};

/// Status line and header block of an HTTP response stored in a record.
///
/// Header values are kept as raw bytes and decoded as Windows-1252 on access,
/// since HTTP headers are not guaranteed to be UTF-8.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status_line: Vec<u8>,
    status_code: u16,
    headers: Vec<(Vec<u8>, Vec<u8>)>,
    body_offset: usize,
}

impl HttpResponse {
    /// Parse the status line and headers at the start of `block`.
    ///
    /// Both `CRLF` and bare `LF` line endings are accepted. A block without
    /// the blank line ending the headers is accepted as headers only.
    pub fn parse(block: &[u8]) -> Result<Self> {
        let mut lines = Lines { data: block, pos: 0 };

        let status_line = lines
            .next()
            .ok_or_else(|| Error::Http("empty message".to_string()))?
            .to_vec();
        let status_code = parse_status_code(&status_line)?;

        let mut headers: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
        while let Some(line) = lines.next() {
            if line.is_empty() {
                break;
            }
            if matches!(line[0], b' ' | b'\t') {
                if let Some(last) = headers.last_mut() {
                    last.1.push(b' ');
                    last.1.extend_from_slice(line.trim_ascii());
                }
                continue;
            }
            match line.iter().position(|&b| b == b':') {
                Some(i) => headers.push((line[..i].trim_ascii().to_vec(), line[i + 1..].trim_ascii().to_vec())),
                None => {
                    return Err(Error::Http(format!(
                        "malformed header line '{}'",
                        String::from_utf8_lossy(line)
                    )))
                }
            }
        }

        Ok(HttpResponse {
            status_line,
            status_code,
            headers,
            body_offset: lines.pos,
        })
    }

    /// HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// HTTP reason phrase, `None` if the status line has none.
    pub fn reason_phrase(&self) -> Option<String> {
        let mut parts = self.status_line.splitn(3, |&b| b == b' ');
        // Skip HTTP/ and status code
        parts.next()?;
        parts.next()?;
        Some(decode(parts.next()?))
    }

    /// Get value for (case-insensitive) header key.
    /// Duplicate headers are returned as a single value joined with `","`.
    pub fn get(&self, key: &str) -> Option<String> {
        let values: Vec<&[u8]> = self
            .headers
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(key.as_bytes()))
            .map(|(_, v)| v.as_slice())
            .collect();
        if values.is_empty() {
            return None;
        }
        Some(decode(&values.join(&b","[..])))
    }

    /// Plain media type of the `Content-Type` header without parameters such as `charset=`.
    pub fn content_type(&self) -> Option<String> {
        let media_type = self
            .get("Content-Type")?
            .split(';')
            .next()
            .map(|s| s.trim().to_ascii_lowercase())?;
        (!media_type.is_empty()).then_some(media_type)
    }

    /// Offset of the message body within the parsed block.
    pub fn body_offset(&self) -> usize {
        self.body_offset
    }

    /// Message body of `block`, which must be the block this response was parsed from.
    pub fn body<'a>(&self, block: &'a [u8]) -> &'a [u8] {
        &block[self.body_offset.min(block.len())..]
    }
}

fn parse_status_code(status_line: &[u8]) -> Result<u16> {
    if !status_line.starts_with(b"HTTP/") {
        return Err(Error::Http(format!(
            "invalid status line '{}'",
            String::from_utf8_lossy(status_line)
        )));
    }
    let mut parts = status_line.splitn(3, |&b| b == b' ');
    // Skip HTTP/
    parts.next();
    parts
        .next()
        .filter(|c| c.len() == 3)
        .and_then(|c| std::str::from_utf8(c).ok())
        .and_then(|c| c.parse::<u16>().ok())
        .ok_or_else(|| {
            Error::Http(format!(
                "invalid status code in '{}'",
                String::from_utf8_lossy(status_line)
            ))
        })
}

fn decode(byte_str: &[u8]) -> String {
    WINDOWS_1252
        .decode(byte_str, DecoderTrap::Replace)
        .unwrap_or_else(|_| String::from_utf8_lossy(byte_str).into_owned())
}

/// Line iterator that tracks how many bytes have been consumed.
struct Lines<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for Lines<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.data[self.pos..];
        if rest.is_empty() {
            return None;
        }
        let (line, advance) = match rest.iter().position(|&b| b == b'\n') {
            Some(i) => (&rest[..i], i + 1),
            None => (rest, rest.len()),
        };
        self.pos += advance;
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}
