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

use std::fmt;
use std::io;
use std::ops::Deref;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::digest::{sha1_digest, verify_digest};
use crate::error::{Error, Result};
use crate::header::*;

/// Record type bitmask matching every record type.
pub const ANY_RECORD_TYPE: u16 = 0xFFFF;

/// WARC record type enum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordType {
    WarcInfo = 2,
    Response = 4,
    Resource = 8,
    Request = 16,
    Metadata = 32,
    Revisit = 64,
    Conversion = 128,
    Continuation = 256,
    #[default]
    Unknown = 512,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::WarcInfo => "warcinfo",
            RecordType::Response => "response",
            RecordType::Resource => "resource",
            RecordType::Request => "request",
            RecordType::Metadata => "metadata",
            RecordType::Revisit => "revisit",
            RecordType::Conversion => "conversion",
            RecordType::Continuation => "continuation",
            RecordType::Unknown => "unknown",
        }
    }

    pub fn matches_bitmask(&self, bitmask: u16) -> bool {
        (*self as u16) & bitmask != 0
    }
}

impl From<&str> for RecordType {
    fn from(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "warcinfo" => RecordType::WarcInfo,
            "response" => RecordType::Response,
            "resource" => RecordType::Resource,
            "request" => RecordType::Request,
            "metadata" => RecordType::Metadata,
            "revisit" => RecordType::Revisit,
            "conversion" => RecordType::Conversion,
            "continuation" => RecordType::Continuation,
            _ => RecordType::Unknown,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// WARC format version of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordFormat {
    #[default]
    Warc1_0,
    Unknown,
}

impl RecordFormat {
    /// Parse a version line such as `WARC/1.0`.
    pub fn parse(line: &str) -> Self {
        match line.trim() {
            "WARC/1.0" => RecordFormat::Warc1_0,
            _ => RecordFormat::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordFormat::Warc1_0 => "WARC/1.0",
            RecordFormat::Unknown => "",
        }
    }
}

/// Position of a record within a segmented series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1 for the first segment, increasing by one per continuation.
    pub number: u64,
    /// Record ID of the first segment.
    pub origin_id: Option<String>,
    /// Length of all segment blocks together, only set on the last segment.
    pub total_length: Option<u64>,
}

/// Generate a fresh record ID of the form `<urn:uuid:...>`.
pub fn new_record_id() -> String {
    format!("<urn:uuid:{}>", Uuid::new_v4())
}

/// A WARC record.
///
/// A record owns its header block and content. Records created by a
/// [`Reader`](crate::Reader) remember the offset at which they started in
/// the decoded stream.
#[derive(Debug, Clone, Default)]
pub struct Record {
    format: RecordFormat,
    record_type: RecordType,
    headers: HeaderMap,
    content: Vec<u8>,
    stream_pos: u64,
}

impl Record {
    /// Create a new empty WARC record.
    pub fn new(record_type: RecordType) -> Self {
        Record {
            record_type,
            ..Default::default()
        }
    }

    pub(crate) fn from_parts(format: RecordFormat, stream_pos: u64) -> Self {
        Record {
            format,
            stream_pos,
            ..Default::default()
        }
    }

    pub fn format(&self) -> RecordFormat {
        self.format
    }

    /// Record type (same as `headers['WARC-Type']`).
    pub fn record_type(&self) -> RecordType {
        self.record_type
    }

    /// Set record type.
    pub fn set_record_type(&mut self, record_type: RecordType) {
        self.record_type = record_type;
        if record_type != RecordType::Unknown {
            self.headers.set(WARC_TYPE, record_type.as_str());
        }
    }

    /// WARC record headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// WARC record headers (mutable).
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the record content as a byte slice.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Replace the record content and update `Content-Length`.
    pub fn set_content(&mut self, content: impl Into<Vec<u8>>) {
        self.content = content.into();
        self.headers.set(CONTENT_LENGTH, self.content.len().to_string());
    }

    pub fn into_content(self) -> Vec<u8> {
        self.content
    }

    pub(crate) fn content_mut(&mut self) -> &mut Vec<u8> {
        &mut self.content
    }

    pub(crate) fn set_type_from_header(&mut self, value: &str) {
        self.record_type = RecordType::from(value);
    }

    /// WARC record start offset in the decoded stream.
    pub fn stream_pos(&self) -> u64 {
        self.stream_pos
    }

    /// Record ID without the `<urn:uuid:` prefix and `>` suffix.
    pub fn id(&self) -> &str {
        let id = self.headers.get(WARC_RECORD_ID).unwrap_or_default();
        let id = id.strip_prefix("<urn:uuid:").unwrap_or(id);
        id.strip_suffix('>').unwrap_or(id)
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.headers.get(WARC_TARGET_URI)
    }

    /// Capture date, `None` if `WARC-Date` is missing or not an RFC 3339 timestamp.
    pub fn date(&self) -> Option<DateTime<Utc>> {
        let date = self.headers.get(WARC_DATE)?;
        DateTime::parse_from_rfc3339(date).ok().map(|d| d.with_timezone(&Utc))
    }

    /// Value of the `Content-Length` header, 0 if missing or invalid.
    pub fn content_length(&self) -> u64 {
        self.headers
            .get(CONTENT_LENGTH)
            .and_then(|l| l.parse().ok())
            .unwrap_or(0)
    }

    /// Segmentation fields of this record.
    ///
    /// Returns `Ok(None)` for unsegmented records.
    ///
    /// # Errors
    ///
    /// [`Error::MissingField`] for a continuation record without segment number,
    /// [`Error::InvalidField`] if a segment number or total length is not a valid number.
    pub fn segment(&self) -> Result<Option<Segment>> {
        let Some(number) = self.headers.get(WARC_SEGMENT_NUMBER) else {
            if self.record_type == RecordType::Continuation {
                return Err(Error::MissingField {
                    field: WARC_SEGMENT_NUMBER,
                    record_type: self.record_type.as_str(),
                });
            }
            return Ok(None);
        };
        let number = match number.parse::<u64>() {
            Ok(n) if n > 0 => n,
            _ => {
                return Err(Error::InvalidField {
                    field: WARC_SEGMENT_NUMBER,
                    value: number.to_string(),
                })
            }
        };
        let total_length = self
            .headers
            .get(WARC_SEGMENT_TOTAL_LENGTH)
            .map(|l| {
                l.parse::<u64>().map_err(|_| Error::InvalidField {
                    field: WARC_SEGMENT_TOTAL_LENGTH,
                    value: l.to_string(),
                })
            })
            .transpose()?;

        Ok(Some(Segment {
            number,
            origin_id: self.headers.get(WARC_SEGMENT_ORIGIN_ID).map(str::to_string),
            total_length,
        }))
    }

    /// Check the content against the stored `WARC-Block-Digest`.
    ///
    /// Returns `Ok(None)` if the record has no block digest.
    pub fn verify_block_digest(&self) -> Result<Option<bool>> {
        match self.headers.get(WARC_BLOCK_DIGEST) {
            Some(d) if !d.is_empty() => verify_digest(&self.content, d).map(Some),
            _ => Ok(None),
        }
    }

    /// Initialize mandatory headers in a fresh WARC record instance.
    ///
    /// Existing headers are cleared.
    ///
    /// # Arguments
    ///
    /// * `record_type` - WARC-Type
    /// * `record_urn` - WARC-Record-ID as URN without `'<'`, `'>'` (if unset, a random URN will be generated)
    pub fn init_headers(&mut self, record_type: RecordType, record_urn: Option<&str>) {
        let record_id = match record_urn {
            Some(urn) => format!("<{}>", urn),
            None => new_record_id(),
        };

        self.format = RecordFormat::Warc1_0;
        self.headers.clear();
        self.set_record_type(record_type);
        let date = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        self.headers.set(WARC_DATE, date);
        self.headers.set(WARC_RECORD_ID, record_id);
        self.headers.set(CONTENT_LENGTH, self.content.len().to_string());
    }

    /// Serialize the record onto a stream.
    ///
    /// `Content-Length` and `WARC-Type` are derived from the record before
    /// writing. Response and revisit records also get a fresh `WARC-Block-Digest`.
    ///
    /// # Returns
    ///
    /// Number of bytes written
    pub fn write_to<W: io::Write>(&mut self, writer: &mut W) -> Result<usize> {
        self.headers.set(CONTENT_LENGTH, self.content.len().to_string());
        if self.record_type != RecordType::Unknown {
            self.headers.set(WARC_TYPE, self.record_type.as_str());
        }
        if matches!(self.record_type, RecordType::Response | RecordType::Revisit) {
            self.headers.set(WARC_BLOCK_DIGEST, sha1_digest(&self.content));
        }

        let map_err = |e| Error::io("write record", e);
        let mut bytes_written = 0usize;
        writer.write_all(RecordFormat::Warc1_0.as_str().as_bytes()).map_err(map_err)?;
        writer.write_all(b"\r\n").map_err(map_err)?;
        bytes_written += RecordFormat::Warc1_0.as_str().len() + 2;

        bytes_written += self.headers.write_to(writer).map_err(map_err)?;
        writer.write_all(b"\r\n").map_err(map_err)?;
        bytes_written += 2;

        writer.write_all(&self.content).map_err(map_err)?;
        writer.write_all(b"\r\n\r\n").map_err(map_err)?;
        bytes_written += self.content.len() + 4;

        Ok(bytes_written)
    }

    /// Serialize the record into a new buffer.
    pub fn to_bytes(&mut self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.content.len() + 512);
        self.write_to(&mut buf)?;
        Ok(buf)
    }
}

/// An ordered collection of records, as they appear in an archive.
#[derive(Debug, Clone, Default)]
pub struct Records(Vec<Record>);

impl Records {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Record) {
        self.0.push(record);
    }

    /// All records whose type is one of `types`.
    pub fn filter_types(&self, types: &[RecordType]) -> Vec<&Record> {
        self.0
            .iter()
            .filter(|r| types.contains(&r.record_type()))
            .collect()
    }

    /// First record with the given target URI, optionally restricted to `types`.
    ///
    /// An empty `types` slice matches any record type.
    pub fn target_uri_record(&self, uri: &str, types: &[RecordType]) -> Option<&Record> {
        self.0.iter().find(|r| {
            r.target_uri() == Some(uri) && (types.is_empty() || types.contains(&r.record_type()))
        })
    }

    pub fn into_vec(self) -> Vec<Record> {
        self.0
    }
}

impl Deref for Records {
    type Target = [Record];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<Record>> for Records {
    fn from(records: Vec<Record>) -> Self {
        Records(records)
    }
}

impl FromIterator<Record> for Records {
    fn from_iter<I: IntoIterator<Item = Record>>(iter: I) -> Self {
        Records(iter.into_iter().collect())
    }
}

impl IntoIterator for Records {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Records {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
