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

//! Streaming WARC reader.
//!
//! The reader pulls one record at a time from any [`io::Read`] source. Gzip and
//! bzip2 compression are detected from the first two bytes of the source.

use std::io::{self, BufRead, Read};

use tracing::{debug, trace, warn};

use crate::compression::{Compression, Decoder, Peeked};
use crate::digest::sha1_digest;
use crate::error::{Error, Result};
use crate::header::{canonical_key, CONTENT_LENGTH, WARC_BLOCK_DIGEST, WARC_SEGMENT_NUMBER, WARC_TYPE};
use crate::record::{Record, RecordFormat, Records, ANY_RECORD_TYPE};

/// Reader configuration.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Bitmask of record types to return (others will be skipped)
    pub record_types: u16,
    /// Fail on records whose `WARC-Block-Digest` does not match their content
    pub verify_digests: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            record_types: ANY_RECORD_TYPE,
            verify_digests: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanPhase {
    Version,
    HeaderKey,
    HeaderValue,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockLength {
    Known(u64),
    /// Block runs up to the next blank line.
    Unknown,
}

/// WARC record stream reader.
pub struct Reader<R: Read> {
    source: io::BufReader<Decoder<Peeked<R>>>,
    compression: Compression,
    config: ReaderConfig,
    phase: ScanPhase,
    position: u64,
    line: Vec<u8>,
    value: Vec<u8>,
    failed: bool,
}

impl<R: Read> Reader<R> {
    /// Create a new reader with default configuration.
    ///
    /// # Errors
    ///
    /// Fails if the first bytes of `source` cannot be read.
    pub fn new(source: R) -> Result<Self> {
        Self::with_config(source, ReaderConfig::default())
    }

    /// Create a new reader.
    ///
    /// # Arguments
    ///
    /// * `source` - Raw (possibly compressed) input stream
    /// * `config` - Reader configuration
    pub fn with_config(source: R, config: ReaderConfig) -> Result<Self> {
        let (decoder, compression) =
            Decoder::open(source).map_err(|e| Error::io("detect compression", e))?;
        debug!(?compression, "opened WARC reader");
        Ok(Reader {
            source: io::BufReader::new(decoder),
            compression,
            config,
            phase: ScanPhase::Version,
            position: 0,
            line: Vec::new(),
            value: Vec::new(),
            failed: false,
        })
    }

    /// Compression detected on the source.
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Number of decoded bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Read the next record.
    ///
    /// Returns `Ok(None)` at the clean end of the archive. Records not matching
    /// the configured type filter are consumed and skipped.
    pub fn read(&mut self) -> Result<Option<Record>> {
        loop {
            let Some(record) = self.read_record()? else {
                return Ok(None);
            };
            if !record.record_type().matches_bitmask(self.config.record_types) {
                trace!(record_type = %record.record_type(), offset = record.stream_pos(), "skipped record");
                continue;
            }
            if self.config.verify_digests {
                check_block_digest(&record)?;
            }
            return Ok(Some(record));
        }
    }

    /// Consume the entire stream and return all records in file order.
    pub fn read_all(&mut self) -> Result<Records> {
        let mut records = Records::new();
        while let Some(record) = self.read()? {
            records.push(record);
        }
        Ok(records)
    }

    fn read_record(&mut self) -> Result<Option<Record>> {
        self.phase = ScanPhase::Version;
        let mut record = Record::default();
        let mut key = String::new();

        loop {
            match self.phase {
                ScanPhase::Version => {
                    let start = self.position;
                    if self.read_line()? == 0 {
                        return Ok(None);
                    }
                    let line = self.line.trim_ascii();
                    if line.is_empty() {
                        // Remainder of the previous record's separator
                        continue;
                    }
                    let version = String::from_utf8_lossy(line);
                    let format = RecordFormat::parse(&version);
                    if format == RecordFormat::Unknown {
                        return Err(Error::UnknownFormat(version.into_owned()));
                    }
                    record = Record::from_parts(format, start);
                    self.phase = ScanPhase::HeaderKey;
                }
                ScanPhase::HeaderKey => {
                    if self.read_line()? == 0 {
                        return Err(Error::TruncatedHeader);
                    }
                    let line = strip_line_end(&self.line);
                    if line.is_empty() {
                        self.phase = ScanPhase::Content;
                        continue;
                    }
                    if matches!(line[0], b' ' | b'\t') && !key.is_empty() {
                        let folded = String::from_utf8_lossy(line);
                        record.headers_mut().append_continuation(&key, &folded);
                        continue;
                    }
                    let Some(colon) = line.iter().position(|&b| b == b':') else {
                        return Err(Error::MalformedHeader(String::from_utf8_lossy(line).into_owned()));
                    };
                    key = canonical_key(&String::from_utf8_lossy(&line[..colon]));
                    self.value.clear();
                    self.value.extend_from_slice(&line[colon + 1..]);
                    self.phase = ScanPhase::HeaderValue;
                }
                ScanPhase::HeaderValue => {
                    let value = String::from_utf8_lossy(self.value.trim_ascii());
                    if key == WARC_TYPE {
                        record.set_type_from_header(&value);
                    }
                    record.headers_mut().set(&key, value);
                    self.phase = ScanPhase::HeaderKey;
                }
                ScanPhase::Content => {
                    let length = block_length(&record)?;
                    self.read_block(&mut record, length)?;
                    self.phase = ScanPhase::Version;
                    trace!(
                        record_type = %record.record_type(),
                        id = record.id(),
                        offset = record.stream_pos(),
                        length = record.content().len(),
                        "read record"
                    );
                    // Checked only now so the stream stays aligned on the next record
                    record.segment()?;
                    return Ok(Some(record));
                }
            }
        }
    }

    /// Read the next line including its terminator into `self.line`.
    fn read_line(&mut self) -> Result<usize> {
        self.line.clear();
        let n = self
            .source
            .read_until(b'\n', &mut self.line)
            .map_err(|e| Error::io("read record header", e))?;
        self.position += n as u64;
        Ok(n)
    }

    fn read_block(&mut self, record: &mut Record, length: BlockLength) -> Result<()> {
        let content = record.content_mut();
        match length {
            BlockLength::Known(expected) => {
                content.reserve(expected.min(1 << 20) as usize);
                let got = (&mut self.source)
                    .take(expected)
                    .read_to_end(content)
                    .map_err(|e| Error::io("read record content", e))? as u64;
                self.position += got;
                if got < expected {
                    return Err(Error::UnexpectedEndOfContent { expected, got });
                }
                self.skip_separator()
            }
            BlockLength::Unknown => {
                loop {
                    let n = self
                        .source
                        .read_until(b'\n', content)
                        .map_err(|e| Error::io("read record content", e))?;
                    self.position += n as u64;
                    if n == 0 {
                        warn!(offset = self.position, "record block not terminated before end of stream");
                        break;
                    }
                    if content.ends_with(b"\r\n\r\n") {
                        content.truncate(content.len() - 4);
                        break;
                    }
                }
                Ok(())
            }
        }
    }

    /// Consume up to two line terminators following a known-length block.
    fn skip_separator(&mut self) -> Result<()> {
        for _ in 0..2 {
            let buf = self
                .source
                .fill_buf()
                .map_err(|e| Error::io("read record separator", e))?;
            let n = if buf.starts_with(b"\r\n") {
                2
            } else if buf.starts_with(b"\n") {
                1
            } else {
                return Ok(());
            };
            self.source.consume(n);
            self.position += n as u64;
        }
        Ok(())
    }
}

impl<R: Read> Iterator for Reader<R> {
    type Item = Result<Record>;

    /// Next record; iteration stops after the first error.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let next = self.read().transpose();
        if matches!(next, Some(Err(_))) {
            self.failed = true;
        }
        next
    }
}

/// Decide how the content block of `record` is delimited.
fn block_length(record: &Record) -> Result<BlockLength> {
    if record.headers().contains_key(WARC_SEGMENT_NUMBER) {
        return Ok(BlockLength::Unknown);
    }
    match record.headers().get(CONTENT_LENGTH) {
        Some(l) if !l.is_empty() => l
            .parse::<u64>()
            .map(BlockLength::Known)
            .map_err(|_| Error::InvalidField {
                field: CONTENT_LENGTH,
                value: l.to_string(),
            }),
        _ => Ok(BlockLength::Unknown),
    }
}

fn check_block_digest(record: &Record) -> Result<()> {
    match record.verify_block_digest() {
        Ok(Some(false)) => Err(Error::DigestMismatch {
            record_id: record.id().to_string(),
            expected: record.headers().get(WARC_BLOCK_DIGEST).unwrap_or_default().to_string(),
            actual: sha1_digest(record.content()),
        }),
        Err(Error::UnsupportedDigest(algorithm)) => {
            warn!(id = record.id(), %algorithm, "cannot verify block digest");
            Ok(())
        }
        other => other.map(|_| ()),
    }
}

fn strip_line_end(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Read the first record from an in-memory archive.
pub fn from_bytes(data: &[u8]) -> Result<Option<Record>> {
    Reader::new(data)?.read()
}

/// Read all records from an in-memory archive.
pub fn records_from_bytes(data: &[u8]) -> Result<Records> {
    Reader::new(data)?.read_all()
}
