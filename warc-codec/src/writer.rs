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

//! WARC writer.
//!
//! Records are written either uncompressed or as one independent gzip member
//! (or bzip2 stream) per record, which keeps compressed archives randomly
//! accessible. If the sink is seekable, the start and end offset of every
//! record in the sink are reported for index construction.

use std::io::{self, Seek, SeekFrom, Write};

use bzip2::write::BzEncoder;
use flate2::write::GzEncoder;
use tracing::{debug, trace};

use crate::compression::Compression;
use crate::error::{Error, Result};
use crate::record::Record;

/// Writer configuration.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Per-record compression
    pub compression: Compression,
    /// Compression level (0-9 for gzip, 1-9 for bzip2)
    pub level: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            compression: Compression::None,
            level: 6,
        }
    }
}

/// Location of a written record in the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordSpan {
    /// Sink offset before the record was written (0 if the sink is not seekable)
    pub start: u64,
    /// Sink offset after the record was written (0 if the sink is not seekable)
    pub end: u64,
    /// Uncompressed record length in bytes
    pub bytes_written: u64,
}

impl RecordSpan {
    /// Number of bytes the record occupies in the sink.
    pub fn compressed_len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

type RecordCallback = Box<dyn FnMut(&Record, &RecordSpan)>;

/// WARC record writer.
pub struct Writer<W: Write> {
    inner: W,
    config: WriterConfig,
    tell: Option<fn(&mut W) -> io::Result<u64>>,
    on_record: Option<RecordCallback>,
    records_written: usize,
}

impl<W: Write> Writer<W> {
    /// Create a writer on a sink that cannot report its position.
    ///
    /// Record spans will have zero offsets.
    pub fn new(inner: W) -> Self {
        Self::with_config(inner, WriterConfig::default())
    }

    pub fn with_config(inner: W, config: WriterConfig) -> Self {
        debug!(compression = ?config.compression, seekable = false, "opened WARC writer");
        Writer {
            inner,
            config,
            tell: None,
            on_record: None,
            records_written: 0,
        }
    }

    /// Register a callback invoked after every record with its span.
    ///
    /// The callback also runs if writing the record failed, before the error is returned.
    pub fn on_record(&mut self, callback: impl FnMut(&Record, &RecordSpan) + 'static) {
        self.on_record = Some(Box::new(callback));
    }

    /// Write a record.
    ///
    /// `Content-Length`, `WARC-Type` and, for response and revisit records,
    /// `WARC-Block-Digest` are updated on `record` before it is serialized.
    ///
    /// # Errors
    ///
    /// If both the write and a position query fail, all failures are returned
    /// as [`Error::Multi`]. A failed write may leave a partial record in the sink.
    pub fn write_record(&mut self, record: &mut Record) -> Result<RecordSpan> {
        let mut errors = Vec::new();
        let mut span = RecordSpan::default();

        if let Some(tell) = self.tell {
            match tell(&mut self.inner) {
                Ok(pos) => span.start = pos,
                Err(e) => errors.push(Error::io("seek record start", e)),
            }
        }

        match self.write_member(record) {
            Ok(n) => span.bytes_written = n as u64,
            Err(e) => errors.push(e),
        }

        if let Some(tell) = self.tell {
            match tell(&mut self.inner) {
                Ok(pos) => span.end = pos,
                Err(e) => errors.push(Error::io("seek record end", e)),
            }
        }

        self.records_written += 1;
        trace!(
            record_type = %record.record_type(),
            id = record.id(),
            start = span.start,
            end = span.end,
            "wrote record"
        );
        if let Some(callback) = self.on_record.as_mut() {
            callback(record, &span);
        }

        match Error::from_errors(errors) {
            Some(e) => Err(e),
            None => Ok(span),
        }
    }

    /// Write all records from an iterator, stopping at the first failure.
    pub fn write_records<'a>(&mut self, records: impl IntoIterator<Item = &'a mut Record>) -> Result<()> {
        for record in records {
            self.write_record(record)?;
        }
        Ok(())
    }

    /// Serialize one record, wrapped in its own compressed member if configured.
    ///
    /// The compressed member is finished, not just flushed, so the sink
    /// position afterwards is a member boundary.
    fn write_member(&mut self, record: &mut Record) -> Result<usize> {
        match self.config.compression {
            Compression::None => record.write_to(&mut self.inner),
            Compression::Gzip => {
                let level = flate2::Compression::new(self.config.level.min(9));
                let mut encoder = GzEncoder::new(&mut self.inner, level);
                let n = record.write_to(&mut encoder)?;
                encoder.finish().map_err(|e| Error::io("finish gzip member", e))?;
                Ok(n)
            }
            Compression::Bzip2 => {
                let level = bzip2::Compression::new(self.config.level.clamp(1, 9));
                let mut encoder = BzEncoder::new(&mut self.inner, level);
                let n = record.write_to(&mut encoder)?;
                encoder.finish().map_err(|e| Error::io("finish bzip2 stream", e))?;
                Ok(n)
            }
        }
    }

    /// Number of records passed to [`Writer::write_record`].
    pub fn records_written(&self) -> usize {
        self.records_written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| Error::io("flush", e))
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Seek> Writer<W> {
    /// Create a writer on a seekable sink, reporting record offsets.
    pub fn seekable(inner: W) -> Self {
        Self::seekable_with_config(inner, WriterConfig::default())
    }

    pub fn seekable_with_config(inner: W, config: WriterConfig) -> Self {
        debug!(compression = ?config.compression, seekable = true, "opened WARC writer");
        Writer {
            inner,
            config,
            tell: Some(stream_position::<W>),
            on_record: None,
            records_written: 0,
        }
    }
}

fn stream_position<S: Seek>(sink: &mut S) -> io::Result<u64> {
    sink.stream_position()
}

/// Seekable adapter counting the bytes written to a plain sink.
///
/// Only `SeekFrom::Current(0)` and `SeekFrom::End(0)` are supported; both
/// return the number of bytes written so far.
#[derive(Debug)]
pub struct CountingWriter<W: Write> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    pub fn new(inner: W) -> Self {
        CountingWriter { inner, count: 0 }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Seek for CountingWriter<W> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Current(0) | SeekFrom::End(0) => Ok(self.count),
            _ => Err(io::Error::new(io::ErrorKind::Unsupported, "unsupported seek operation")),
        }
    }
}
