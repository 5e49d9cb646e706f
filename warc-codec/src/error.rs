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

//! Error types for WARC reading, writing and indexing.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// Version line is not a known WARC version.
    #[error("unknown record format: '{0}'")]
    UnknownFormat(String),

    /// A structural field has a value that does not parse.
    #[error("invalid {field} value: '{value}'")]
    InvalidField { field: &'static str, value: String },

    /// A mandatory field is absent.
    #[error("missing mandatory {field} field in {record_type} record")]
    MissingField {
        field: &'static str,
        record_type: &'static str,
    },

    /// Header line without a `:` separator.
    #[error("malformed header line: '{0}'")]
    MalformedHeader(String),

    /// Stream ended inside a record header block.
    #[error("unexpected end of stream in record header")]
    TruncatedHeader,

    /// Stream ended before a known-length content block was complete.
    #[error("unexpected end of record content: got {got} bytes, expected {expected}")]
    UnexpectedEndOfContent { expected: u64, got: u64 },

    /// I/O error of the underlying source or sink.
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: io::Error,
    },

    /// WARC-Target-URI could not be parsed.
    #[error("invalid target URI '{uri}': {source}")]
    InvalidTargetUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// Embedded HTTP message is malformed.
    #[error("malformed HTTP message: {0}")]
    Http(String),

    #[error("unknown CDX field code '{0}'")]
    UnknownCdxField(char),

    #[error("unsupported digest algorithm '{0}'")]
    UnsupportedDigest(String),

    /// Block digest stored in the record does not match its content.
    #[error("block digest mismatch in record {record_id}: expected {expected}, got {actual}")]
    DigestMismatch {
        record_id: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Multi(MultiError),
}

impl Error {
    /// Wrap an I/O error with the name of the failed operation.
    pub fn io(context: &'static str, source: io::Error) -> Self {
        Error::Io { context, source }
    }

    /// Collapse a list of errors into a single error.
    ///
    /// Returns `None` if `errors` is empty, the only error if there is exactly one,
    /// and [`Error::Multi`] otherwise.
    pub fn from_errors(mut errors: Vec<Error>) -> Option<Error> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(Error::Multi(MultiError(errors))),
        }
    }

    /// Whether this error marks a stream that ended in the middle of a record.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Error::TruncatedHeader | Error::UnexpectedEndOfContent { .. })
    }
}

/// Two or more errors that occurred during one operation.
#[derive(Debug)]
pub struct MultiError(Vec<Error>);

impl MultiError {
    /// The individual errors in the order they occurred.
    pub fn errors(&self) -> &[Error] {
        &self.0
    }

    /// The first error that occurred.
    pub fn cause(&self) -> Option<&Error> {
        self.0.first()
    }
}

impl fmt::Display for MultiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some((first, rest)) = self.0.split_first() else {
            return Ok(());
        };
        write!(f, "{}\nand {} other errors:", first, rest.len())?;
        for e in rest {
            write!(f, "\n{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for MultiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.first().map(|e| e as &(dyn std::error::Error + 'static))
    }
}
