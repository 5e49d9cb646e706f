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

//! Reading, writing and indexing of WARC (ISO 28500) web archives.
//!
//! ```
//! use warc_codec::{Reader, Record, RecordType, Writer};
//!
//! let mut record = Record::new(RecordType::Resource);
//! record.init_headers(RecordType::Resource, None);
//! record.set_content(&b"Hello World"[..]);
//!
//! let mut writer = Writer::new(Vec::new());
//! writer.write_record(&mut record).unwrap();
//!
//! let data = writer.into_inner();
//! let mut reader = Reader::new(&data[..]).unwrap();
//! let read = reader.read().unwrap().unwrap();
//! assert_eq!(read.content(), b"Hello World");
//! assert_eq!(read.id(), record.id());
//! ```

mod cdx;
mod compression;
mod digest;
mod error;
pub mod header;
mod http;
mod reader;
mod record;
mod writer;

pub use cdx::{massaged_uri, massaged_url, CdxFormat};
pub use compression::Compression;
pub use digest::{sha1_digest, verify_digest, Digester};
pub use error::{Error, MultiError, Result};
pub use header::{canonical_key, HeaderMap};
pub use http::HttpResponse;
pub use reader::{from_bytes, records_from_bytes, Reader, ReaderConfig};
pub use record::{new_record_id, Record, RecordFormat, RecordType, Records, Segment, ANY_RECORD_TYPE};
pub use writer::{CountingWriter, RecordSpan, Writer, WriterConfig};

/// CDX field codes.
pub mod cdx_fields {
    pub use crate::cdx::{
        COMPRESSED_OFFSET, COMPRESSED_SIZE, DATE, DIGEST, FILE_NAME, IP, MASSAGED_URL, META_TAGS, MIME_TYPE,
        ORIGINAL_HOST, ORIGINAL_PATH, ORIGINAL_URL, PORT, REDIRECT, RESPONSE_CODE, UNCOMPRESSED_OFFSET,
        UNCOMPRESSED_SIZE, UUID,
    };
}
