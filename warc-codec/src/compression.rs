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

//! Stream compression detection and decoding.

use std::io::{self, BufRead, Read};

use bzip2::bufread::MultiBzDecoder;
use flate2::bufread::MultiGzDecoder;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC: [u8; 2] = [0x42, 0x5a];

/// Compression of a WARC stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Bzip2,
}

impl Compression {
    /// Guess the compression from the first two bytes of a stream.
    pub fn detect(magic: &[u8]) -> Self {
        match magic.get(..2) {
            Some(m) if *m == GZIP_MAGIC => Compression::Gzip,
            Some(m) if *m == BZIP2_MAGIC => Compression::Bzip2,
            _ => Compression::None,
        }
    }
}

/// Raw source with its peeked magic bytes put back in front.
pub(crate) type Peeked<R> = io::BufReader<io::Chain<io::Cursor<Vec<u8>>, R>>;

/// Decoded view of a raw byte source.
///
/// Gzip and bzip2 decoders span concatenated members, so archives with one
/// compressed member per record decode as one continuous stream.
pub(crate) enum Decoder<R: BufRead> {
    Plain(R),
    Gzip(MultiGzDecoder<R>),
    Bzip2(MultiBzDecoder<R>),
}

impl<R: Read> Decoder<Peeked<R>> {
    /// Peek at the first two bytes of `source` and wrap it in the matching decoder.
    pub(crate) fn open(mut source: R) -> io::Result<(Self, Compression)> {
        let mut magic = Vec::with_capacity(2);
        (&mut source).take(2).read_to_end(&mut magic)?;
        let compression = Compression::detect(&magic);

        let source = io::BufReader::new(io::Cursor::new(magic).chain(source));
        let decoder = match compression {
            Compression::None => Decoder::Plain(source),
            Compression::Gzip => Decoder::Gzip(MultiGzDecoder::new(source)),
            Compression::Bzip2 => Decoder::Bzip2(MultiBzDecoder::new(source)),
        };
        Ok((decoder, compression))
    }
}

impl<R: BufRead> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Decoder::Plain(r) => r.read(buf),
            Decoder::Gzip(r) => r.read(buf),
            Decoder::Bzip2(r) => r.read(buf),
        }
    }
}
