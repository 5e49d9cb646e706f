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

//! WARC block and payload digests.
//!
//! Digests are labelled Base32 values such as `sha1:OS3OKGCWQIJOAOC3PKXQOQFD52NECQ74`.

use std::io;

use data_encoding::{BASE32, HEXLOWER_PERMISSIVE};
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const SHA1_PREFIX: &str = "sha1:";

/// Compute the labelled SHA-1 digest of `data`.
pub fn sha1_digest(data: impl AsRef<[u8]>) -> String {
    let hash = Sha1::digest(data.as_ref());
    format!("{}{}", SHA1_PREFIX, BASE32.encode(&hash))
}

/// Incremental SHA-1 digester.
///
/// Implements [`io::Write`], so record content can be copied into it.
#[derive(Clone, Default)]
pub struct Digester {
    hasher: Sha1,
}

impl Digester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: impl AsRef<[u8]>) {
        self.hasher.update(data.as_ref());
    }

    /// Consume the digester and return the labelled digest string.
    pub fn finish(self) -> String {
        format!("{}{}", SHA1_PREFIX, BASE32.encode(&self.hasher.finalize()))
    }
}

impl io::Write for Digester {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hasher.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Check whether `digest` matches `data`.
///
/// `sha1` digests are accepted as Base32 (any case) or as hex. A string
/// without an algorithm label never matches.
///
/// # Errors
///
/// [`Error::UnsupportedDigest`] for algorithms other than `sha1`.
pub fn verify_digest(data: impl AsRef<[u8]>, digest: &str) -> Result<bool> {
    let Some((algorithm, value)) = digest.trim().split_once(':') else {
        return Ok(false);
    };
    if !algorithm.eq_ignore_ascii_case("sha1") {
        return Err(Error::UnsupportedDigest(algorithm.to_string()));
    }

    let expected = match value.len() {
        40 => HEXLOWER_PERMISSIVE.decode(value.as_bytes()).ok(),
        _ => BASE32.decode(value.to_ascii_uppercase().as_bytes()).ok(),
    };
    let Some(expected) = expected else {
        return Ok(false);
    };
    Ok(Sha1::digest(data.as_ref()).as_slice() == expected.as_slice())
}
