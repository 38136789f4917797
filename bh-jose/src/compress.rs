// Copyright (C) 2020-2026  The Blockhouse Technology Limited (TBTL).
//
// This program is free software: you can redistribute it and/or modify it
// under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or (at your
// option) any later version.
//
// This program is distributed in the hope that it will be useful, but
// WITHOUT ANY WARRANTY; without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU Affero General Public
// License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! `DEFLATE` compression of JWE plaintexts (`"zip": "DEF"`).

use std::io::{Read as _, Write as _};

use bherror::{
    traits::{ErrorContext as _, ForeignError as _},
    Error,
};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};

use crate::{JoseError, Result};

/// The only `zip` algorithm defined by JWE.
pub(crate) const DEFLATE: &str = "DEF";

/// The largest plaintext, in bytes, a compressed JWE may expand to unless
/// [`DecryptOptions::max_decompressed_size`](crate::DecryptOptions) says
/// otherwise.
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 16 * 1024 * 1024;

/// Compresses `payload` with raw `DEFLATE` (RFC 1951), without the `ZLIB`
/// framing.
pub(crate) fn compress(payload: &[u8]) -> Result<Vec<u8>> {
    compress_deflate(payload).foreign_err(|| JoseError::Compression)
}

/// Reverses [`compress`], failing once the output would exceed `limit`
/// bytes.
pub(crate) fn decompress(payload: &[u8], limit: usize) -> Result<Vec<u8>> {
    decompress_deflate(payload, limit)
        .foreign_err(|| JoseError::Compression)?
        .ok_or_else(|| Error::root(JoseError::Compression))
        .ctx(|| format!("decompressed plaintext exceeds {limit} bytes"))
}

/// Checks the `zip` member, returning whether the plaintext is compressed.
pub(crate) fn is_compressed(zip: Option<&str>) -> Result<bool> {
    match zip {
        None => Ok(false),
        Some(DEFLATE) => Ok(true),
        Some(other) => Err(Error::root(JoseError::InvalidHeader(format!(
            "unsupported `zip` algorithm {other}"
        )))),
    }
}

fn compress_deflate(payload: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut e = DeflateEncoder::new(Vec::new(), Compression::best());
    e.write_all(payload)?;
    e.finish()
}

fn decompress_deflate(payload: &[u8], limit: usize) -> std::io::Result<Option<Vec<u8>>> {
    let max = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    let mut decompressed = Vec::new();
    DeflateDecoder::new(payload)
        .take(max)
        .read_to_end(&mut decompressed)?;
    Ok((decompressed.len() <= limit).then_some(decompressed))
}
