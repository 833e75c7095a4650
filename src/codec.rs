/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

// Shared primitives for the on-disk BBI encoding: endian-aware integer
// read/write, fixed-width zero-padded strings, and zlib framing. Everything
// in the `bbi` module is built on top of these, so that byte order and
// compression policy live in exactly one place.

use std::io::{Read, Write};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::BbiError;

/* -------------------------------------------------------------------------- */

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    // The main header's magic word is stored byte-swapped when the file was
    // written in the other endianness; callers read the raw u32 with both
    // orders and pick whichever matches a known magic value.
    pub fn detect(raw_magic: u32, magic_le: u32) -> Option<Endian> {
        if raw_magic == magic_le {
            Some(Endian::Little)
        } else if raw_magic.swap_bytes() == magic_le {
            Some(Endian::Big)
        } else {
            None
        }
    }
}

/* -------------------------------------------------------------------------- */

pub fn uncompress_slice(data: &[u8]) -> Result<Vec<u8>, BbiError> {
    let mut decoder = ZlibDecoder::new(data);
    let mut buffer = Vec::new();
    decoder
        .read_to_end(&mut buffer)
        .map_err(|e| BbiError::MalformedBlock(format!("zlib decompression failed: {}", e)))?;
    Ok(buffer)
}

pub fn compress_slice(data: &[u8]) -> Result<Vec<u8>, BbiError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    let compressed = encoder.finish()?;
    Ok(compressed)
}

/* -------------------------------------------------------------------------- */

// Reads `u32` either little- or big-endian, chosen at runtime by the header's
// detected byte order. Every multi-byte BBI field is read through this, so
// a single `Endian` value threaded from the main header suffices for the
// whole file.
pub fn read_u16(buf: &[u8], endian: Endian) -> u16 {
    match endian {
        Endian::Little => LittleEndian::read_u16(buf),
        Endian::Big => BigEndian::read_u16(buf),
    }
}

pub fn read_u32(buf: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Little => LittleEndian::read_u32(buf),
        Endian::Big => BigEndian::read_u32(buf),
    }
}

pub fn read_u64(buf: &[u8], endian: Endian) -> u64 {
    match endian {
        Endian::Little => LittleEndian::read_u64(buf),
        Endian::Big => BigEndian::read_u64(buf),
    }
}

pub fn read_f32(buf: &[u8], endian: Endian) -> f32 {
    f32::from_bits(read_u32(buf, endian))
}

pub fn read_f64(buf: &[u8], endian: Endian) -> f64 {
    f64::from_bits(read_u64(buf, endian))
}

pub fn write_u16(buf: &mut Vec<u8>, v: u16, endian: Endian) {
    match endian {
        Endian::Little => buf.write_u16::<LittleEndian>(v).unwrap(),
        Endian::Big => buf.write_u16::<BigEndian>(v).unwrap(),
    }
}

pub fn write_u32(buf: &mut Vec<u8>, v: u32, endian: Endian) {
    match endian {
        Endian::Little => buf.write_u32::<LittleEndian>(v).unwrap(),
        Endian::Big => buf.write_u32::<BigEndian>(v).unwrap(),
    }
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64, endian: Endian) {
    match endian {
        Endian::Little => buf.write_u64::<LittleEndian>(v).unwrap(),
        Endian::Big => buf.write_u64::<BigEndian>(v).unwrap(),
    }
}

pub fn write_f32(buf: &mut Vec<u8>, v: f32, endian: Endian) {
    write_u32(buf, v.to_bits(), endian);
}

pub fn write_f64(buf: &mut Vec<u8>, v: f64, endian: Endian) {
    write_u64(buf, v.to_bits(), endian);
}

/* -------------------------------------------------------------------------- */

// Reads a fixed-width, NUL-padded name field (B+-tree keys are stored this
// way). Trailing NUL bytes are stripped; the field is always `key_size`
// bytes regardless of the name's actual length.
pub fn read_fixed_name(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

pub fn write_fixed_name(name: &str, key_size: usize) -> Result<Vec<u8>, BbiError> {
    let bytes = name.as_bytes();
    if bytes.len() > key_size {
        return Err(BbiError::InvalidArgument(format!(
            "sequence name `{}` ({} bytes) exceeds key size {}",
            name,
            bytes.len(),
            key_size
        )));
    }
    let mut buf = vec![0u8; key_size];
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(buf)
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_compression() {
        let data = b"fixedStep chrom=chr1 start=1 step=1\n".repeat(50);
        let compressed = compress_slice(&data).unwrap();
        assert!(compressed.len() < data.len());
        let restored = uncompress_slice(&compressed).unwrap();
        assert_eq!(restored, data);
    }

    #[test]
    fn endian_detect() {
        let magic_le: u32 = 0x888F_FC26;
        assert_eq!(Endian::detect(magic_le, magic_le), Some(Endian::Little));
        assert_eq!(Endian::detect(magic_le.swap_bytes(), magic_le), Some(Endian::Big));
        assert_eq!(Endian::detect(0xDEAD_BEEF, magic_le), None);
    }

    #[test]
    fn fixed_name_roundtrip() {
        let encoded = write_fixed_name("chr1", 16).unwrap();
        assert_eq!(encoded.len(), 16);
        assert_eq!(read_fixed_name(&encoded), "chr1");
        assert!(write_fixed_name("a_name_far_too_long_for_the_key", 8).is_err());
    }
}
