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

use crate::bbi::{SummaryRecord, BBI_HEADER_SIZE, BIGWIG_MAGIC_LE, TOTAL_SUMMARY_SIZE, ZOOM_HEADER_SIZE};
use crate::codec::{self, Endian};
use crate::error::BbiError;
use crate::netfile::ByteSource;

/* -------------------------------------------------------------------------- */

pub const BBI_VERSION: u16 = 4;

#[derive(Clone, Copy, Debug)]
pub struct ZoomHeader {
    pub reduction_level: u32,
    pub data_offset    : u64,
    pub index_offset   : u64,
}

/* -------------------------------------------------------------------------- */

/// The fixed 64-byte main header plus its zoom-header array and total
/// summary block. Values are zero / placeholder until `patch` rewrites them
/// at close, per the "patched offsets" design note: callers reserve the
/// byte range up front, keep this as an in-memory value, and overwrite the
/// reserved range once every downstream offset is known.
#[derive(Clone, Debug)]
pub struct BbiHeader {
    pub endian             : Endian,
    pub version             : u16,
    pub zoom_headers        : Vec<ZoomHeader>,
    pub chrom_tree_offset   : u64,
    pub data_offset         : u64,
    pub index_offset        : u64,
    pub field_count         : u16,
    pub defined_field_count : u16,
    pub auto_sql_offset     : u64,
    pub total_summary_offset: u64,
    pub uncompress_buf_size : u32,
    pub extension_offset    : u64,
    pub summary             : SummaryRecord,
}

impl BbiHeader {
    pub fn new(n_zoom_levels: usize, uncompress_buf_size: u32) -> Self {
        BbiHeader {
            endian: Endian::Little,
            version: BBI_VERSION,
            zoom_headers: vec![ZoomHeader { reduction_level: 0, data_offset: 0, index_offset: 0 }; n_zoom_levels],
            chrom_tree_offset: 0,
            data_offset: 0,
            index_offset: 0,
            field_count: 0,
            defined_field_count: 0,
            auto_sql_offset: 0,
            total_summary_offset: 0,
            uncompress_buf_size,
            extension_offset: 0,
            summary: SummaryRecord::empty(-1, 0, 0),
        }
    }

    pub fn total_size(&self) -> u64 {
        BBI_HEADER_SIZE + self.zoom_headers.len() as u64 * ZOOM_HEADER_SIZE
    }

    /// Accumulates one more contributing value into the running
    /// total-summary statistics. Called by the writer on every value it
    /// emits, so the total summary is complete without a second pass.
    pub fn summary_add_value(&mut self, x: f64) {
        self.summary.add_value(x);
    }

    pub fn read<R: ByteSource>(reader: &mut R) -> Result<BbiHeader, BbiError> {
        let raw = reader.read_at(0, BBI_HEADER_SIZE as usize)?;
        let raw_magic = codec::read_u32(&raw[0..4], Endian::Little);
        let endian = Endian::detect(raw_magic, BIGWIG_MAGIC_LE)
            .ok_or(BbiError::BadMagic(raw_magic))?;

        let version             = codec::read_u16(&raw[4..6], endian);
        let n_zoom_levels        = codec::read_u16(&raw[6..8], endian) as usize;
        let chrom_tree_offset    = codec::read_u64(&raw[8..16], endian);
        let data_offset          = codec::read_u64(&raw[16..24], endian);
        let index_offset         = codec::read_u64(&raw[24..32], endian);
        let field_count          = codec::read_u16(&raw[32..34], endian);
        let defined_field_count  = codec::read_u16(&raw[34..36], endian);
        let auto_sql_offset      = codec::read_u64(&raw[36..44], endian);
        let total_summary_offset = codec::read_u64(&raw[44..52], endian);
        let uncompress_buf_size  = codec::read_u32(&raw[52..56], endian);
        let extension_offset     = codec::read_u64(&raw[56..64], endian);

        if version < 3 {
            return Err(BbiError::Unsupported(format!("BBI header version {} is too old", version)));
        }

        let mut zoom_headers = Vec::with_capacity(n_zoom_levels);
        if n_zoom_levels > 0 {
            let raw_zooms = reader.read_at(BBI_HEADER_SIZE, n_zoom_levels * ZOOM_HEADER_SIZE as usize)?;
            for i in 0..n_zoom_levels {
                let base = i * ZOOM_HEADER_SIZE as usize;
                zoom_headers.push(ZoomHeader {
                    reduction_level: codec::read_u32(&raw_zooms[base..base + 4], endian),
                    data_offset: codec::read_u64(&raw_zooms[base + 8..base + 16], endian),
                    index_offset: codec::read_u64(&raw_zooms[base + 16..base + 24], endian),
                });
            }
        }

        let summary = if total_summary_offset != 0 {
            let raw = reader.read_at(total_summary_offset, TOTAL_SUMMARY_SIZE as usize)?;
            SummaryRecord {
                chrom_id: -1,
                start: 0,
                end: 0,
                valid: codec::read_u64(&raw[0..8], endian),
                min: codec::read_f64(&raw[8..16], endian),
                max: codec::read_f64(&raw[16..24], endian),
                sum: codec::read_f64(&raw[24..32], endian),
                sum_squares: codec::read_f64(&raw[32..40], endian),
            }
        } else {
            SummaryRecord::empty(-1, 0, 0)
        };

        Ok(BbiHeader {
            endian,
            version,
            zoom_headers,
            chrom_tree_offset,
            data_offset,
            index_offset,
            field_count,
            defined_field_count,
            auto_sql_offset,
            total_summary_offset,
            uncompress_buf_size,
            extension_offset,
            summary,
        })
    }

    /// Serializes the fixed prefix + zoom headers. `total_summary_offset`
    /// must already point at a reserved 40-byte region, written separately
    /// via `write_total_summary`.
    pub fn write_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.total_size() as usize);

        codec::write_u32(&mut buf, BIGWIG_MAGIC_LE, self.endian);
        codec::write_u16(&mut buf, self.version, self.endian);
        codec::write_u16(&mut buf, self.zoom_headers.len() as u16, self.endian);
        codec::write_u64(&mut buf, self.chrom_tree_offset, self.endian);
        codec::write_u64(&mut buf, self.data_offset, self.endian);
        codec::write_u64(&mut buf, self.index_offset, self.endian);
        codec::write_u16(&mut buf, self.field_count, self.endian);
        codec::write_u16(&mut buf, self.defined_field_count, self.endian);
        codec::write_u64(&mut buf, self.auto_sql_offset, self.endian);
        codec::write_u64(&mut buf, self.total_summary_offset, self.endian);
        codec::write_u32(&mut buf, self.uncompress_buf_size, self.endian);
        codec::write_u64(&mut buf, self.extension_offset, self.endian);

        for zh in &self.zoom_headers {
            codec::write_u32(&mut buf, zh.reduction_level, self.endian);
            codec::write_u32(&mut buf, 0, self.endian); // reserved
            codec::write_u64(&mut buf, zh.data_offset, self.endian);
            codec::write_u64(&mut buf, zh.index_offset, self.endian);
        }

        buf
    }

    pub fn write_total_summary_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(TOTAL_SUMMARY_SIZE as usize);
        let s = &self.summary;
        codec::write_u64(&mut buf, s.valid, self.endian);
        codec::write_f64(&mut buf, if s.valid == 0 { 0.0 } else { s.min }, self.endian);
        codec::write_f64(&mut buf, if s.valid == 0 { 0.0 } else { s.max }, self.endian);
        codec::write_f64(&mut buf, s.sum, self.endian);
        codec::write_f64(&mut buf, s.sum_squares, self.endian);
        buf
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_header() {
        let mut header = BbiHeader::new(1, 0);
        header.zoom_headers[0] = ZoomHeader { reduction_level: 400, data_offset: 1000, index_offset: 2000 };
        header.chrom_tree_offset = 64 + 24;
        header.data_offset = 500;
        header.index_offset = 900;
        header.total_summary_offset = 9999;
        header.summary.add_value(3.0);
        header.summary.add_value(5.0);

        let mut bytes = header.write_bytes();
        // pad so total_summary_offset (9999) is reachable
        bytes.resize(10000 + 40, 0);
        let summary_bytes = header.write_total_summary_bytes();
        bytes[9999..9999 + 40].copy_from_slice(&summary_bytes);

        let mut cursor = Cursor::new(bytes);
        let restored = BbiHeader::read(&mut cursor).unwrap();

        assert_eq!(restored.version, BBI_VERSION);
        assert_eq!(restored.zoom_headers.len(), 1);
        assert_eq!(restored.zoom_headers[0].reduction_level, 400);
        assert_eq!(restored.chrom_tree_offset, 64 + 24);
        assert_eq!(restored.summary.valid, 2);
        assert!((restored.summary.sum - 8.0).abs() < 1e-9);
    }

    #[test]
    fn bad_magic_rejected() {
        let bytes = vec![0u8; 64];
        let mut cursor = Cursor::new(bytes);
        let err = BbiHeader::read(&mut cursor).unwrap_err();
        assert!(matches!(err, BbiError::BadMagic(_)));
    }
}
