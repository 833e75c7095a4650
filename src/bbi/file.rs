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

// Ties header + chromosome tree + R-tree(s) + block codec together into
// the random-access query engine (spec.md §4.9). `crate::bigwig` is the
// public-facing reader/writer; this module holds the zoom-selection and
// block-gathering logic shared by every call shape it exposes.

use crate::bbi::block;
use crate::bbi::chromtree::ChromTree;
use crate::bbi::header::BbiHeader;
use crate::bbi::rtree::RTree;
use crate::bbi::SummaryRecord;
use crate::codec::Endian;
use crate::error::BbiError;
use crate::netfile::ByteSource;

/* -------------------------------------------------------------------------- */

/// A single retrieved record, whichever level it came from. Base-level
/// items are summaries of exactly one valid value (`valid = 1`); zoom
/// records are already multi-value summaries.
#[derive(Clone, Copy, Debug)]
pub struct QueryRecord {
    pub chrom_id: u32,
    pub summary: SummaryRecord,
    pub is_zoom: bool,
}

/* -------------------------------------------------------------------------- */

pub struct BbiFile {
    pub header: BbiHeader,
    pub chrom_tree: ChromTree,
    pub index: RTree,
    pub index_zoom: Vec<RTree>,
}

impl BbiFile {
    pub fn open<R: ByteSource>(reader: &mut R) -> Result<BbiFile, BbiError> {
        let header = BbiHeader::read(reader)?;
        log::debug!(
            "opened bbi file: version={}, endian={:?}, zoom_levels={}",
            header.version, header.endian, header.zoom_headers.len()
        );

        let chrom_tree = ChromTree::read(reader, header.chrom_tree_offset, header.endian)?;
        let index = RTree::read(reader, header.index_offset, header.endian)?;

        let mut index_zoom = Vec::with_capacity(header.zoom_headers.len());
        for zh in &header.zoom_headers {
            index_zoom.push(RTree::read(reader, zh.index_offset, header.endian)?);
        }

        Ok(BbiFile { header, chrom_tree, index, index_zoom })
    }

    /// Picks the largest reduction level `<= bin_size / 2`, else `None`
    /// (the base level). Spec.md §4.9 step 2 and testable property 8.
    pub fn choose_zoom_level(&self, bin_size: u32) -> Option<usize> {
        let threshold = bin_size / 2;
        let chosen = self
            .header
            .zoom_headers
            .iter()
            .enumerate()
            .filter(|(_, zh)| zh.reduction_level <= threshold && zh.reduction_level > 0)
            .max_by_key(|(_, zh)| zh.reduction_level)
            .map(|(idx, _)| idx);
        log::debug!("binSize={} -> zoom level {:?}", bin_size, chosen);
        chosen
    }

    /// Index lookup only, no decode: the leaves intersecting `[start, end)`
    /// on `chrom_id` at the given level, in ascending `(chromIdStart,
    /// baseStart)` order. Used by callers (`query_stream`) that want to
    /// decode one block at a time and tolerate a malformed one without
    /// losing the rest of the range.
    pub fn search_leaves(&self, chrom_id: u32, start: u32, end: u32, zoom_level: Option<usize>) -> Result<Vec<crate::bbi::LeafEntry>, BbiError> {
        if start >= end {
            return Err(BbiError::InvalidArgument("query requires from < to".into()));
        }
        let index = match zoom_level {
            Some(i) => self
                .index_zoom
                .get(i)
                .ok_or_else(|| BbiError::InvalidArgument(format!("no such zoom level {}", i)))?,
            None => &self.index,
        };
        Ok(index.search(chrom_id, start, end))
    }

    /// Decodes one leaf's data block and restricts its items to `[start,
    /// end)`, per spec.md §4.9 step 4.
    pub fn decode_leaf<R: ByteSource>(
        &self,
        reader: &mut R,
        leaf: &crate::bbi::LeafEntry,
        start: u32,
        end: u32,
        zoom_level: Option<usize>,
    ) -> Result<Vec<QueryRecord>, BbiError> {
        let raw = reader.read_at(leaf.data_offset, leaf.data_size as usize)?;
        let mut out = Vec::new();

        if zoom_level.is_some() {
            out.extend(decode_zoom_block(&raw, self.header.uncompress_buf_size, self.header.endian)?);
        } else {
            let decoded = block::decode(&raw, self.header.uncompress_buf_size, self.header.endian)?;
            for item in decoded.items {
                if item.end <= start || item.start >= end {
                    continue;
                }
                let mut summary = SummaryRecord::empty(decoded.chrom_id as i32, item.start, item.end);
                summary.add_value(item.value as f64);
                out.push(QueryRecord { chrom_id: decoded.chrom_id, summary, is_zoom: false });
            }
        }

        out.retain(|r| !(r.summary.end as u32 <= start || r.summary.start as u32 >= end));
        Ok(out)
    }

    /// Enumerates every record intersecting `[start, end)` on `chrom_id`,
    /// at the given zoom level (or the base level if `None`), in ascending
    /// `(chromIdStart, baseStart)` order (RTree invariant).
    pub fn query<R: ByteSource>(
        &self,
        reader: &mut R,
        chrom_id: u32,
        start: u32,
        end: u32,
        zoom_level: Option<usize>,
    ) -> Result<Vec<QueryRecord>, BbiError> {
        let leaves = self.search_leaves(chrom_id, start, end, zoom_level)?;
        let mut out = Vec::new();
        for leaf in &leaves {
            out.extend(self.decode_leaf(reader, leaf, start, end, zoom_level)?);
        }
        Ok(out)
    }
}

/* -------------------------------------------------------------------------- */

// Zoom blocks are plain concatenated 32-byte summary records, with no
// section-header wrapping (spec.md §4.8 / GLOSSARY "Summary record").
fn decode_zoom_block(raw: &[u8], uncompress_buf_size: u32, endian: Endian) -> Result<Vec<QueryRecord>, BbiError> {
    let data = if uncompress_buf_size > 0 {
        crate::codec::uncompress_slice(raw)?
    } else {
        raw.to_vec()
    };

    if data.len() % 32 != 0 {
        return Err(BbiError::MalformedBlock("zoom block length is not a multiple of 32 bytes".into()));
    }

    let mut out = Vec::with_capacity(data.len() / 32);
    for chunk in data.chunks(32) {
        let chrom_id = crate::codec::read_u32(&chunk[0..4], endian);
        let start = crate::codec::read_u32(&chunk[4..8], endian);
        let end = crate::codec::read_u32(&chunk[8..12], endian);
        let valid = crate::codec::read_u32(&chunk[12..16], endian) as u64;
        let min = crate::codec::read_f32(&chunk[16..20], endian) as f64;
        let max = crate::codec::read_f32(&chunk[20..24], endian) as f64;
        let sum = crate::codec::read_f32(&chunk[24..28], endian) as f64;
        let sum_squares = crate::codec::read_f32(&chunk[28..32], endian) as f64;

        out.push(QueryRecord {
            chrom_id,
            summary: SummaryRecord { chrom_id: chrom_id as i32, start, end, valid, min, max, sum, sum_squares },
            is_zoom: true,
        });
    }
    Ok(out)
}

pub fn encode_zoom_record(rec: &SummaryRecord, chrom_id: u32, endian: Endian) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    crate::codec::write_u32(&mut buf, chrom_id, endian);
    crate::codec::write_u32(&mut buf, rec.start, endian);
    crate::codec::write_u32(&mut buf, rec.end, endian);
    crate::codec::write_u32(&mut buf, rec.valid as u32, endian);
    crate::codec::write_f32(&mut buf, rec.min as f32, endian);
    crate::codec::write_f32(&mut buf, rec.max as f32, endian);
    crate::codec::write_f32(&mut buf, rec.sum as f32, endian);
    crate::codec::write_f32(&mut buf, rec.sum_squares as f32, endian);
    buf
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_level_selection_picks_largest_below_half_bin_size() {
        let mut header = BbiHeader::new(0, 0);
        header.zoom_headers = vec![
            crate::bbi::header::ZoomHeader { reduction_level: 10, data_offset: 0, index_offset: 0 },
            crate::bbi::header::ZoomHeader { reduction_level: 100, data_offset: 0, index_offset: 0 },
            crate::bbi::header::ZoomHeader { reduction_level: 1000, data_offset: 0, index_offset: 0 },
        ];
        let file = BbiFile { header, chrom_tree: ChromTree::build(vec![crate::bbi::chromtree::ChromEntry{name:"chr1".into(),id:0,size:1}],1).unwrap(), index: RTree::build(vec![crate::bbi::LeafEntry{chrom_id_start:0,base_start:0,chrom_id_end:0,base_end:1,data_offset:0,data_size:1}],1,1).unwrap(), index_zoom: vec![] };

        assert_eq!(file.choose_zoom_level(400), Some(1)); // 100 <= 200, 1000 > 200
        assert_eq!(file.choose_zoom_level(15), None); // 10 > 7
        assert_eq!(file.choose_zoom_level(20), Some(0)); // 10 <= 10
    }

    #[test]
    fn zoom_record_roundtrip() {
        let mut rec = SummaryRecord::empty(0, 100, 200);
        rec.add_value(3.0);
        rec.add_value(5.0);
        let bytes = encode_zoom_record(&rec, 2, Endian::Little);
        let decoded = decode_zoom_block(&bytes, 0, Endian::Little).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].chrom_id, 2);
        assert_eq!(decoded[0].summary.valid, 2);
        assert!((decoded[0].summary.sum - 8.0).abs() < 1e-6);
    }
}
