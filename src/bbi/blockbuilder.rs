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

// Streams a dense per-chromosome value array into data blocks of bounded
// size (spec.md §4.7). Each block is either FixedStep (dense window) or
// BedGraph (sparse window), decided independently per window by the
// `< 50% NaN/zero` heuristic (design note: retained verbatim, a policy and
// not an invariant).

use crate::bbi::block;
use crate::bbi::{BlockType, DataItem};
use crate::codec::Endian;
use crate::error::BbiError;

/* -------------------------------------------------------------------------- */

/// One block produced by the builder, still uncompressed and unplaced; the
/// caller (the writer in `bbi::file`) compresses it if configured to, then
/// appends it to the file and records the resulting offset/size for the
/// R-tree leaf.
pub struct PendingBlock {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub bytes: Vec<u8>,
}

/// Builds data blocks for one chromosome's dense value array.
///
/// `values[i]` covers `[chrom_start + i*bin_size, chrom_start + (i+1)*bin_size)`.
/// NaN marks a missing bin. Windows are `items_per_slot` bins wide; a
/// window with no contributing values is skipped entirely (no empty block
/// is ever written).
pub fn build(
    chrom_id: u32,
    values: &[f32],
    chrom_start: u32,
    bin_size: u32,
    items_per_slot: usize,
) -> Result<Vec<PendingBlock>, BbiError> {
    if bin_size == 0 {
        return Err(BbiError::InvalidArgument("binSize must be >= 1".into()));
    }

    let mut blocks = Vec::new();

    for (window_idx, window) in values.chunks(items_per_slot.max(1)).enumerate() {
        let window_start_bin = window_idx * items_per_slot.max(1);
        let window_base = chrom_start + window_start_bin as u32 * bin_size;

        let missing = window.iter().filter(|v| v.is_nan() || **v == 0.0).count();
        let is_dense = (missing as f64) < 0.5 * window.len() as f64;

        if is_dense {
            if window.iter().all(|v| v.is_nan()) {
                continue;
            }
            let items: Vec<DataItem> = window
                .iter()
                .enumerate()
                .map(|(i, &v)| {
                    let start = window_base + i as u32 * bin_size;
                    DataItem { start, end: start + bin_size, value: v }
                })
                .collect();
            let start = items.first().unwrap().start;
            let end = items.last().unwrap().end;
            let bytes = block::encode(chrom_id, &items, BlockType::FixedStep, bin_size, bin_size, Endian::Little)?;
            blocks.push(PendingBlock { chrom_id, start, end, bytes });
        } else {
            let items: Vec<DataItem> = window
                .iter()
                .enumerate()
                .filter(|(_, &v)| !v.is_nan() && v != 0.0)
                .map(|(i, &v)| {
                    let start = window_base + i as u32 * bin_size;
                    DataItem { start, end: start + bin_size, value: v }
                })
                .collect();
            if items.is_empty() {
                continue;
            }
            let start = items.first().unwrap().start;
            let end = items.last().unwrap().end;
            let bytes = block::encode(chrom_id, &items, BlockType::BedGraph, 0, 0, Endian::Little)?;
            blocks.push(PendingBlock { chrom_id, start, end, bytes });
        }
    }

    Ok(blocks)
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bbi::block as blockcodec;

    #[test]
    fn dense_vector_produces_fixed_step_only() {
        let values: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        let blocks = build(0, &values, 0, 100, 1024).unwrap();
        assert_eq!(blocks.len(), 1);
        let decoded = blockcodec::decode(&blocks[0].bytes, 0, Endian::Little).unwrap();
        assert_eq!(decoded.items.len(), 10);
        assert_eq!(decoded.items[0].value, 1.0);
    }

    #[test]
    fn sparse_vector_produces_single_bed_graph_record() {
        let mut values = vec![f32::NAN; 1000];
        values[500] = 7.0;
        let blocks = build(0, &values, 0, 10, 1024).unwrap();
        assert_eq!(blocks.len(), 1);
        let decoded = blockcodec::decode(&blocks[0].bytes, 0, Endian::Little).unwrap();
        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].start, 5000);
        assert_eq!(decoded.items[0].end, 5010);
        assert_eq!(decoded.items[0].value, 7.0);
    }

    #[test]
    fn all_missing_window_emits_nothing() {
        let values = vec![f32::NAN; 50];
        let blocks = build(0, &values, 0, 10, 1024).unwrap();
        assert!(blocks.is_empty());
    }
}
