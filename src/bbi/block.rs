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

// Encodes/decodes one data block: a 24-byte section header followed by
// items in one of the three encodings (spec.md §4.6, on-disk layout §6).

use crate::bbi::{BlockType, DataItem, SECTION_HEADER_SIZE};
use crate::codec::{self, Endian};
use crate::error::BbiError;

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct SectionHeader {
    pub chrom_id: u32,
    pub start: u32,
    pub end: u32,
    pub item_step: u32,
    pub item_span: u32,
    pub kind: BlockType,
    pub item_count: u16,
}

/* -------------------------------------------------------------------------- */

/// One block's worth of decoded items, ready for aggregation or zoom
/// derivation.
pub struct DecodedBlock {
    pub chrom_id: u32,
    pub items: Vec<DataItem>,
}

/* -------------------------------------------------------------------------- */

/// Encodes up to `itemsPerSlot` records sharing one chromosome id, in the
/// encoding `kind` (chosen by `blockbuilder`). `items` must already be
/// sorted by `start` and, for FixedStep, uniformly spaced at `item_step`
/// with a single `item_span`; for VariableStep, uniform `item_span` only.
pub fn encode(
    chrom_id: u32,
    items: &[DataItem],
    kind: BlockType,
    item_step: u32,
    item_span: u32,
    endian: Endian,
) -> Result<Vec<u8>, BbiError> {
    if items.is_empty() {
        return Err(BbiError::InvalidArgument("cannot encode an empty data block".into()));
    }
    if items.len() > u16::MAX as usize {
        return Err(BbiError::InvalidArgument("data block exceeds 65535 items".into()));
    }

    let start = items.first().unwrap().start;
    let end = items.last().unwrap().end;

    let mut buf = Vec::with_capacity(SECTION_HEADER_SIZE as usize + items.len() * 8);
    codec::write_u32(&mut buf, chrom_id, endian);
    codec::write_u32(&mut buf, start, endian);
    codec::write_u32(&mut buf, end, endian);
    codec::write_u32(&mut buf, item_step, endian);
    codec::write_u32(&mut buf, item_span, endian);
    buf.push(kind.to_u8());
    buf.push(0); // reserved
    codec::write_u16(&mut buf, items.len() as u16, endian);

    match kind {
        BlockType::FixedStep => {
            for item in items {
                codec::write_f32(&mut buf, item.value, endian);
            }
        }
        BlockType::VariableStep => {
            for item in items {
                codec::write_u32(&mut buf, item.start, endian);
                codec::write_f32(&mut buf, item.value, endian);
            }
        }
        BlockType::BedGraph => {
            for item in items {
                codec::write_u32(&mut buf, item.start, endian);
                codec::write_u32(&mut buf, item.end, endian);
                codec::write_f32(&mut buf, item.value, endian);
            }
        }
    }

    Ok(buf)
}

/// Decodes a block, inflating it first if `uncompress_buf_size > 0`.
pub fn decode(raw: &[u8], uncompress_buf_size: u32, endian: Endian) -> Result<DecodedBlock, BbiError> {
    let data = if uncompress_buf_size > 0 {
        codec::uncompress_slice(raw)?
    } else {
        raw.to_vec()
    };

    if data.len() < SECTION_HEADER_SIZE as usize {
        return Err(BbiError::MalformedBlock("block shorter than the 24-byte section header".into()));
    }

    let chrom_id   = codec::read_u32(&data[0..4], endian);
    let start      = codec::read_u32(&data[4..8], endian);
    let _end       = codec::read_u32(&data[8..12], endian);
    let item_step  = codec::read_u32(&data[12..16], endian);
    let item_span  = codec::read_u32(&data[16..20], endian);
    let kind_raw   = data[20];
    let item_count = codec::read_u16(&data[22..24], endian) as usize;

    let kind = BlockType::from_u8(kind_raw)
        .ok_or_else(|| BbiError::Unsupported(format!("unknown data block type {}", kind_raw)))?;

    let body = &data[SECTION_HEADER_SIZE as usize..];
    let mut items = Vec::with_capacity(item_count);

    match kind {
        BlockType::FixedStep => {
            if body.len() < item_count * 4 {
                return Err(BbiError::MalformedBlock("fixedStep block shorter than its declared item count".into()));
            }
            for i in 0..item_count {
                let value = codec::read_f32(&body[i * 4..i * 4 + 4], endian);
                let item_start = start + i as u32 * item_step;
                items.push(DataItem { start: item_start, end: item_start + item_span, value });
            }
        }
        BlockType::VariableStep => {
            if body.len() < item_count * 8 {
                return Err(BbiError::MalformedBlock("variableStep block shorter than its declared item count".into()));
            }
            for i in 0..item_count {
                let base = i * 8;
                let item_start = codec::read_u32(&body[base..base + 4], endian);
                let value = codec::read_f32(&body[base + 4..base + 8], endian);
                items.push(DataItem { start: item_start, end: item_start + item_span, value });
            }
        }
        BlockType::BedGraph => {
            if body.len() < item_count * 12 {
                return Err(BbiError::MalformedBlock("bedGraph block shorter than its declared item count".into()));
            }
            for i in 0..item_count {
                let base = i * 12;
                let item_start = codec::read_u32(&body[base..base + 4], endian);
                let item_end = codec::read_u32(&body[base + 4..base + 8], endian);
                let value = codec::read_f32(&body[base + 8..base + 12], endian);
                items.push(DataItem { start: item_start, end: item_end, value });
            }
        }
    }

    Ok(DecodedBlock { chrom_id, items })
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_step_roundtrip() {
        let items: Vec<DataItem> = (0..5).map(|i| DataItem { start: i * 10, end: i * 10 + 10, value: i as f32 }).collect();
        let encoded = encode(0, &items, BlockType::FixedStep, 10, 10, Endian::Little).unwrap();
        let decoded = decode(&encoded, 0, Endian::Little).unwrap();
        assert_eq!(decoded.chrom_id, 0);
        assert_eq!(decoded.items.len(), 5);
        assert_eq!(decoded.items[2].start, 20);
        assert_eq!(decoded.items[2].value, 2.0);
    }

    #[test]
    fn bed_graph_roundtrip_with_compression() {
        let items = vec![
            DataItem { start: 5000, end: 5010, value: 7.0 },
        ];
        let encoded = encode(3, &items, BlockType::BedGraph, 0, 0, Endian::Little).unwrap();
        let compressed = codec::compress_slice(&encoded).unwrap();
        let decoded = decode(&compressed, 1 << 16, Endian::Little).unwrap();
        assert_eq!(decoded.items.len(), 1);
        assert_eq!(decoded.items[0].start, 5000);
        assert_eq!(decoded.items[0].end, 5010);
        assert_eq!(decoded.items[0].value, 7.0);
    }

    #[test]
    fn unknown_type_is_unsupported() {
        let mut buf = vec![0u8; SECTION_HEADER_SIZE as usize];
        buf[20] = 9;
        let err = decode(&buf, 0, Endian::Little).unwrap_err();
        assert!(matches!(err, BbiError::Unsupported(_)));
    }

    #[test]
    fn truncated_block_is_malformed() {
        let err = decode(&[0u8; 4], 0, Endian::Little).unwrap_err();
        assert!(matches!(err, BbiError::MalformedBlock(_)));
    }
}
