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

// On-disk R-tree spatial index over encoded data blocks (spec.md §4.5).
// Built bottom-up from leaf envelopes already in block-write order; kept
// in memory as an arena (`Vec<Node>` + indices), never parent pointers,
// per the "cyclic references" design note — each level is built strictly
// from the level below it.

use crate::bbi::{overlaps, LeafEntry, RTREE_MAGIC};
use crate::codec::{self, Endian};
use crate::error::BbiError;
use crate::netfile::ByteSource;

/* -------------------------------------------------------------------------- */

const NODE_HEADER_SIZE: u64 = 4;
const LEAF_ITEM_SIZE: u64 = 32; // 4 * u32 envelope + u64 offset + u64 size
const NODE_ITEM_SIZE: u64 = 24; // 4 * u32 envelope + u64 child offset

#[derive(Clone, Debug)]
enum Node {
    Leaf(Vec<LeafEntry>),
    Internal(Vec<usize>),
}

fn envelope(e: &LeafEntry) -> (u32, u32, u32, u32) {
    (e.chrom_id_start, e.base_start, e.chrom_id_end, e.base_end)
}

fn union_envelope(a: (u32, u32, u32, u32), b: (u32, u32, u32, u32)) -> (u32, u32, u32, u32) {
    let start = if (a.0, a.1) <= (b.0, b.1) { (a.0, a.1) } else { (b.0, b.1) };
    let end = if (a.2, a.3) >= (b.2, b.3) { (a.2, a.3) } else { (b.2, b.3) };
    (start.0, start.1, end.0, end.1)
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
pub struct RTree {
    pub block_size: u32,
    pub items_per_slot: u32,
    arena: Vec<Node>,
    node_envelope: Vec<(u32, u32, u32, u32)>,
    root: usize,
    item_count: u64,
}

impl RTree {
    /// Builds the tree from leaves already produced in
    /// `(chromIdStart, baseStart)` order by the block builder.
    pub fn build(leaves: Vec<LeafEntry>, block_size: u32, items_per_slot: u32) -> Result<RTree, BbiError> {
        if leaves.is_empty() {
            return Err(BbiError::InvalidArgument("cannot build an r-tree with no data blocks".into()));
        }

        let item_count = leaves.len() as u64;
        let mut arena: Vec<Node> = Vec::new();
        let mut node_envelope: Vec<(u32, u32, u32, u32)> = Vec::new();

        let mut level: Vec<usize> = leaves
            .chunks(block_size as usize)
            .map(|chunk| {
                let env = chunk
                    .iter()
                    .map(envelope)
                    .reduce(union_envelope)
                    .unwrap();
                arena.push(Node::Leaf(chunk.to_vec()));
                node_envelope.push(env);
                arena.len() - 1
            })
            .collect();

        while level.len() > 1 {
            let mut next_level = Vec::new();
            for chunk in level.chunks(block_size as usize) {
                let env = chunk
                    .iter()
                    .map(|&idx| node_envelope[idx])
                    .reduce(union_envelope)
                    .unwrap();
                arena.push(Node::Internal(chunk.to_vec()));
                node_envelope.push(env);
                next_level.push(arena.len() - 1);
            }
            level = next_level;
        }

        let root = level[0];

        Ok(RTree { block_size, items_per_slot, arena, node_envelope, root, item_count })
    }

    /// A valid, empty tree: used by the writer when a chromosome or zoom
    /// level produced no data blocks at all, so `close` still has
    /// something well-formed to write instead of special-casing "no
    /// index" in the header.
    pub fn empty(block_size: u32, items_per_slot: u32) -> RTree {
        let arena = vec![Node::Leaf(Vec::new())];
        RTree { block_size, items_per_slot, arena, node_envelope: vec![(0, 0, 0, 0)], root: 0, item_count: 0 }
    }

    pub fn whole_file_envelope(&self) -> (u32, u32, u32, u32) {
        self.node_envelope[self.root]
    }

    /// Depth-first range search; descends only children whose envelope
    /// overlaps the query, and always visits children left to right, so
    /// results come back in ascending `(chromIdStart, baseStart)` order
    /// (spec.md invariant 4.5b / testable property 5).
    pub fn search(&self, chrom_id: u32, start: u32, end: u32) -> Vec<LeafEntry> {
        let mut out = Vec::new();
        self.search_node(self.root, chrom_id, start, end, &mut out);
        out
    }

    fn search_node(&self, idx: usize, chrom_id: u32, start: u32, end: u32, out: &mut Vec<LeafEntry>) {
        if !overlaps(chrom_id, start, end, self.node_envelope[idx].0, self.node_envelope[idx].1, self.node_envelope[idx].2, self.node_envelope[idx].3) {
            return;
        }
        match &self.arena[idx] {
            Node::Leaf(items) => {
                for item in items {
                    if item.overlaps(chrom_id, start, end) {
                        out.push(*item);
                    }
                }
            }
            Node::Internal(children) => {
                for &child in children {
                    self.search_node(child, chrom_id, start, end, out);
                }
            }
        }
    }

    fn layout_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.root);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            if let Node::Internal(children) = &self.arena[idx] {
                for &c in children {
                    queue.push_back(c);
                }
            }
        }
        order
    }

    fn node_size(&self, idx: usize) -> u64 {
        match &self.arena[idx] {
            Node::Leaf(items) => NODE_HEADER_SIZE + items.len() as u64 * LEAF_ITEM_SIZE,
            Node::Internal(children) => NODE_HEADER_SIZE + children.len() as u64 * NODE_ITEM_SIZE,
        }
    }

    pub fn write_bytes(&self, end_of_data: u64, endian: Endian) -> Vec<u8> {
        let env = self.whole_file_envelope();

        let mut header = Vec::new();
        codec::write_u32(&mut header, RTREE_MAGIC, endian);
        codec::write_u32(&mut header, self.block_size, endian);
        codec::write_u64(&mut header, self.item_count, endian);
        codec::write_u32(&mut header, env.0, endian);
        codec::write_u32(&mut header, env.1, endian);
        codec::write_u32(&mut header, env.2, endian);
        codec::write_u32(&mut header, env.3, endian);
        codec::write_u64(&mut header, end_of_data, endian);
        codec::write_u32(&mut header, self.items_per_slot, endian);
        codec::write_u32(&mut header, 0, endian); // reserved

        let order = self.layout_order();
        let mut offsets = vec![0u64; self.arena.len()];
        let mut cursor = header.len() as u64;
        for &idx in &order {
            offsets[idx] = cursor;
            cursor += self.node_size(idx);
        }

        let mut body = vec![0u8; (cursor - header.len() as u64) as usize];
        for &idx in &order {
            let local = (offsets[idx] - header.len() as u64) as usize;
            self.write_node(idx, &mut body[local..], &offsets, endian);
        }

        let mut out = header;
        out.extend_from_slice(&body);
        out
    }

    fn write_node(&self, idx: usize, out: &mut [u8], offsets: &[u64], endian: Endian) {
        match &self.arena[idx] {
            Node::Leaf(items) => {
                out[0] = 1;
                out[1] = 0;
                let mut count_buf = Vec::new();
                codec::write_u16(&mut count_buf, items.len() as u16, endian);
                out[2..4].copy_from_slice(&count_buf);

                let mut pos = 4usize;
                for item in items {
                    let mut rec = Vec::new();
                    codec::write_u32(&mut rec, item.chrom_id_start, endian);
                    codec::write_u32(&mut rec, item.base_start, endian);
                    codec::write_u32(&mut rec, item.chrom_id_end, endian);
                    codec::write_u32(&mut rec, item.base_end, endian);
                    codec::write_u64(&mut rec, item.data_offset, endian);
                    codec::write_u64(&mut rec, item.data_size, endian);
                    out[pos..pos + LEAF_ITEM_SIZE as usize].copy_from_slice(&rec);
                    pos += LEAF_ITEM_SIZE as usize;
                }
            }
            Node::Internal(children) => {
                out[0] = 0;
                out[1] = 0;
                let mut count_buf = Vec::new();
                codec::write_u16(&mut count_buf, children.len() as u16, endian);
                out[2..4].copy_from_slice(&count_buf);

                let mut pos = 4usize;
                for &child in children {
                    let env = self.node_envelope[child];
                    let mut rec = Vec::new();
                    codec::write_u32(&mut rec, env.0, endian);
                    codec::write_u32(&mut rec, env.1, endian);
                    codec::write_u32(&mut rec, env.2, endian);
                    codec::write_u32(&mut rec, env.3, endian);
                    codec::write_u64(&mut rec, offsets[child], endian);
                    out[pos..pos + NODE_ITEM_SIZE as usize].copy_from_slice(&rec);
                    pos += NODE_ITEM_SIZE as usize;
                }
            }
        }
    }

    pub fn read<R: ByteSource>(reader: &mut R, offset: u64, endian: Endian) -> Result<RTree, BbiError> {
        let raw = reader.read_at(offset, 48)?;
        let magic = codec::read_u32(&raw[0..4], Endian::Little);
        if magic != RTREE_MAGIC && magic.swap_bytes() != RTREE_MAGIC {
            return Err(BbiError::BadMagic(magic));
        }
        let block_size = codec::read_u32(&raw[4..8], endian);
        let item_count = codec::read_u64(&raw[8..16], endian);
        let items_per_slot = codec::read_u32(&raw[40..44], endian);

        // `RTree::empty` is a legitimate on-disk tree (no data blocks for
        // this chromosome / zoom level); `build` rejects an empty leaf set
        // because that invariant only makes sense when constructing a fresh
        // tree from writer output, so every writer-emitted empty tree must
        // still round-trip through `read`.
        if item_count == 0 {
            return Ok(RTree::empty(block_size, items_per_slot));
        }

        let mut leaves = Vec::with_capacity(item_count as usize);
        Self::read_node(reader, offset + 48, endian, &mut leaves)?;

        RTree::build(leaves, block_size, items_per_slot)
    }

    fn read_node<R: ByteSource>(reader: &mut R, offset: u64, endian: Endian, out: &mut Vec<LeafEntry>) -> Result<(), BbiError> {
        let prefix = reader.read_at(offset, 4)?;
        let is_leaf = prefix[0] == 1;
        let count = codec::read_u16(&prefix[2..4], endian) as usize;

        if is_leaf {
            let body = reader.read_at(offset + 4, count * LEAF_ITEM_SIZE as usize)?;
            for i in 0..count {
                let base = i * LEAF_ITEM_SIZE as usize;
                out.push(LeafEntry {
                    chrom_id_start: codec::read_u32(&body[base..base + 4], endian),
                    base_start: codec::read_u32(&body[base + 4..base + 8], endian),
                    chrom_id_end: codec::read_u32(&body[base + 8..base + 12], endian),
                    base_end: codec::read_u32(&body[base + 12..base + 16], endian),
                    data_offset: codec::read_u64(&body[base + 16..base + 24], endian),
                    data_size: codec::read_u64(&body[base + 24..base + 32], endian),
                });
            }
        } else {
            let body = reader.read_at(offset + 4, count * NODE_ITEM_SIZE as usize)?;
            for i in 0..count {
                let base = i * NODE_ITEM_SIZE as usize;
                let child_offset = codec::read_u64(&body[base + 16..base + 24], endian);
                Self::read_node(reader, child_offset, endian, out)?;
            }
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_leaves() -> Vec<LeafEntry> {
        (0..10)
            .map(|i| LeafEntry {
                chrom_id_start: 0,
                base_start: i * 100,
                chrom_id_end: 0,
                base_end: i * 100 + 100,
                data_offset: 1000 + i as u64 * 50,
                data_size: 50,
            })
            .collect()
    }

    #[test]
    fn search_returns_overlapping_in_order() {
        let tree = RTree::build(sample_leaves(), 4, 64).unwrap();
        let hits = tree.search(0, 250, 450);
        // blocks [200,300) [300,400) [400,500) overlap [250,450)
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].base_start, 200);
        assert_eq!(hits[1].base_start, 300);
        assert_eq!(hits[2].base_start, 400);
    }

    #[test]
    fn search_ascending_order_across_chromosomes() {
        let mut leaves = sample_leaves();
        leaves.push(LeafEntry { chrom_id_start: 1, base_start: 0, chrom_id_end: 1, base_end: 50, data_offset: 99999, data_size: 10 });
        let tree = RTree::build(leaves, 3, 64).unwrap();
        let hits = tree.search(1, 0, 50);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chrom_id_start, 1);
    }

    #[test]
    fn roundtrip_through_bytes() {
        let tree = RTree::build(sample_leaves(), 4, 64).unwrap();
        let mut bytes = tree.write_bytes(2000, Endian::Little);
        bytes.insert(0, 0);
        let mut cursor = Cursor::new(bytes);
        let restored = RTree::read(&mut cursor, 1, Endian::Little).unwrap();
        let hits = restored.search(0, 250, 450);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn empty_leaves_rejected() {
        assert!(RTree::build(Vec::new(), 4, 64).is_err());
    }

    #[test]
    fn empty_tree_roundtrips_through_bytes() {
        let tree = RTree::empty(4, 64);
        let mut bytes = tree.write_bytes(0, Endian::Little);
        bytes.insert(0, 0);
        let mut cursor = Cursor::new(bytes);
        let restored = RTree::read(&mut cursor, 1, Endian::Little).unwrap();
        assert!(restored.search(0, 0, u32::MAX).is_empty());
    }
}
