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

// On-disk B+-tree mapping a fixed-width chromosome name to (id, length).
// Built bottom-up from a sorted leaf set (spec.md §4.4), kept in memory as
// an arena (`Vec<Node>` + integer indices) rather than parent pointers, per
// the "cyclic references" design note: the structure is built level by
// level and no level ever needs to look upward.

use crate::bbi::CHROM_TREE_MAGIC;
use crate::codec::{self, Endian};
use crate::error::BbiError;
use crate::netfile::ByteSource;

/* -------------------------------------------------------------------------- */

const NODE_HEADER_SIZE: u64 = 4; // isLeaf: u8, reserved: u8, count: u16

#[derive(Clone, Debug)]
pub struct ChromEntry {
    pub name : String,
    pub id   : u32,
    pub size : u32,
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Debug)]
enum Node {
    Leaf(Vec<ChromEntry>),
    Internal { first_keys: Vec<String>, children: Vec<usize> },
}

/// In-memory representation built for writing; also the shape a full
/// in-memory read materializes into (the tree is small enough in practice
/// to keep resident rather than re-walked node by node).
#[derive(Clone, Debug)]
pub struct ChromTree {
    pub key_size: u32,
    pub block_size: u32,
    entries: Vec<ChromEntry>, // sorted by name
    arena: Vec<Node>,
    root: usize,
}

impl ChromTree {
    /// Builds the tree from the full (name, id, size) set, per spec.md
    /// §4.4: `keySize = max(len(name) + 1)`, leaves packed `blockSize` at a
    /// time, repeated one level up until a single root remains.
    pub fn build(mut entries: Vec<ChromEntry>, block_size: u32) -> Result<ChromTree, BbiError> {
        if entries.is_empty() {
            return Err(BbiError::InvalidArgument("cannot build a chromosome tree with no sequences".into()));
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let key_size = entries.iter().map(|e| e.name.len() as u32 + 1).max().unwrap_or(1);

        let mut arena: Vec<Node> = Vec::new();
        let mut level: Vec<usize> = entries
            .chunks(block_size as usize)
            .map(|chunk| {
                arena.push(Node::Leaf(chunk.to_vec()));
                arena.len() - 1
            })
            .collect();

        while level.len() > 1 {
            let mut next_level = Vec::new();
            for chunk in level.chunks(block_size as usize) {
                let first_keys = chunk
                    .iter()
                    .map(|&idx| first_key(&arena, idx))
                    .collect();
                arena.push(Node::Internal { first_keys, children: chunk.to_vec() });
                next_level.push(arena.len() - 1);
            }
            level = next_level;
        }

        let root = level[0];

        Ok(ChromTree { key_size, block_size, entries, arena, root })
    }

    pub fn lookup(&self, name: &str) -> Option<&ChromEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn entries(&self) -> &[ChromEntry] {
        &self.entries
    }

    /// Flattens the tree's node layout into on-disk bytes, returning the
    /// bytes plus the byte offset (relative to the first node) of the root
    /// — needed because the writer reserves the header first and the root
    /// is conventionally placed immediately after it.
    pub fn write_bytes(&self, endian: Endian) -> Result<Vec<u8>, BbiError> {
        let val_size = 8u32; // chromId: u32 + chromSize: u32

        let mut header = Vec::new();
        codec::write_u32(&mut header, CHROM_TREE_MAGIC, endian);
        codec::write_u32(&mut header, self.block_size, endian);
        codec::write_u32(&mut header, self.key_size, endian);
        codec::write_u32(&mut header, val_size, endian);
        codec::write_u64(&mut header, self.entries.len() as u64, endian);
        codec::write_u64(&mut header, 0, endian); // reserved

        // Compute each node's on-disk byte offset (post-order doesn't
        // matter, the tree is written root-first by convention so readers
        // can always start at a known offset).
        let mut offsets = vec![0u64; self.arena.len()];
        let mut cursor = header.len() as u64;
        let order = self.layout_order();
        for &idx in &order {
            offsets[idx] = cursor;
            cursor += self.node_size(idx, val_size);
        }

        let mut body = vec![0u8; (cursor - header.len() as u64) as usize];
        for &idx in &order {
            let local = (offsets[idx] - header.len() as u64) as usize;
            self.write_node(idx, &mut body[local..], &offsets, val_size, endian)?;
        }

        let mut out = header;
        out.extend_from_slice(&body);
        Ok(out)
    }

    // Root-first, breadth-first order so the root always lands right after
    // the fixed header, matching how `read` expects to find it.
    fn layout_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.arena.len());
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(self.root);
        while let Some(idx) = queue.pop_front() {
            order.push(idx);
            if let Node::Internal { children, .. } = &self.arena[idx] {
                for &c in children {
                    queue.push_back(c);
                }
            }
        }
        order
    }

    fn node_size(&self, idx: usize, val_size: u32) -> u64 {
        match &self.arena[idx] {
            Node::Leaf(items) => NODE_HEADER_SIZE + items.len() as u64 * (self.key_size as u64 + val_size as u64),
            Node::Internal { children, .. } => NODE_HEADER_SIZE + children.len() as u64 * (self.key_size as u64 + 8),
        }
    }

    fn write_node(&self, idx: usize, out: &mut [u8], offsets: &[u64], val_size: u32, endian: Endian) -> Result<(), BbiError> {
        match &self.arena[idx] {
            Node::Leaf(items) => {
                out[0] = 1; // isLeaf
                out[1] = 0;
                let mut count_buf = Vec::new();
                codec::write_u16(&mut count_buf, items.len() as u16, endian);
                out[2..4].copy_from_slice(&count_buf);

                let mut pos = 4usize;
                for item in items {
                    let key = codec::write_fixed_name(&item.name, self.key_size as usize)?;
                    out[pos..pos + key.len()].copy_from_slice(&key);
                    pos += key.len();
                    let mut val = Vec::new();
                    codec::write_u32(&mut val, item.id, endian);
                    codec::write_u32(&mut val, item.size, endian);
                    out[pos..pos + val_size as usize].copy_from_slice(&val);
                    pos += val_size as usize;
                }
            }
            Node::Internal { children, .. } => {
                out[0] = 0;
                out[1] = 0;
                let mut count_buf = Vec::new();
                codec::write_u16(&mut count_buf, children.len() as u16, endian);
                out[2..4].copy_from_slice(&count_buf);

                let mut pos = 4usize;
                for &child in children {
                    let key = codec::write_fixed_name(&first_key(&self.arena, child), self.key_size as usize)?;
                    out[pos..pos + key.len()].copy_from_slice(&key);
                    pos += key.len();
                    let mut off_buf = Vec::new();
                    codec::write_u64(&mut off_buf, offsets[child], endian);
                    out[pos..pos + 8].copy_from_slice(&off_buf);
                    pos += 8;
                }
            }
        }
        Ok(())
    }

    /// Reads the whole tree starting at `offset` (immediately after the
    /// header has already been validated by the caller) into memory.
    pub fn read<R: ByteSource>(reader: &mut R, offset: u64, endian: Endian) -> Result<ChromTree, BbiError> {
        let raw = reader.read_at(offset, 32)?;
        let magic = codec::read_u32(&raw[0..4], Endian::Little);
        if magic != CHROM_TREE_MAGIC && magic.swap_bytes() != CHROM_TREE_MAGIC {
            return Err(BbiError::BadMagic(magic));
        }
        let block_size = codec::read_u32(&raw[4..8], endian);
        let key_size   = codec::read_u32(&raw[8..12], endian);
        let val_size   = codec::read_u32(&raw[12..16], endian);
        let item_count = codec::read_u64(&raw[16..24], endian);

        let mut entries = Vec::with_capacity(item_count as usize);
        let root_offset = offset + 32;
        Self::read_node(reader, root_offset, key_size, val_size, endian, &mut entries)?;

        // Rebuild the arena as a single flat leaf level purely to satisfy
        // `write_bytes` if the caller round-trips a read tree; lookups go
        // through `entries` directly and never need the arena.
        let mut arena = Vec::new();
        arena.push(Node::Leaf(entries.clone()));
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(ChromTree { key_size, block_size, entries, arena, root: 0 })
    }

    fn read_node<R: ByteSource>(
        reader: &mut R,
        offset: u64,
        key_size: u32,
        val_size: u32,
        endian: Endian,
        out: &mut Vec<ChromEntry>,
    ) -> Result<(), BbiError> {
        let node_prefix = reader.read_at(offset, 4)?;
        let is_leaf = node_prefix[0] == 1;
        let count = codec::read_u16(&node_prefix[2..4], endian) as usize;

        if is_leaf {
            let entry_size = key_size as u64 + val_size as u64;
            let body = reader.read_at(offset + 4, count * entry_size as usize)?;
            for i in 0..count {
                let base = i * entry_size as usize;
                let name = codec::read_fixed_name(&body[base..base + key_size as usize]);
                let id = codec::read_u32(&body[base + key_size as usize..base + key_size as usize + 4], endian);
                let size = codec::read_u32(&body[base + key_size as usize + 4..base + key_size as usize + 8], endian);
                out.push(ChromEntry { name, id, size });
            }
        } else {
            let entry_size = key_size as u64 + 8;
            let body = reader.read_at(offset + 4, count * entry_size as usize)?;
            for i in 0..count {
                let base = i * entry_size as usize;
                let child_offset = codec::read_u64(&body[base + key_size as usize..base + key_size as usize + 8], endian);
                Self::read_node(reader, child_offset, key_size, val_size, endian, out)?;
            }
        }
        Ok(())
    }
}

fn first_key(arena: &[Node], idx: usize) -> String {
    match &arena[idx] {
        Node::Leaf(items) => items[0].name.clone(),
        Node::Internal { first_keys, .. } => first_keys[0].clone(),
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample() -> Vec<ChromEntry> {
        vec![
            ChromEntry { name: "chr1".into(), id: 0, size: 1000 },
            ChromEntry { name: "chr2".into(), id: 1, size: 2000 },
            ChromEntry { name: "chr10".into(), id: 2, size: 500 },
            ChromEntry { name: "chrX".into(), id: 3, size: 300 },
        ]
    }

    #[test]
    fn build_and_lookup_in_memory() {
        let tree = ChromTree::build(sample(), 2).unwrap();
        assert_eq!(tree.lookup("chr2").unwrap().id, 1);
        assert_eq!(tree.lookup("chr2").unwrap().size, 2000);
        assert!(tree.lookup("chrY").is_none());
    }

    #[test]
    fn roundtrip_through_bytes() {
        let tree = ChromTree::build(sample(), 2).unwrap();
        let mut bytes = tree.write_bytes(Endian::Little).unwrap();
        bytes.insert(0, 0); // one leading byte so offset != 0 is exercised
        let mut cursor = Cursor::new(bytes);
        let restored = ChromTree::read(&mut cursor, 1, Endian::Little).unwrap();

        assert_eq!(restored.entries().len(), 4);
        assert_eq!(restored.lookup("chr10").unwrap().id, 2);
        assert_eq!(restored.lookup("chrX").unwrap().size, 300);
    }

    #[test]
    fn empty_genome_rejected() {
        assert!(ChromTree::build(Vec::new(), 4).is_err());
    }
}
