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

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};

use async_stream::stream;
use futures::executor::{block_on_stream, BlockingStream};
use futures_core::stream::Stream;

use crate::bbi::chromtree::ChromEntry;
use crate::bbi::header::BbiHeader;
use crate::bbi::rtree::RTree;
use crate::bbi::{blockbuilder, chromtree, file, zoombuilder, LeafEntry, SummaryRecord, BIGWIG_MAGIC_LE};
use crate::codec::{self, Endian};
use crate::error::BbiError;
use crate::genome::Genome;
use crate::netfile::{ByteSource, NetFile};
use crate::track_statistics::BinSummaryStatistics;
use crate::utility::div_int_up;

/* -------------------------------------------------------------------------- */

/// Cheap magic sniff: reads only the first 4 bytes.
pub fn is_bigwig_file(filename: &str) -> Result<bool, BbiError> {
    let mut file = NetFile::open(filename)?;
    let raw = file.read_at(0, 4)?;
    let magic = codec::read_u32(&raw, Endian::Little);
    Ok(Endian::detect(magic, BIGWIG_MAGIC_LE).is_some())
}

/* -------------------------------------------------------------------------- */

pub enum OptionBigWig {
    BlockSize(usize),
    ItemsPerSlot(usize),
    ReductionLevels(Vec<i32>),
}

#[derive(Clone, Debug)]
pub struct BigWigParameters {
    pub block_size: usize,
    pub items_per_slot: usize,
    pub reduction_levels: Vec<i32>,
}

impl BigWigParameters {
    pub fn insert_option(&mut self, option: OptionBigWig) {
        match option {
            OptionBigWig::BlockSize(x) => self.block_size = x,
            OptionBigWig::ItemsPerSlot(x) => self.items_per_slot = x,
            OptionBigWig::ReductionLevels(x) => self.reduction_levels = x,
        }
    }
}

impl Default for BigWigParameters {
    fn default() -> Self {
        BigWigParameters { block_size: 256, items_per_slot: 1024, reduction_levels: vec![] }
    }
}

/* -------------------------------------------------------------------------- */

#[derive(Clone, Copy, Debug)]
pub struct BigWigSummaryRecord {
    pub chrom_id: u32,
    pub from: u32,
    pub to: u32,
    pub statistics: SummaryRecord,
}

impl fmt::Display for BigWigSummaryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(chrom_id={}, from={}, to={}, valid={}, min={}, max={})",
            self.chrom_id, self.from, self.to, self.statistics.valid, self.statistics.min, self.statistics.max)
    }
}

impl From<file::QueryRecord> for BigWigSummaryRecord {
    fn from(r: file::QueryRecord) -> Self {
        BigWigSummaryRecord {
            chrom_id: r.chrom_id,
            from: r.summary.start,
            to: r.summary.end,
            statistics: r.summary,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BigWigQueryType {
    pub data: BigWigSummaryRecord,
    pub is_zoom: bool,
}

impl From<file::QueryRecord> for BigWigQueryType {
    fn from(r: file::QueryRecord) -> Self {
        BigWigQueryType { is_zoom: r.is_zoom, data: r.into() }
    }
}

impl fmt::Display for BigWigQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(data={}, zoom={})", self.data, self.is_zoom)
    }
}

/* -------------------------------------------------------------------------- */

pub enum BigWigFile {}

impl BigWigFile {
    pub fn new_reader(filename: &str) -> Result<BigWigReader<NetFile>, BbiError> {
        let stream = NetFile::open(filename)?;
        BigWigReader::new(stream)
    }

    pub fn new_writer(filename: &str, genome: Genome, parameters: Vec<OptionBigWig>) -> Result<BigWigWriter<File>, BbiError> {
        let file = File::create(filename)?;
        BigWigWriter::new(file, genome, parameters)
    }
}

/* -------------------------------------------------------------------------- */

pub struct BigWigReader<R: ByteSource> {
    reader: R,
    bwf: file::BbiFile,
    genome: Genome,
}

impl<R: ByteSource> BigWigReader<R> {
    pub fn new(mut reader: R) -> Result<Self, BbiError> {
        let bwf = file::BbiFile::open(&mut reader)?;
        let genome = genome_from_chrom_tree(&bwf.chrom_tree);

        Ok(BigWigReader { reader, bwf, genome })
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }

    pub fn header(&self) -> &BbiHeader {
        &self.bwf.header
    }

    /// Async block iterator: the underlying I/O is synchronous, so each
    /// yield completes immediately, but the `Stream` surface lets callers
    /// compose this with other async machinery without blocking a whole
    /// executor thread on file or socket I/O.
    pub fn query_stream<'a>(
        &'a mut self,
        seq_regex: &'a str,
        from: usize,
        to: usize,
        bin_size: usize,
    ) -> impl Stream<Item = Result<BigWigQueryType, BbiError>> + 'a {
        stream! {
            let re = match regex::Regex::new(&format!("^{}$", seq_regex)) {
                Ok(re) => re,
                Err(e) => {
                    yield Err(BbiError::InvalidArgument(format!("invalid sequence pattern: {}", e)));
                    return;
                }
            };

            let zoom_level = self.bwf.choose_zoom_level(bin_size as u32);

            for seqname in self.genome.seqnames.clone() {
                if !re.is_match(&seqname) {
                    continue;
                }
                let Some(idx) = self.genome.get_idx(&seqname) else { continue };

                let leaves = match self.bwf.search_leaves(idx as u32, from as u32, to as u32, zoom_level) {
                    Ok(leaves) => leaves,
                    Err(e) => { yield Err(e); continue; }
                };

                // Decoded leaf by leaf rather than collected up front, so a
                // malformed block only drops its own records: it is
                // reported to the stream and the walk continues with the
                // next leaf (spec.md §7's "continues ... at the caller's
                // discretion", here exercised by simply not stopping).
                for leaf in &leaves {
                    match self.bwf.decode_leaf(&mut self.reader, leaf, from as u32, to as u32, zoom_level) {
                        Ok(records) => {
                            for r in records {
                                yield Ok(BigWigQueryType::from(r));
                            }
                        }
                        Err(e) => {
                            log::warn!("skipping malformed block for `{}` at offset {}: {}", seqname, leaf.data_offset, e);
                            yield Err(e);
                        }
                    }
                }
            }
        }
    }

    pub fn query<'a>(
        &'a mut self,
        seq_regex: &'a str,
        from: usize,
        to: usize,
        bin_size: usize,
    ) -> BlockingStream<impl Stream<Item = Result<BigWigQueryType, BbiError>> + 'a> {
        let s = Box::pin(self.query_stream(seq_regex, from, to, bin_size));
        block_on_stream(s)
    }

    /// Aggregates retrieved records into a dense array of `binSize`-wide
    /// bins over `[from, to)`, aligned to `from` (spec.md §4.9 step 5).
    /// `bin_overlap` widens the aggregation context for each bin by that
    /// many neighboring bins without changing the bins' own alignment.
    pub fn query_slice(
        &mut self,
        seqname: &str,
        from: usize,
        to: usize,
        f: BinSummaryStatistics,
        bin_size: usize,
        bin_overlap: usize,
        init: f64,
    ) -> Result<(Vec<f64>, usize), BbiError> {
        if bin_size < 1 {
            return Err(BbiError::InvalidArgument("binSize must be >= 1".into()));
        }
        if from >= to {
            return Err(BbiError::InvalidArgument("query requires from < to".into()));
        }

        let id = self.genome.get_idx(seqname).ok_or_else(|| BbiError::NotFound(seqname.to_string()))?;

        let zoom_level = self.bwf.choose_zoom_level(bin_size as u32);
        let records = self.bwf.query(&mut self.reader, id as u32, from as u32, to as u32, zoom_level)?;

        let n_bins = div_int_up(to - from, bin_size);
        let mut bins = vec![SummaryRecord::empty(id as i32, 0, 0); n_bins];

        for rec in &records {
            let clipped_start = rec.summary.start.max(from as u32) as usize;
            let clipped_end = (rec.summary.end as usize).min(to);
            if clipped_end <= clipped_start {
                continue;
            }
            let bin_start = (clipped_start - from) / bin_size;
            let bin_end = div_int_up(clipped_end - from, bin_size);
            for idx in bin_start..bin_end {
                if idx < bins.len() {
                    bins[idx].add(&rec.summary);
                }
            }
        }

        let mut out = vec![init; n_bins];
        for i in 0..n_bins {
            let lo = i.saturating_sub(bin_overlap);
            let hi = (i + bin_overlap).min(n_bins.saturating_sub(1));

            let mut acc = SummaryRecord::empty(id as i32, 0, 0);
            for b in &bins[lo..=hi] {
                if b.valid > 0 {
                    acc.add(b);
                }
            }
            if acc.valid > 0 {
                out[i] = f(acc.sum, acc.sum_squares, acc.min, acc.max, acc.valid as f64);
            }
        }

        Ok((out, bin_size))
    }

    pub fn query_sequence(
        &mut self,
        seqname: &str,
        f: BinSummaryStatistics,
        bin_size: usize,
        bin_overlap: usize,
        init: f64,
    ) -> Result<(Vec<f64>, usize), BbiError> {
        let seqlength = self.genome.seq_length(seqname)?;
        self.query_slice(seqname, 0, seqlength, f, bin_size, bin_overlap, init)
    }
}

fn genome_from_chrom_tree(tree: &chromtree::ChromTree) -> Genome {
    let mut entries: Vec<&ChromEntry> = tree.entries().iter().collect();
    entries.sort_by_key(|e| e.id);

    let mut seqnames = vec![String::new(); entries.len()];
    let mut lengths = vec![0usize; entries.len()];
    for e in entries {
        seqnames[e.id as usize] = e.name.clone();
        lengths[e.id as usize] = e.size as usize;
    }
    Genome::new(seqnames, lengths)
}

/* -------------------------------------------------------------------------- */

/// Streaming writer. Block bytes accumulate in memory as they are built
/// (keyed by chromosome id, in write order) and are only placed on disk at
/// `close`, once the chromosome tree and every R-tree can be built and the
/// header's offsets are all known — the "patched offsets" design: the
/// header is a value kept in memory until the very last seek+write.
pub struct BigWigWriter<W: Write + Seek> {
    writer: W,
    genome: Genome,
    parameters: BigWigParameters,
    header: BbiHeader,
    pending_base: BTreeMap<u32, Vec<blockbuilder::PendingBlock>>,
    pending_zoom: Vec<BTreeMap<u32, Vec<SummaryRecord>>>,
    closed: bool,
}

const MAX_UNCOMPRESSED_BLOCK: u32 = 1 << 16;

impl<W: Write + Seek> BigWigWriter<W> {
    pub fn new(mut writer: W, genome: Genome, parameters_arg: Vec<OptionBigWig>) -> Result<Self, BbiError> {
        let mut parameters = BigWigParameters::default();
        for opt in parameters_arg {
            parameters.insert_option(opt);
        }

        let mut header = BbiHeader::new(parameters.reduction_levels.len(), MAX_UNCOMPRESSED_BLOCK);
        for (i, level) in parameters.reduction_levels.iter().enumerate() {
            header.zoom_headers[i].reduction_level = *level as u32;
        }

        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&vec![0u8; header.total_size() as usize])?;

        let n_zoom = parameters.reduction_levels.len();
        Ok(BigWigWriter {
            writer,
            genome,
            parameters,
            header,
            pending_base: BTreeMap::new(),
            pending_zoom: vec![BTreeMap::new(); n_zoom],
            closed: false,
        })
    }

    pub fn parameters(&self) -> &BigWigParameters {
        &self.parameters
    }

    fn check_open(&self) -> Result<(), BbiError> {
        if self.closed {
            return Err(BbiError::ClosedHandle);
        }
        Ok(())
    }

    pub fn write(&mut self, seqname: &str, sequence: &[f64], bin_size: usize) -> Result<(), BbiError> {
        self.check_open()?;
        let idx = self.genome.get_idx(seqname).ok_or_else(|| BbiError::NotFound(seqname.to_string()))?;

        let values: Vec<f32> = sequence.iter().map(|&v| v as f32).collect();
        let blocks = blockbuilder::build(idx as u32, &values, 0, bin_size as u32, self.parameters.items_per_slot)?;

        for &v in sequence {
            self.header.summary_add_value(v);
        }

        self.pending_base.entry(idx as u32).or_default().extend(blocks);
        Ok(())
    }

    pub fn write_zoom(&mut self, seqname: &str, sequence: &[f64], bin_size: usize, reduction_level_index: usize) -> Result<(), BbiError> {
        self.check_open()?;
        let idx = self.genome.get_idx(seqname).ok_or_else(|| BbiError::NotFound(seqname.to_string()))?;

        let level = *self
            .parameters
            .reduction_levels
            .get(reduction_level_index)
            .ok_or_else(|| BbiError::InvalidArgument(format!("no reduction level at index {}", reduction_level_index)))?;

        let values: Vec<f32> = sequence.iter().map(|&v| v as f32).collect();
        let records = zoombuilder::reduce(idx as u32, &values, 0, bin_size as u32, level as u32);

        self.pending_zoom[reduction_level_index].entry(idx as u32).or_default().extend(records);
        Ok(())
    }

    fn maybe_compress(&self, raw: &[u8]) -> Result<Vec<u8>, BbiError> {
        if self.header.uncompress_buf_size > 0 {
            codec::compress_slice(raw)
        } else {
            Ok(raw.to_vec())
        }
    }

    pub fn close(mut self) -> Result<(), BbiError> {
        self.check_open()?;
        log::debug!(
            "closing bigwig writer: {} sequences, {} zoom levels",
            self.genome.len(), self.header.zoom_headers.len()
        );

        let entries: Vec<ChromEntry> = (0..self.genome.len())
            .map(|id| ChromEntry { name: self.genome.seqnames[id].clone(), id: id as u32, size: self.genome.lengths[id] as u32 })
            .collect();
        let chrom_tree = chromtree::ChromTree::build(entries, self.parameters.block_size as u32)?;
        let chrom_tree_bytes = chrom_tree.write_bytes(self.header.endian)?;

        self.header.chrom_tree_offset = self.header.total_size();
        self.writer.seek(SeekFrom::Start(self.header.chrom_tree_offset))?;
        self.writer.write_all(&chrom_tree_bytes)?;

        self.header.data_offset = self.header.chrom_tree_offset + chrom_tree_bytes.len() as u64;
        self.writer.seek(SeekFrom::Start(self.header.data_offset))?;

        let mut leaves = Vec::new();
        for (_, blocks) in std::mem::take(&mut self.pending_base) {
            for block in blocks {
                let bytes = self.maybe_compress(&block.bytes)?;
                let offset = self.writer.stream_position()?;
                self.writer.write_all(&bytes)?;
                leaves.push(LeafEntry {
                    chrom_id_start: block.chrom_id,
                    base_start: block.start,
                    chrom_id_end: block.chrom_id,
                    base_end: block.end,
                    data_offset: offset,
                    data_size: bytes.len() as u64,
                });
            }
        }
        let end_of_data = self.writer.stream_position()?;

        let index = if leaves.is_empty() {
            RTree::empty(self.parameters.block_size as u32, self.parameters.items_per_slot as u32)
        } else {
            RTree::build(leaves, self.parameters.block_size as u32, self.parameters.items_per_slot as u32)?
        };

        self.header.index_offset = self.writer.stream_position()?;
        self.writer.write_all(&index.write_bytes(end_of_data, self.header.endian))?;

        for i in 0..self.header.zoom_headers.len() {
            self.header.zoom_headers[i].data_offset = self.writer.stream_position()?;

            let mut zoom_leaves = Vec::new();
            for (&chrom_id, records) in &self.pending_zoom[i] {
                for chunk in records.chunks(self.parameters.items_per_slot.max(1)) {
                    if chunk.is_empty() {
                        continue;
                    }
                    let mut raw = Vec::with_capacity(chunk.len() * 32);
                    for rec in chunk {
                        raw.extend_from_slice(&file::encode_zoom_record(rec, chrom_id, self.header.endian));
                    }
                    let bytes = self.maybe_compress(&raw)?;
                    let offset = self.writer.stream_position()?;
                    self.writer.write_all(&bytes)?;

                    zoom_leaves.push(LeafEntry {
                        chrom_id_start: chrom_id,
                        base_start: chunk.first().unwrap().start,
                        chrom_id_end: chrom_id,
                        base_end: chunk.last().unwrap().end,
                        data_offset: offset,
                        data_size: bytes.len() as u64,
                    });
                }
            }
            let zoom_end_of_data = self.writer.stream_position()?;

            let zoom_index = if zoom_leaves.is_empty() {
                RTree::empty(self.parameters.block_size as u32, self.parameters.items_per_slot as u32)
            } else {
                RTree::build(zoom_leaves, self.parameters.block_size as u32, self.parameters.items_per_slot as u32)?
            };

            self.header.zoom_headers[i].index_offset = self.writer.stream_position()?;
            self.writer.write_all(&zoom_index.write_bytes(zoom_end_of_data, self.header.endian))?;
        }

        self.header.total_summary_offset = self.writer.stream_position()?;
        self.writer.write_all(&self.header.write_total_summary_bytes())?;

        log::debug!(
            "patching header: chrom_tree_offset={}, data_offset={}, index_offset={}, total_summary_offset={}",
            self.header.chrom_tree_offset, self.header.data_offset, self.header.index_offset, self.header.total_summary_offset
        );
        self.writer.seek(SeekFrom::Start(0))?;
        self.writer.write_all(&self.header.write_bytes())?;

        self.closed = true;
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn single_chrom_genome() -> Genome {
        Genome::new(vec!["chr1".into()], vec![1000])
    }

    #[test]
    fn roundtrip_minimal_track() {
        let genome = single_chrom_genome();
        let mut buf = Cursor::new(Vec::new());
        {
            let mut writer = BigWigWriter::new(&mut buf, genome.clone(), vec![]).unwrap();
            let values: Vec<f64> = (1..=10).map(|v| v as f64).collect();
            writer.write("chr1", &values, 100).unwrap();
            writer.close().unwrap();
        }

        buf.set_position(0);
        let mut reader = BigWigReader::new(buf).unwrap();
        assert_eq!(reader.genome().len(), 1);
        assert_eq!(reader.genome().seqnames[0], "chr1");

        let mean = crate::track_statistics::bin_summary_statistics_from_string("mean").unwrap();
        let (values, chosen_bin_size) = reader.query_slice("chr1", 0, 1000, mean, 100, 0, f64::NAN).unwrap();
        assert_eq!(chosen_bin_size, 100);
        assert_eq!(values.len(), 10);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(*v, (i + 1) as f64);
        }
    }

    #[test]
    fn not_found_for_unknown_sequence() {
        let genome = single_chrom_genome();
        let mut buf = Cursor::new(Vec::new());
        let mut writer = BigWigWriter::new(&mut buf, genome, vec![]).unwrap();
        writer.write("chr1", &vec![1.0; 10], 100).unwrap();
        writer.close().unwrap();

        buf.set_position(0);
        let mut reader = BigWigReader::new(buf).unwrap();
        let mean = crate::track_statistics::bin_summary_statistics_from_string("mean").unwrap();
        let err = reader.query_slice("chrY", 0, 100, mean, 10, 0, f64::NAN).unwrap_err();
        assert!(matches!(err, BbiError::NotFound(_)));
    }

    #[test]
    fn bad_magic_is_rejected() {
        let buf = Cursor::new(vec![0u8; 64]);
        let err = BigWigReader::new(buf).unwrap_err();
        assert!(matches!(err, BbiError::BadMagic(_)));
    }
}
