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

use std::collections::HashMap;

use crate::bigwig::{BigWigFile, BigWigReader, OptionBigWig};
use crate::error::BbiError;
use crate::genome::Genome;
use crate::netfile::ByteSource;
use crate::track::{Track, TrackSequence};
use crate::track_statistics::BinSummaryStatistics;

/* -------------------------------------------------------------------------- */

pub type TMapType = HashMap<String, Vec<f64>>;

/* -------------------------------------------------------------------------- */

// A track is a container for experimental data mapped to genomic
// locations. The data is binned in order to reduce memory usage.
// The first position in a sequence is numbered 0.

pub struct SimpleTrack {
    name: String,
    genome: Genome,
    data: TMapType,
    bin_size: usize,
}

/* -------------------------------------------------------------------------- */

impl SimpleTrack {
    pub fn new(name: String, sequences: Vec<Vec<f64>>, genome: Genome, bin_size: usize) -> Result<Self, BbiError> {
        if sequences.len() != genome.len() {
            return Err(BbiError::InvalidArgument("number of sequences does not match genome length".into()));
        }
        if bin_size == 0 {
            return Err(BbiError::InvalidArgument("binSize must be >= 1".into()));
        }
        let mut data: TMapType = HashMap::new();
        for (i, sequence) in sequences.into_iter().enumerate() {
            if sequence.len() != genome.lengths[i] / bin_size {
                return Err(BbiError::InvalidArgument(format!(
                    "genome has invalid length for sequence `{}` given binSize {}",
                    genome.seqnames[i], bin_size
                )));
            }
            data.insert(genome.seqnames[i].clone(), sequence);
        }
        Ok(SimpleTrack { name, genome, data, bin_size })
    }

    pub fn alloc(name: String, genome: Genome, bin_size: usize) -> Self {
        let mut data: TMapType = HashMap::new();

        for i in 0..genome.len() {
            // By convention, drop the last positions if they do not fully
            // cover the last bin (round down).
            data.insert(genome.seqnames[i].clone(), vec![0.0; genome.lengths[i] / bin_size]);
        }
        SimpleTrack { name, genome, data, bin_size }
    }

    pub fn empty(name: String) -> Self {
        SimpleTrack { name, genome: Genome::default(), data: HashMap::new(), bin_size: 0 }
    }

    pub fn index(&self, position: usize) -> usize {
        position / self.bin_size
    }

    /// Loads every chromosome from a BigWig file into bins of `bin_size`.
    pub fn import_bigwig<R: ByteSource>(
        &mut self,
        reader: R,
        name: &str,
        f: BinSummaryStatistics,
        bin_size: usize,
        bin_overlap: usize,
        init: f64,
    ) -> Result<(), BbiError> {
        let mut bwr = BigWigReader::new(reader)?;

        let seqnames = bwr.genome().seqnames.clone();
        let mut sequences: Vec<Vec<f64>> = Vec::with_capacity(seqnames.len());

        for seqname in &seqnames {
            let (s, _) = bwr.query_sequence(seqname, f, bin_size, bin_overlap, init)?;
            sequences.push(s);
        }

        let genome = bwr.genome().clone();
        *self = SimpleTrack::new(name.to_string(), sequences, genome, bin_size)?;

        Ok(())
    }

    /// Like [`SimpleTrack::import_bigwig`], but opens `filename` itself
    /// (local path or `http(s)://` URL) instead of taking a byte source.
    pub fn import_bigwig_file(
        &mut self,
        filename: &str,
        name: &str,
        f: BinSummaryStatistics,
        bin_size: usize,
        bin_overlap: usize,
        init: f64,
    ) -> Result<(), BbiError> {
        let reader = crate::netfile::NetFile::open(filename)?;
        self.import_bigwig(reader, name, f, bin_size, bin_overlap, init)
    }

    /// Writes every chromosome's data plus the requested zoom levels to a
    /// new BigWig file.
    pub fn export_bigwig(&self, filename: &str, reduction_levels: Vec<i32>) -> Result<(), BbiError> {
        let mut writer = BigWigFile::new_writer(
            filename,
            self.genome.clone(),
            vec![OptionBigWig::ReductionLevels(reduction_levels.clone())],
        )?;

        for seqname in &self.genome.seqnames {
            let sequence = self.data.get(seqname).cloned().unwrap_or_default();
            writer.write(seqname, &sequence, self.bin_size)?;
            for (level_idx, _) in reduction_levels.iter().enumerate() {
                writer.write_zoom(seqname, &sequence, self.bin_size, level_idx)?;
            }
        }

        writer.close()
    }
}

/* -------------------------------------------------------------------------- */

impl Clone for SimpleTrack {
    fn clone(&self) -> Self {
        SimpleTrack {
            name: self.name.clone(),
            genome: self.genome.clone(),
            data: self.data.clone(),
            bin_size: self.bin_size,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl Track for SimpleTrack {
    fn get_bin_size(&self) -> usize {
        self.bin_size
    }

    fn get_name(&self) -> String {
        self.name.clone()
    }

    fn get_seq_names(&self) -> Vec<String> {
        self.genome.seqnames.clone()
    }

    fn get_genome(&self) -> &Genome {
        &self.genome
    }

    fn get_sequence(&self, query: &str) -> Result<TrackSequence, BbiError> {
        match self.data.get(query) {
            Some(seq) => Ok(TrackSequence::new(seq, self.bin_size)),
            None => Err(BbiError::NotFound(query.to_string())),
        }
    }

    fn get_slice(&self, seqname: &str, from: usize, to: usize) -> Result<Vec<f64>, BbiError> {
        let seq = self.data.get(seqname).ok_or_else(|| BbiError::NotFound(seqname.to_string()))?;

        let from = from / self.bin_size;
        let to = to / self.bin_size;

        if from >= seq.len() {
            return Ok(vec![]);
        }
        let to = to.min(seq.len());

        Ok(seq[from..to].to_vec())
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_genome() -> Genome {
        Genome::new(vec!["chr1".into(), "chr2".into()], vec![100, 200])
    }

    #[test]
    fn alloc_and_slice() {
        let genome = sample_genome();
        let mut track = SimpleTrack::alloc("t".into(), genome, 10);
        assert_eq!(track.get_sequence("chr1").unwrap().n_bins(), 10);

        let idx = track.index(25);
        assert_eq!(idx, 2);

        track.data.get_mut("chr1").unwrap()[2] = 42.0;

        let slice = track.get_slice("chr1", 20, 40).unwrap();
        assert_eq!(slice, vec![42.0, 0.0]);
    }

    #[test]
    fn missing_sequence_is_not_found() {
        let genome = sample_genome();
        let track = SimpleTrack::alloc("t".into(), genome, 10);
        assert!(matches!(track.get_sequence("chrX"), Err(BbiError::NotFound(_))));
    }

    #[test]
    fn rejects_mismatched_lengths() {
        let genome = sample_genome();
        let err = SimpleTrack::new("t".into(), vec![vec![0.0; 3]], genome, 10).unwrap_err();
        assert!(matches!(err, BbiError::InvalidArgument(_)));
    }
}
