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

// Derives one reduction level's summary records from a base-level value
// stream (spec.md §4.8). Each declared reduction level runs its own
// ZoomBuilder/BlockBuilder/RTree triple over the same values; this module
// only does the reduction, not placement or compression.

use crate::bbi::SummaryRecord;

/* -------------------------------------------------------------------------- */

/// Aggregates `values` (one entry per `bin_size`-wide base bin, starting at
/// `chrom_start`) into fixed `reduction_level`-wide windows. Zero/NaN
/// contribute nothing to `validCount`, matching the base-level writer's
/// treatment of missing data.
pub fn reduce(
    chrom_id: u32,
    values: &[f32],
    chrom_start: u32,
    bin_size: u32,
    reduction_level: u32,
) -> Vec<SummaryRecord> {
    if reduction_level == 0 || bin_size == 0 || values.is_empty() {
        return Vec::new();
    }

    let bins_per_window = (reduction_level / bin_size).max(1) as usize;
    let mut out = Vec::new();

    for (window_idx, window) in values.chunks(bins_per_window).enumerate() {
        let start = chrom_start + window_idx as u32 * bins_per_window as u32 * bin_size;
        let end = start + window.len() as u32 * bin_size;

        let mut rec = SummaryRecord::empty(chrom_id as i32, start, end);
        for &v in window {
            if !v.is_nan() && v != 0.0 {
                rec.add_value(v as f64);
            }
        }
        if rec.valid > 0 {
            out.push(rec);
        }
    }

    out
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduces_into_windows() {
        let values: Vec<f32> = (1..=10).map(|v| v as f32).collect();
        let records = reduce(0, &values, 0, 100, 400);
        // bins_per_window = 4 -> windows: [1,2,3,4] [5,6,7,8] [9,10]
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sum, 10.0);
        assert_eq!(records[0].valid, 4);
        assert_eq!(records[1].sum, 26.0);
        assert_eq!(records[2].valid, 2);
        assert_eq!(records[2].sum, 19.0);
    }

    #[test]
    fn nan_bins_excluded_from_valid_count() {
        let values = vec![1.0, f32::NAN, 3.0, f32::NAN];
        let records = reduce(0, &values, 0, 10, 40);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].valid, 2);
        assert_eq!(records[0].sum, 4.0);
    }

    #[test]
    fn all_missing_window_dropped() {
        let values = vec![f32::NAN; 4];
        let records = reduce(0, &values, 0, 10, 40);
        assert!(records.is_empty());
    }

    #[test]
    fn zero_bins_excluded_from_valid_count() {
        // Matches blockbuilder's dense/sparse missing-value test: zero is
        // treated as missing at every level, not just the base level.
        let values = vec![0.0, 2.0, 0.0, 4.0];
        let records = reduce(0, &values, 0, 10, 40);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].valid, 2);
        assert_eq!(records[0].sum, 6.0);
    }
}
