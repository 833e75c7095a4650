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

/* -------------------------------------------------------------------------- */

// Type alias for BinSummaryStatistics function
pub type BinSummaryStatistics = fn(f64, f64, f64, f64, f64) -> f64;

/* -------------------------------------------------------------------------- */

// Function implementations for BinSummaryStatistics
fn bin_mean(sum: f64, _sum_squares: f64, _min: f64, _max: f64, n: f64) -> f64 {
    sum / n
}

fn bin_max(_sum: f64, _sum_squares: f64, _min: f64, max: f64, _n: f64) -> f64 {
    max
}

fn bin_min(_sum: f64, _sum_squares: f64, min: f64, _max: f64, _n: f64) -> f64 {
    min
}

fn bin_discrete_mean(sum: f64, _sum_squares: f64, _min: f64, _max: f64, n: f64) -> f64 {
    sum / n.max(1.0)
}

/* -------------------------------------------------------------------------- */

pub fn bin_summary_statistics_from_string(s: &str) -> Option<BinSummaryStatistics> {
    match s {
        "mean"          => Some(bin_mean),
        "max"           => Some(bin_max),
        "min"           => Some(bin_min),
        "discrete mean" => Some(bin_discrete_mean),
        _               => None,
    }
}

/* -------------------------------------------------------------------------- */
/* -------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_known_variants() {
        assert!(bin_summary_statistics_from_string("mean").is_some());
        assert!(bin_summary_statistics_from_string("discrete mean").is_some());
        assert!(bin_summary_statistics_from_string("min").is_some());
        assert!(bin_summary_statistics_from_string("max").is_some());
        assert!(bin_summary_statistics_from_string("variance").is_none());
    }

    #[test]
    fn mean_and_discrete_mean_differ_on_partial_bins() {
        let mean = bin_summary_statistics_from_string("mean").unwrap();
        let discrete_mean = bin_summary_statistics_from_string("discrete mean").unwrap();
        // sum=10 over 2 valid out of a 4-wide bin
        assert_eq!(mean(10.0, 0.0, 0.0, 0.0, 2.0), 5.0);
        assert_eq!(discrete_mean(10.0, 0.0, 0.0, 0.0, 2.0), 5.0);
    }
}
