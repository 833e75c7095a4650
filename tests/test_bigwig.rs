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

use std::fs;
use std::path::PathBuf;

use approx::assert_relative_eq;

use bbi_rs::bigwig::{is_bigwig_file, BigWigFile, OptionBigWig};
use bbi_rs::error::BbiError;
use bbi_rs::genome::Genome;
use bbi_rs::track_statistics::bin_summary_statistics_from_string;

/* -------------------------------------------------------------------------- */

fn tmp_path(name: &str) -> PathBuf {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut p = std::env::temp_dir();
    p.push(format!("bbi-rs-test-{}-{}", std::process::id(), name));
    p
}

/* -------------------------------------------------------------------------- */

#[test]
fn roundtrip_two_chromosomes_with_zoom() {
    let path = tmp_path("roundtrip.bw");

    let genome = Genome::new(vec!["test1".into(), "test2".into()], vec![1000, 2000]);

    {
        let mut writer = BigWigFile::new_writer(
            path.to_str().unwrap(),
            genome.clone(),
            vec![OptionBigWig::ReductionLevels(vec![400])],
        )
        .unwrap();

        let values1: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let values2: Vec<f64> = vec![0.0; 200];

        writer.write("test1", &values1, 10).unwrap();
        writer.write("test2", &values2, 10).unwrap();
        writer.write_zoom("test1", &values1, 10, 0).unwrap();
        writer.write_zoom("test2", &values2, 10, 0).unwrap();
        writer.close().unwrap();
    }

    assert!(is_bigwig_file(path.to_str().unwrap()).unwrap());

    let mut reader = BigWigFile::new_reader(path.to_str().unwrap()).unwrap();
    assert_eq!(reader.genome().len(), 2);
    assert_eq!(reader.genome().seqnames[0], "test1");
    assert_eq!(reader.genome().seqnames[1], "test2");

    let mean = bin_summary_statistics_from_string("mean").unwrap();

    // Base-level query: bin 45..55 averages values[45..55) = 49.5
    let (values, bin_size) = reader.query_slice("test1", 450, 550, mean, 10, 0, f64::NAN).unwrap();
    assert_eq!(bin_size, 10);
    assert_eq!(values.len(), 10);
    let observed_mean = values.iter().sum::<f64>() / values.len() as f64;
    assert_relative_eq!(observed_mean, 49.5, epsilon = 1e-6);

    // Zoom-level query: request a bin size that selects the 400-wide level.
    let (zoom_values, zoom_bin_size) = reader.query_slice("test1", 0, 1000, mean, 800, 0, f64::NAN).unwrap();
    assert_eq!(zoom_bin_size, 800);
    assert!(zoom_values.iter().any(|v| !v.is_nan()));

    let _ = fs::remove_file(&path);
}

#[test]
fn sparse_chromosome_round_trips_single_value() {
    let path = tmp_path("sparse.bw");
    let genome = Genome::new(vec!["chrS".into()], vec![10000]);

    {
        let mut writer = BigWigFile::new_writer(path.to_str().unwrap(), genome, vec![]).unwrap();
        let mut values = vec![0.0; 1000];
        values[500] = 7.0;
        writer.write("chrS", &values, 10).unwrap();
        writer.close().unwrap();
    }

    let mut reader = BigWigFile::new_reader(path.to_str().unwrap()).unwrap();
    let max = bin_summary_statistics_from_string("max").unwrap();
    let (values, _) = reader.query_slice("chrS", 5000, 5010, max, 10, 0, f64::NAN).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values[0], 7.0);

    let (values, _) = reader.query_slice("chrS", 0, 10, max, 10, 0, f64::NAN).unwrap();
    assert_eq!(values.len(), 1);
    assert!(values[0].is_nan() || values[0] == 0.0);

    let _ = fs::remove_file(&path);
}

#[test]
fn malformed_file_is_bad_magic() {
    let path = tmp_path("not-a-bigwig.bw");
    fs::write(&path, vec![b'x'; 128]).unwrap();

    let err = BigWigFile::new_reader(path.to_str().unwrap()).unwrap_err();
    assert!(matches!(err, BbiError::BadMagic(_)));

    let _ = fs::remove_file(&path);
}

#[test]
fn missing_file_is_not_found_as_io_failure() {
    let err = BigWigFile::new_reader("/nonexistent/path/does-not-exist.bw").unwrap_err();
    assert!(matches!(err, BbiError::IoFailure { .. }));
}

#[test]
fn unknown_sequence_query_is_not_found() {
    let path = tmp_path("unknown-seq.bw");
    let genome = Genome::new(vec!["chr1".into()], vec![100]);

    {
        let mut writer = BigWigFile::new_writer(path.to_str().unwrap(), genome, vec![]).unwrap();
        writer.write("chr1", &vec![1.0; 10], 10).unwrap();
        writer.close().unwrap();
    }

    let mut reader = BigWigFile::new_reader(path.to_str().unwrap()).unwrap();
    let mean = bin_summary_statistics_from_string("mean").unwrap();
    let err = reader.query_slice("chrZZZ", 0, 10, mean, 10, 0, f64::NAN).unwrap_err();
    assert!(matches!(err, BbiError::NotFound(_)));

    let _ = fs::remove_file(&path);
}
