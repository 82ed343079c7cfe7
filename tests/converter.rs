use std::fs::{self, File};
use std::path::{Path, PathBuf};

use ab_buckets::{
    Ab, Algorithm, Bucket, BucketConverter, BucketPalette, ConsistencyError, ConverterConfig, Error,
    KnnIndex, LoadError, files,
};
use ndarray::{Array2, Array3, Axis, array, s};
use ndarray_npy::{ReadNpyExt, WriteNpyExt};
use tempfile::TempDir;

/// A coarse 10-unit grid over a disc of ab-space, like the usual 313-bucket palette.
fn disc_palette() -> Vec<Ab> {
    let mut entries = Vec::new();
    for a in (-110..=100).step_by(10) {
        for b in (-110..=100).step_by(10) {
            if a * a + b * b <= 100 * 100 {
                entries.push([a, b]);
            }
        }
    }

    entries
}

fn fitted_index(entries: &[Ab], algorithm: Algorithm) -> KnnIndex {
    let points = entries.iter().map(|&[a, b]| [a as f32, b as f32]).collect();
    let labels = (1..=entries.len() as Bucket).collect();
    KnnIndex::fit(points, labels, algorithm).expect("fit index")
}

fn write_artifacts(dir: &Path, entries: &[Ab], algorithm: Algorithm) -> (PathBuf, PathBuf) {
    let palette_path = dir.join("buckets.npy");
    let table = Array2::from_shape_fn((entries.len(), 2), |(row, col)| entries[row][col] as i64);
    table
        .write_npy(File::create(&palette_path).expect("create palette"))
        .expect("write palette");

    let index_path = dir.join("buckets_knn.json");
    let index = fitted_index(entries, algorithm);
    fs::write(&index_path, index.to_json_string().expect("serialize")).expect("write index");

    (palette_path, index_path)
}

fn disc_converter(algorithm: Algorithm) -> (TempDir, BucketConverter) {
    let dir = tempfile::tempdir().expect("tempdir");
    let (palette, index) = write_artifacts(dir.path(), &disc_palette(), algorithm);
    let converter = BucketConverter::open(palette, index).expect("open converter");
    (dir, converter)
}

#[test]
fn palette_entries_round_trip_exactly() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let palette = converter.palette();
    for &ab in palette.entries() {
        let bucket = palette.bucket_of(ab).expect("palette entry has a bucket");
        assert_eq!(palette.ab_of(bucket), Some(ab));
    }
}

#[test]
fn buckets_are_exactly_one_to_n() {
    let (_dir, converter) = disc_converter(Algorithm::Brute);
    let palette = converter.palette();
    let n = palette.len() as Bucket;
    assert_eq!(palette.buckets().collect::<Vec<_>>(), (1..=n).collect::<Vec<_>>());
    for bucket in 1..=n {
        let ab = palette.ab_of(bucket).expect("bucket in range");
        assert_eq!(palette.bucket_of(ab), Some(bucket));
    }
    assert_eq!(palette.ab_of(0), None);
    assert_eq!(palette.ab_of(n + 1), None);
}

#[test]
fn quantizing_palette_values_then_dequantizing_is_identity() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let entries = converter.palette().entries().to_vec();
    let lab = Array3::from_shape_fn((1, entries.len(), 3), |(_, col, ch)| match ch {
        0 => 50.0f32,
        _ => entries[col][ch - 1] as f32,
    });

    let buckets = converter.quantize(lab.view()).expect("quantize");
    let ab = converter.dequantize(buckets.view()).expect("dequantize");
    for (col, &[a, b]) in entries.iter().enumerate() {
        assert_eq!(ab[[0, col, 0]], a);
        assert_eq!(ab[[0, col, 1]], b);
    }
}

#[test]
fn off_palette_values_snap_to_the_nearest_entry() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let lab = array![[[70.0f64, 12.0, -7.0], [20.0, -33.0, 48.0], [90.0, 1.0, 1.0]]];
    let buckets = converter.quantize(lab.view()).expect("quantize");
    let ab = converter.dequantize(buckets.view()).expect("dequantize");
    assert_eq!(ab.slice(s![0, 0, ..]), array![10, -10]);
    assert_eq!(ab.slice(s![0, 1, ..]), array![-30, 50]);
    assert_eq!(ab.slice(s![0, 2, ..]), array![0, 0]);
}

#[test]
fn shapes_are_preserved() {
    let (_dir, converter) = disc_converter(Algorithm::Brute);
    for (height, width) in [(1, 1), (3, 7), (8, 2)] {
        let lab = Array3::<f32>::zeros((height, width, 3));
        let buckets = converter.quantize(lab.view()).expect("quantize");
        assert_eq!(buckets.dim(), (height, width));

        let ab = converter.dequantize(buckets.view()).expect("dequantize");
        assert_eq!(ab.dim(), (height, width, 2));
    }
}

#[test]
fn batch_keeps_order_and_allows_mixed_sizes() {
    let (_dir, converter) = disc_converter(Algorithm::Brute);
    let batch = [array![[1, 2], [3, 4]], array![[5]], array![[6, 7, 8]]];
    let out = converter
        .dequantize_batch(batch.iter().map(|b| b.view()))
        .expect("dequantize batch");

    assert_eq!(out.len(), batch.len());
    for (k, buckets) in batch.iter().enumerate() {
        assert_eq!(out[k], converter.dequantize(buckets.view()).expect("dequantize"));
    }
}

#[test]
fn stacked_batch_matches_each_image() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let batch = Array3::from_shape_fn((3, 4, 5), |(k, i, j)| (k * 20 + i * 5 + j) as Bucket + 1);
    let stacked = converter.dequantize_stacked(batch.view()).expect("stacked");
    assert_eq!(stacked.dim(), (3, 4, 5, 2));
    for (k, image) in batch.outer_iter().enumerate() {
        assert_eq!(
            stacked.index_axis(Axis(0), k),
            converter.dequantize(image).expect("dequantize")
        );
    }
}

#[test]
fn two_entry_palette_picks_the_closer_bucket() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (palette, index) = write_artifacts(dir.path(), &[[0, 0], [10, 10]], Algorithm::Brute);
    let converter = BucketConverter::open(palette, index).expect("open");

    let lab = array![[[50.0f32, 1.0, 1.0], [50.0, 9.0, 9.0]]];
    assert_eq!(converter.quantize(lab.view()).expect("quantize"), array![[1, 2]]);
}

#[test]
fn bucket_zero_cannot_be_dequantized() {
    let (_dir, converter) = disc_converter(Algorithm::Brute);
    let err = converter.dequantize(array![[0]].view()).unwrap_err();
    assert!(matches!(err, Error::UnknownBucket { bucket: 0, .. }));
}

#[test]
fn missing_lightness_channel_is_a_shape_error() {
    let (_dir, converter) = disc_converter(Algorithm::Brute);
    let ab_only = Array3::<f32>::zeros((4, 4, 2));
    assert!(matches!(
        converter.quantize(ab_only.view()),
        Err(Error::Shape { .. })
    ));
}

#[test]
fn missing_files_fail_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (palette, _) = write_artifacts(dir.path(), &[[0, 0]], Algorithm::Brute);
    let missing = dir.path().join("nope.json");

    let err = BucketConverter::open(&palette, &missing).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Io { path, .. }) if path == missing));

    let err = BucketConverter::open(dir.path().join("nope.npy"), &missing).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Io { .. })));
}

#[test]
fn corrupt_index_fails_to_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (palette, index) = write_artifacts(dir.path(), &[[0, 0]], Algorithm::Brute);
    fs::write(&index, "{ not json").expect("overwrite index");

    let err = BucketConverter::open(&palette, &index).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Json(_))));
}

#[test]
fn index_fitted_on_another_order_is_inconsistent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let entries = [[0, 0], [10, 10], [20, -20]];
    let (palette, index) = write_artifacts(dir.path(), &entries, Algorithm::Brute);

    let reversed: Vec<Ab> = entries.iter().rev().copied().collect();
    fs::write(
        &index,
        fitted_index(&reversed, Algorithm::Brute)
            .to_json_string()
            .expect("serialize"),
    )
    .expect("overwrite index");

    let err = BucketConverter::open(&palette, &index).unwrap_err();
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyError::Mislabeled { ab: [0, 0], bucket: 1, predicted: 3 })
    ));
}

#[test]
fn three_feature_index_is_inconsistent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (palette, index) = write_artifacts(dir.path(), &[[0, 0]], Algorithm::Brute);
    fs::write(&index, r#"{"n_features": 3, "points": [[0, 0, 0]], "labels": [1]}"#)
        .expect("overwrite index");

    let err = BucketConverter::open(&palette, &index).unwrap_err();
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyError::DimensionMismatch { index: 3, palette: 2 })
    ));
}

#[test]
fn duplicate_palette_entries_are_inconsistent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("buckets.json");
    fs::write(&path, "[[0, 0], [5, 5], [0, 0]]").expect("write palette");

    let err = BucketPalette::open(&path).unwrap_err();
    assert!(matches!(
        err,
        Error::Consistency(ConsistencyError::DuplicateEntry { first: 0, second: 2, .. })
    ));
}

#[test]
fn loads_from_a_config_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_artifacts(dir.path(), &disc_palette(), Algorithm::KdTree);
    let config_path = dir.path().join("converter.json");
    fs::write(
        &config_path,
        r#"{"palette_path": "buckets.npy", "index_path": "buckets_knn.json"}"#,
    )
    .expect("write config");

    let config = ConverterConfig::from_json_file(&config_path).expect("config");
    let converter = BucketConverter::from_config(&config).expect("converter");
    assert_eq!(converter.palette().len(), disc_palette().len());
}

#[test]
fn converter_is_usable_from_many_threads() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let lab = Array3::from_shape_fn((6, 6, 3), |(i, j, ch)| match ch {
        0 => 50.0f32,
        1 => i as f32 * 10.0 - 30.0,
        _ => j as f32 * 10.0 - 30.0,
    });
    let expected = converter.quantize(lab.view()).expect("quantize");

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                assert_eq!(converter.quantize(lab.view()).expect("quantize"), expected);
            });
        }
    });
}

#[test]
fn npy_files_round_trip_through_the_file_helpers() {
    let (dir, converter) = disc_converter(Algorithm::Brute);
    let input = dir.path().join("lab.npy");
    let lab = array![[[50.0f32, 21.0, -9.0], [50.0, -2.0, 38.0]]];
    lab.write_npy(File::create(&input).expect("create lab")).expect("write lab");

    let out = files::output_path(&input, None, Some(dir.path()), "buckets_").expect("name");
    assert_eq!(out, dir.path().join("buckets_lab.npy"));
    let buckets = files::quantize_npy(&converter, &fs::read(&input).expect("read lab"))
        .expect("quantize file");
    fs::write(&out, buckets).expect("write buckets");

    let ab = files::dequantize_npy(&converter, &fs::read(&out).expect("read buckets"))
        .expect("dequantize file");
    let ab = Array3::<i32>::read_npy(&ab[..]).expect("decode ab");
    assert_eq!(ab, array![[[20, -10], [0, 40]]]);
}

#[test]
fn non_finite_lab_values_name_the_pixel() {
    let (_dir, converter) = disc_converter(Algorithm::KdTree);
    let lab = array![
        [[50.0f64, 0.0, 0.0], [50.0, 0.0, 0.0]],
        [[50.0, 0.0, 0.0], [50.0, 1e300, 0.0]]
    ];
    let err = converter.quantize(lab.view()).unwrap_err();
    assert!(matches!(err, Error::NonFiniteAb { position, .. } if position == [1, 1]));
}
