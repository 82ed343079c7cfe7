use std::path::Path;

use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, Axis};
use palette::Lab;
use tracing::{debug, info};

use crate::{
    Ab, Bucket,
    buckets::BucketPalette,
    config::ConverterConfig,
    error::{ConsistencyError, Error, Result},
    knn::{AB_FEATURES, KnnIndex, NearestBucket},
};

/// Converts between continuous ab-values and palette buckets.
///
/// Both lookup directions are built once at construction; every conversion
/// takes `&self`, so a converter can be shared between threads as long as
/// its index can.
#[derive(Debug)]
pub struct BucketConverter<I = KnnIndex> {
    palette: BucketPalette,
    index: I,
}

impl BucketConverter<KnnIndex> {
    /// Loads the palette and the nearest-neighbor index from disk.
    ///
    /// # Errors
    /// [`Error::Load`] if a file is missing or malformed and
    /// [`Error::Consistency`] if the index was not fitted on this palette.
    pub fn open(palette_path: impl AsRef<Path>, index_path: impl AsRef<Path>) -> Result<Self> {
        let palette = BucketPalette::open(palette_path)?;
        let index = KnnIndex::open(index_path)?;
        Self::with_index(palette, index)
    }

    pub fn from_config(config: &ConverterConfig) -> Result<Self> {
        Self::open(&config.palette_path, &config.index_path)
    }
}

impl<I: NearestBucket> BucketConverter<I> {
    /// Pairs a palette with an index fitted on it.
    ///
    /// The index must take 2D points, emit only palette buckets, and map every
    /// palette entry to its own bucket.
    pub fn with_index(palette: BucketPalette, index: I) -> Result<Self> {
        let n_features = index.n_features();
        if n_features != AB_FEATURES {
            return Err(ConsistencyError::DimensionMismatch {
                index: n_features,
                palette: AB_FEATURES,
            }
            .into());
        }

        if let Some(labels) = index.labels() {
            if let Some(&label) = labels.iter().find(|&&l| !palette.contains_bucket(l)) {
                return Err(ConsistencyError::LabelOutOfRange {
                    label,
                    len: palette.len(),
                }
                .into());
            }
        }

        let points: Vec<[f32; 2]> = palette.entries().iter().map(|&ab| ab_point(ab)).collect();
        let predicted = predict_checked(&index, &points)?;
        let expected = palette.entries().iter().zip(palette.buckets());
        for ((&ab, bucket), predicted) in expected.zip(predicted) {
            if predicted != bucket {
                return Err(ConsistencyError::Mislabeled {
                    ab,
                    bucket,
                    predicted,
                }
                .into());
            }
        }

        info!(buckets = palette.len(), "bucket converter ready");
        Ok(Self { palette, index })
    }

    pub fn palette(&self) -> &BucketPalette {
        &self.palette
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    /// Buckets the ab channels of a Lab image.
    ///
    /// Channel 0 is L and is ignored, channels 1 and 2 are a and b. Any further
    /// channels are ignored as well.
    ///
    /// # Errors
    /// [`Error::Shape`] if the image has fewer than 3 channels and
    /// [`Error::NonFiniteAb`] if an ab-value is not a finite `f32`.
    pub fn quantize<A>(&self, image: ArrayView3<'_, A>) -> Result<Array2<Bucket>>
    where
        A: Copy + Into<f64>,
    {
        let (height, width, channels) = image.dim();
        if channels < 3 {
            return Err(Error::Shape {
                expected: "an H x W x 3 Lab image",
                found: image.shape().to_vec(),
            });
        }

        debug!(height, width, "quantizing Lab image");
        let lanes = image.lanes(Axis(2));
        let values = lanes
            .into_iter()
            .map(|px| [Into::<f64>::into(px[1]), Into::<f64>::into(px[2])]);
        let points = finite_points(values, |i| vec![i / width, i % width])?;

        let buckets = predict_checked(&self.index, &points)?;
        let mut out = Array2::zeros((height, width));
        for (dst, bucket) in out.iter_mut().zip(buckets) {
            *dst = bucket;
        }

        Ok(out)
    }

    /// Buckets a slice of Lab pixels, ignoring lightness.
    ///
    /// A non-finite ab-value is reported with its pixel index as position.
    pub fn quantize_pixels(&self, pixels: &[Lab]) -> Result<Vec<Bucket>> {
        let values = pixels.iter().map(|lab| [f64::from(lab.a), f64::from(lab.b)]);
        let points = finite_points(values, |i| vec![i])?;
        predict_checked(&self.index, &points)
    }

    /// Buckets bare ab-values.
    pub fn quantize_ab(&self, points: &[[f32; 2]]) -> Result<Vec<Bucket>> {
        let values = points.iter().map(|&[a, b]| [f64::from(a), f64::from(b)]);
        let points = finite_points(values, |i| vec![i])?;
        predict_checked(&self.index, &points)
    }

    /// Replaces every bucket with its palette ab-value, giving an `H x W x 2` image.
    ///
    /// # Errors
    /// [`Error::UnknownBucket`] for a bucket outside `1..=N`, carrying its `[row, col]`.
    pub fn dequantize(&self, buckets: ArrayView2<'_, Bucket>) -> Result<Array3<i32>> {
        let (height, width) = buckets.dim();
        debug!(height, width, "dequantizing bucket image");

        let mut out = Array3::zeros((height, width, 2));
        let lanes = out.lanes_mut(Axis(2));
        for (mut ab, ((row, col), &bucket)) in lanes.into_iter().zip(buckets.indexed_iter()) {
            let [a, b] = self.palette.ab_of(bucket).ok_or_else(|| Error::UnknownBucket {
                bucket,
                position: vec![row, col],
            })?;
            ab[0] = a;
            ab[1] = b;
        }

        Ok(out)
    }

    /// Dequantizes each image in order; images may differ in size.
    ///
    /// Stops at the first unknown bucket, whose position is `[image, row, col]`.
    pub fn dequantize_batch<'a, B>(&self, batch: B) -> Result<Vec<Array3<i32>>>
    where
        B: IntoIterator<Item = ArrayView2<'a, Bucket>>,
    {
        batch
            .into_iter()
            .enumerate()
            .map(|(image, buckets)| {
                self.dequantize(buckets).map_err(|err| match err {
                    Error::UnknownBucket { bucket, mut position } => {
                        position.insert(0, image);
                        Error::UnknownBucket { bucket, position }
                    }
                    err => err,
                })
            })
            .collect()
    }

    /// Dequantizes a `B x H x W` stack into a `B x H x W x 2` stack.
    pub fn dequantize_stacked(&self, batch: ArrayView3<'_, Bucket>) -> Result<Array4<i32>> {
        let (len, height, width) = batch.dim();
        let mut out = Array4::zeros((len, height, width, 2));
        let images = self.dequantize_batch(batch.outer_iter())?;
        for (mut dst, image) in out.outer_iter_mut().zip(images) {
            dst.assign(&image);
        }

        Ok(out)
    }
}

fn ab_point([a, b]: Ab) -> [f32; 2] {
    [a as f32, b as f32]
}

/// Narrows ab-values to the index's `f32` points.
///
/// Fails on the first value that is not finite after the cast, at `position(i)`.
fn finite_points<V, P>(values: V, position: P) -> Result<Vec<[f32; 2]>>
where
    V: IntoIterator<Item = [f64; 2]>,
    P: Fn(usize) -> Vec<usize>,
{
    values
        .into_iter()
        .enumerate()
        .map(|(i, [a, b])| {
            let point = [a as f32, b as f32];
            if point.iter().all(|v| v.is_finite()) {
                Ok(point)
            } else {
                Err(Error::NonFiniteAb {
                    ab: [a, b],
                    position: position(i),
                })
            }
        })
        .collect()
}

fn predict_checked<I: NearestBucket>(index: &I, points: &[[f32; 2]]) -> Result<Vec<Bucket>> {
    let predicted = index.predict(points);
    if predicted.len() != points.len() {
        return Err(ConsistencyError::PredictionCount {
            expected: points.len(),
            found: predicted.len(),
        }
        .into());
    }

    Ok(predicted)
}
