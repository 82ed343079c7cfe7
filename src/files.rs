//! Whole-file conversions used by the `ab-buckets` command line tool.
//!
//! Each conversion takes the bytes of an input `.npy` and returns the bytes of
//! the output `.npy`, leaving file handling to the caller.

use std::path::{Path, PathBuf};

use ndarray::{ArrayBase, Data, Dimension, Ix2, Ix3};
use ndarray_npy::{WritableElement, WriteNpyExt};

use crate::{
    converter::BucketConverter,
    error::{Error, Result},
    knn::NearestBucket,
    npy,
};

/// Buckets an `H x W x C` Lab array of any numeric dtype into an `H x W`
/// `i64` bucket array.
pub fn quantize_npy<I: NearestBucket>(
    converter: &BucketConverter<I>,
    bytes: &[u8],
) -> Result<Vec<u8>> {
    let lab = npy::read_f64(bytes)?;
    let found = lab.shape().to_vec();
    let lab = lab.into_dimensionality::<Ix3>().map_err(|_| Error::Shape {
        expected: "an H x W x C Lab array",
        found,
    })?;

    encode(&converter.quantize(lab.view())?)
}

/// Expands an `H x W` bucket array into `H x W x 2` ab-values, or a
/// `B x H x W` stack into `B x H x W x 2`.
pub fn dequantize_npy<I: NearestBucket>(
    converter: &BucketConverter<I>,
    bytes: &[u8],
) -> Result<Vec<u8>> {
    let buckets = npy::read_i64(bytes)?;
    let wrong_rank = || Error::Shape {
        expected: "an H x W or B x H x W bucket array",
        found: buckets.shape().to_vec(),
    };

    match buckets.ndim() {
        2 => {
            let image = buckets.view().into_dimensionality::<Ix2>().map_err(|_| wrong_rank())?;
            encode(&converter.dequantize(image)?)
        }
        3 => {
            let batch = buckets.view().into_dimensionality::<Ix3>().map_err(|_| wrong_rank())?;
            encode(&converter.dequantize_stacked(batch)?)
        }
        _ => Err(wrong_rank()),
    }
}

/// Where the conversion of `input` is written.
///
/// An explicit `output` wins. Otherwise the input's file name gets `prefix`
/// and lands in `out_dir`, or the current directory. Returns `None` when
/// `input` has no file name to derive from.
pub fn output_path(
    input: &Path,
    output: Option<&Path>,
    out_dir: Option<&Path>,
    prefix: &str,
) -> Option<PathBuf> {
    if let Some(output) = output {
        return Some(output.to_path_buf());
    }

    let name = input.file_name()?;
    let dir = out_dir.unwrap_or(Path::new("."));
    Some(dir.join(format!("{prefix}{}", name.to_string_lossy())))
}

fn encode<S, D>(arr: &ArrayBase<S, D>) -> Result<Vec<u8>>
where
    S: Data,
    S::Elem: WritableElement,
    D: Dimension,
{
    let mut buf = Vec::new();
    arr.write_npy(&mut buf)?;
    Ok(buf)
}
