//! Dtype-agnostic `.npy` reading.
//!
//! `ndarray-npy` only reads an array whose element type matches the file's
//! descriptor exactly, so each reader below tries the common numeric dtypes in
//! turn and widens whichever one matches.

use ndarray::ArrayD;
use ndarray_npy::{ReadNpyError, ReadNpyExt, ReadableElement};

use crate::error::LoadError;

/// Reads an array of any supported numeric dtype, widened to `f64`.
///
/// 64-bit integers above 2^53 lose precision.
pub fn read_f64(bytes: &[u8]) -> Result<ArrayD<f64>, LoadError> {
    if let Some(arr) = try_read::<f64, _>(bytes, |v| v)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<f32, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i64, _>(bytes, |v| v as f64)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u64, _>(bytes, |v| v as f64)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i32, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u32, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i16, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u16, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i8, _>(bytes, f64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u8, _>(bytes, f64::from)? {
        return Ok(arr);
    }

    Err(LoadError::UnsupportedDtype)
}

/// Reads an array of any supported integer dtype, widened to `i64`.
///
/// Floating point and `u64` data are rejected: bucket identifiers must be
/// carried exactly.
pub fn read_i64(bytes: &[u8]) -> Result<ArrayD<i64>, LoadError> {
    if let Some(arr) = try_read::<i64, _>(bytes, |v| v)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i32, _>(bytes, i64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u32, _>(bytes, i64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i16, _>(bytes, i64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u16, _>(bytes, i64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<i8, _>(bytes, i64::from)? {
        return Ok(arr);
    }
    if let Some(arr) = try_read::<u8, _>(bytes, i64::from)? {
        return Ok(arr);
    }

    Err(LoadError::UnsupportedDtype)
}

fn try_read<T, U>(bytes: &[u8], widen: impl Fn(T) -> U) -> Result<Option<ArrayD<U>>, LoadError>
where
    T: ReadableElement + Copy,
{
    match ArrayD::<T>::read_npy(bytes) {
        Ok(arr) => Ok(Some(arr.mapv(widen))),
        Err(ReadNpyError::WrongDescriptor(_)) => Ok(None),
        Err(err) => Err(err.into()),
    }
}
