//! Conversion between CIELab chrominance (the ab channels) and a fixed palette
//! of quantized ab buckets.
//!
//! A [`BucketConverter`] loads a palette of ab-values and a nearest-neighbor
//! index fitted on it, then maps Lab images to bucket images and bucket images
//! back to the palette's ab-values.

use std::{fs, path::Path};

use js_sys::Array;
use ndarray::{ArrayView2, ArrayView3};
use wasm_bindgen::prelude::*;

pub mod buckets;
pub mod config;
pub mod converter;
pub mod error;
pub mod files;
pub mod knn;
pub mod npy;

pub use crate::{
    buckets::BucketPalette,
    config::ConverterConfig,
    converter::BucketConverter,
    error::{ConsistencyError, Error, LoadError},
    knn::{Algorithm, KnnIndex, NearestBucket},
};

/// An ab-value pair as stored in the palette.
pub type Ab = [i32; 2];

/// A bucket identifier. Valid buckets are `1..=N` for a palette of `N` entries.
pub type Bucket = i64;

pub(crate) fn read_file(path: &Path) -> std::result::Result<Vec<u8>, LoadError> {
    fs::read(path).map_err(|err| LoadError::io(path, err))
}

// ------------------------------------------------------------
// WebAssembly bindings
// ------------------------------------------------------------

/// A [`BucketConverter`] for JavaScript callers.
///
/// Images cross the boundary as flat row-major typed arrays.
#[wasm_bindgen]
pub struct WasmBucketConverter {
    inner: BucketConverter,
}

#[wasm_bindgen]
impl WasmBucketConverter {
    /// Builds a converter from the bytes of a `.npy` palette and the JSON
    /// nearest-neighbor index.
    #[wasm_bindgen(constructor)]
    pub fn new(palette_npy: &[u8], index_json: &str) -> Result<WasmBucketConverter, JsValue> {
        let palette = BucketPalette::from_npy_bytes(palette_npy).map_err(to_js)?;
        let index = KnnIndex::from_json_str(index_json).map_err(to_js)?;
        let inner = BucketConverter::with_index(palette, index).map_err(to_js)?;
        Ok(Self { inner })
    }

    /// Buckets a `height x width x channels` Lab buffer into `height x width` buckets.
    pub fn quantize(
        &self,
        lab: Vec<f32>,
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Vec<i32>, JsValue> {
        quantize_flat(&self.inner, &lab, width, height, channels).map_err(to_js)
    }

    /// Expands `height x width` buckets into interleaved `a, b` values.
    pub fn dequantize(
        &self,
        buckets: Vec<i32>,
        width: usize,
        height: usize,
    ) -> Result<Vec<i32>, JsValue> {
        dequantize_flat(&self.inner, &buckets, width, height).map_err(to_js)
    }

    /// The palette as an array of `[a, b]` arrays, in bucket order.
    pub fn palette(&self) -> Array {
        let out = Array::new();
        for &[a, b] in self.inner.palette().entries() {
            let pair = Array::new();
            pair.push(&JsValue::from(a));
            pair.push(&JsValue::from(b));
            out.push(&pair);
        }

        out
    }

    #[wasm_bindgen(getter)]
    pub fn len(&self) -> usize {
        self.inner.palette().len()
    }
}

fn quantize_flat(
    converter: &BucketConverter,
    lab: &[f32],
    width: usize,
    height: usize,
    channels: usize,
) -> error::Result<Vec<i32>> {
    let image = ArrayView3::from_shape((height, width, channels), lab).map_err(|_| Error::Shape {
        expected: "a buffer of height x width x channels values",
        found: vec![lab.len()],
    })?;

    let buckets = converter.quantize(image)?;
    narrow_buckets(buckets.iter().copied())
}

/// Narrows predicted buckets to the `Int32Array` JavaScript receives.
fn narrow_buckets(buckets: impl IntoIterator<Item = Bucket>) -> error::Result<Vec<i32>> {
    buckets
        .into_iter()
        .enumerate()
        .map(|(pixel, bucket)| {
            i32::try_from(bucket)
                .map_err(|_| Error::from(ConsistencyError::BucketOverflow { bucket, pixel }))
        })
        .collect()
}

fn dequantize_flat(
    converter: &BucketConverter,
    buckets: &[i32],
    width: usize,
    height: usize,
) -> error::Result<Vec<i32>> {
    let buckets: Vec<Bucket> = buckets.iter().map(|&b| Bucket::from(b)).collect();
    let image = ArrayView2::from_shape((height, width), &buckets).map_err(|_| Error::Shape {
        expected: "a buffer of height x width buckets",
        found: vec![buckets.len()],
    })?;

    let ab = converter.dequantize(image)?;
    Ok(ab.iter().copied().collect())
}

fn to_js(err: Error) -> JsValue {
    JsValue::from_str(&err.to_string())
}
