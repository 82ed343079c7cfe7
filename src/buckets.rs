use std::{collections::HashMap, path::Path};

use ndarray::ArrayD;
use tracing::info;

use crate::{
    Ab, Bucket,
    error::{ConsistencyError, LoadError, Result},
    npy,
};

/// The quantized ab-values together with their 1-based bucket numbering.
///
/// Bucket `k` stands for `entries[k - 1]`. Bucket 0 is never assigned.
#[derive(Clone, Debug)]
pub struct BucketPalette {
    bucket_to_ab: Vec<Ab>,
    ab_to_bucket: HashMap<Ab, Bucket>,
}

impl BucketPalette {
    /// Builds the palette from entries in bucket order.
    ///
    /// # Errors
    /// [`LoadError::EmptyPalette`] for no entries and
    /// [`ConsistencyError::DuplicateEntry`] if an ab-value repeats.
    pub fn new(entries: Vec<Ab>) -> Result<Self> {
        if entries.is_empty() {
            return Err(LoadError::EmptyPalette.into());
        }

        let mut ab_to_bucket = HashMap::with_capacity(entries.len());
        for (row, &ab) in entries.iter().enumerate() {
            if let Some(bucket) = ab_to_bucket.insert(ab, bucket_of_row(row)) {
                return Err(ConsistencyError::DuplicateEntry {
                    ab,
                    first: row_of_bucket(bucket),
                    second: row,
                }
                .into());
            }
        }

        Ok(Self {
            bucket_to_ab: entries,
            ab_to_bucket,
        })
    }

    /// Reads a `.json` palette or, for any other extension, an `.npy` one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = crate::read_file(path)?;
        let palette = if path.extension().is_some_and(|ext| ext == "json") {
            Self::from_json_slice(&data)?
        } else {
            Self::from_npy_bytes(&data)?
        };

        info!(path = %path.display(), buckets = palette.len(), "loaded palette");
        Ok(palette)
    }

    /// Parses an `(N, 2)` array of ab-values of any numeric dtype.
    pub fn from_npy_bytes(bytes: &[u8]) -> Result<Self> {
        let table = npy::read_f64(bytes)?;
        Self::new(entries_from_table(&table)?)
    }

    /// Parses a JSON array of `[a, b]` pairs.
    pub fn from_json_str(src: &str) -> Result<Self> {
        Self::from_json_slice(src.as_bytes())
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let entries: Vec<Ab> = serde_json::from_slice(data).map_err(LoadError::from)?;
        Self::new(entries)
    }

    pub fn len(&self) -> usize {
        self.bucket_to_ab.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bucket_to_ab.is_empty()
    }

    /// The ab-values in bucket order.
    pub fn entries(&self) -> &[Ab] {
        &self.bucket_to_ab
    }

    /// All bucket identifiers, `1..=len`.
    pub fn buckets(&self) -> impl Iterator<Item = Bucket> + '_ {
        (0..self.len()).map(bucket_of_row)
    }

    /// The bucket of an exact palette ab-value.
    pub fn bucket_of(&self, ab: Ab) -> Option<Bucket> {
        self.ab_to_bucket.get(&ab).copied()
    }

    /// The ab-value a bucket stands for.
    pub fn ab_of(&self, bucket: Bucket) -> Option<Ab> {
        let row = usize::try_from(bucket).ok()?.checked_sub(1)?;
        self.bucket_to_ab.get(row).copied()
    }

    pub(crate) fn contains_bucket(&self, bucket: Bucket) -> bool {
        self.ab_of(bucket).is_some()
    }
}

fn bucket_of_row(row: usize) -> Bucket {
    row as Bucket + 1
}

fn row_of_bucket(bucket: Bucket) -> usize {
    (bucket - 1) as usize
}

fn entries_from_table(table: &ArrayD<f64>) -> Result<Vec<Ab>, LoadError> {
    let &[rows, 2] = table.shape() else {
        return Err(LoadError::PaletteShape(table.shape().to_vec()));
    };

    let mut entries = Vec::with_capacity(rows);
    for (row, pair) in table.outer_iter().enumerate() {
        let mut ab = [0; 2];
        for (dst, &value) in ab.iter_mut().zip(pair.iter()) {
            *dst = integral(value).ok_or(LoadError::NonIntegral { row, value })?;
        }
        entries.push(ab);
    }

    Ok(entries)
}

fn integral(value: f64) -> Option<i32> {
    let in_range = value >= f64::from(i32::MIN) && value <= f64::from(i32::MAX);
    (value.fract() == 0.0 && in_range).then_some(value as i32)
}
