use std::{fmt, path::Path};

use kd_tree::{KdPoint, KdTree};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    Bucket,
    error::{ConsistencyError, LoadError, Result},
};

/// Number of input features a chrominance point carries.
pub const AB_FEATURES: usize = 2;

/// Maps arbitrary ab-values to the bucket of their nearest palette entry.
pub trait NearestBucket {
    /// Dimensionality of the points the index was fitted on.
    fn n_features(&self) -> usize;

    /// Returns one bucket per input point, in input order.
    fn predict(&self, points: &[[f32; 2]]) -> Vec<Bucket>;

    /// The labels the index can emit, if it can tell.
    fn labels(&self) -> Option<&[Bucket]> {
        None
    }
}

/// Neighbor search strategy of a [`KnnIndex`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Linear scan; ties go to the earliest fitted point.
    #[default]
    Brute,
    /// k-d tree lookup.
    KdTree,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Brute => write!(f, "brute"),
            Self::KdTree => write!(f, "kd_tree"),
        }
    }
}

/// A fitted 1-nearest-neighbor classifier over ab-values.
pub struct KnnIndex {
    algorithm: Algorithm,
    points: Vec<[f32; 2]>,
    labels: Vec<Bucket>,
    tree: Option<KdTree<Sample>>,
}

impl KnnIndex {
    /// Fits the index on `points`, where `labels[i]` is the bucket of `points[i]`.
    ///
    /// # Errors
    /// [`LoadError::MalformedIndex`] if the index would be empty, the lengths
    /// disagree or a coordinate is not finite.
    pub fn fit(points: Vec<[f32; 2]>, labels: Vec<Bucket>, algorithm: Algorithm) -> Result<Self> {
        if points.is_empty() {
            return Err(malformed("no fitted points"));
        }

        if points.len() != labels.len() {
            return Err(malformed(format!(
                "{} points but {} labels",
                points.len(),
                labels.len(),
            )));
        }

        if let Some(row) = points.iter().position(|p| !p.iter().all(|v| v.is_finite())) {
            return Err(malformed(format!("point {row} is not finite")));
        }

        let tree = match algorithm {
            Algorithm::Brute => None,
            Algorithm::KdTree => {
                let samples = points
                    .iter()
                    .zip(&labels)
                    .map(|(&point, &label)| Sample { point, label })
                    .collect();

                Some(KdTree::build_by_ordered_float(samples))
            }
        };

        Ok(Self {
            algorithm,
            points,
            labels,
            tree,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = crate::read_file(path)?;
        let index = Self::from_json_slice(&data)?;
        info!(
            path = %path.display(),
            algorithm = %index.algorithm,
            points = index.points.len(),
            "loaded nearest-neighbor index",
        );

        Ok(index)
    }

    pub fn from_json_str(src: &str) -> Result<Self> {
        Self::from_json_slice(src.as_bytes())
    }

    pub fn from_json_slice(data: &[u8]) -> Result<Self> {
        let file: IndexFile = serde_json::from_slice(data).map_err(LoadError::from)?;
        if file.n_features != AB_FEATURES {
            return Err(ConsistencyError::DimensionMismatch {
                index: file.n_features,
                palette: AB_FEATURES,
            }
            .into());
        }

        let mut points = Vec::with_capacity(file.points.len());
        for (row, point) in file.points.iter().enumerate() {
            let &[a, b] = point.as_slice() else {
                return Err(malformed(format!(
                    "point {row} has {} features, expected {}",
                    point.len(),
                    file.n_features,
                )));
            };

            points.push([a, b]);
        }

        Self::fit(points, file.labels, file.algorithm)
    }

    pub fn to_json_string(&self) -> Result<String> {
        let file = IndexFile {
            n_features: AB_FEATURES,
            algorithm: self.algorithm,
            points: self.points.iter().map(|p| p.to_vec()).collect(),
            labels: self.labels.clone(),
        };

        Ok(serde_json::to_string(&file).map_err(LoadError::from)?)
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn nearest(&self, query: [f32; 2]) -> Bucket {
        if let Some(tree) = &self.tree {
            if let Some(found) = tree.nearest(&Sample { point: query, label: 0 }) {
                return found.item.label;
            }
        }

        let mut best_idx = 0;
        let mut best_dist = f32::INFINITY;
        for (idx, [a, b]) in self.points.iter().enumerate() {
            let da = query[0] - a;
            let db = query[1] - b;
            let dist = da * da + db * db;
            if dist < best_dist {
                best_dist = dist;
                best_idx = idx;
            }
        }

        self.labels[best_idx]
    }
}

impl NearestBucket for KnnIndex {
    fn n_features(&self) -> usize {
        AB_FEATURES
    }

    fn predict(&self, points: &[[f32; 2]]) -> Vec<Bucket> {
        points.iter().map(|&point| self.nearest(point)).collect()
    }

    fn labels(&self) -> Option<&[Bucket]> {
        Some(&self.labels)
    }
}

impl fmt::Debug for KnnIndex {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KnnIndex")
            .field("algorithm", &self.algorithm)
            .field("points", &self.points.len())
            .finish_non_exhaustive()
    }
}

/// On-disk form of a fitted index.
#[derive(Deserialize, Serialize)]
struct IndexFile {
    n_features: usize,
    #[serde(default)]
    algorithm: Algorithm,
    points: Vec<Vec<f32>>,
    labels: Vec<Bucket>,
}

#[derive(Clone, Copy, Debug)]
struct Sample {
    point: [f32; 2],
    label: Bucket,
}

impl KdPoint for Sample {
    type Scalar = f32;
    type Dim = typenum::U2;

    fn at(&self, i: usize) -> Self::Scalar {
        self.point[i]
    }
}

fn malformed(reason: impl Into<String>) -> crate::Error {
    LoadError::MalformedIndex(reason.into()).into()
}
