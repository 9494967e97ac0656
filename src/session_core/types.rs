//! Array value type stored in the session container

use serde::{Deserialize, Serialize};

/// Row-major f64 array, the unit of data written to and read from a
/// container namespace. One or two dimensional. Missing samples are NaN.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Array {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Shape error raised when constructing a matrix from mismatched dimensions.
#[derive(Debug)]
pub struct ShapeError {
    pub expected: usize,
    pub actual: usize,
}

impl std::fmt::Display for ShapeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Shape mismatch: expected {} elements, got {}",
            self.expected, self.actual
        )
    }
}

impl std::error::Error for ShapeError {}

impl Array {
    /// Create a 1-D array from a vector of samples.
    pub fn from_vec(data: Vec<f64>) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Create a 2-D array from a flat row-major buffer.
    pub fn matrix(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, ShapeError> {
        if rows * cols != data.len() {
            return Err(ShapeError {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self {
            shape: vec![rows, cols],
            data,
        })
    }

    /// Reconstruct an array from a stored shape and buffer.
    pub fn from_parts(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ShapeError> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(ShapeError {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Samples of a 1-D array; None for matrices.
    pub fn vector(&self) -> Option<&[f64]> {
        if self.shape.len() == 1 {
            Some(&self.data)
        } else {
            None
        }
    }

    /// Row count of a 2-D array; None for vectors.
    pub fn rows(&self) -> Option<usize> {
        if self.shape.len() == 2 {
            Some(self.shape[0])
        } else {
            None
        }
    }

    /// One row of a 2-D array.
    pub fn row(&self, index: usize) -> Option<&[f64]> {
        if self.shape.len() != 2 {
            return None;
        }
        let cols = self.shape[1];
        let start = index * cols;
        self.data.get(start..start + cols)
    }
}

/// Bitwise sample equality so that NaN sentinels compare equal. Needed for
/// the checkpoint-skip equivalence guarantee, where re-run outputs must be
/// byte-identical to originals.
impl PartialEq for Array {
    fn eq(&self, other: &Self) -> bool {
        self.shape == other.shape
            && self.data.len() == other.data.len()
            && self
                .data
                .iter()
                .zip(other.data.iter())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }
}
