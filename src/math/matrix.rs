use rand::prelude::*;
use serde::{Serialize, Deserialize};
use std::ops::{Add, Sub};

/// Dense row-major matrix. Loss tensors of shape (N, C) live here; flat
/// heatmaps are carried as a single row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix{
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<Vec<f64>>
}

impl Matrix{
    pub fn zeros(rows: usize, cols: usize) -> Matrix {
        Matrix::filled(rows, cols, 0.0)
    }

    pub fn filled(rows: usize, cols: usize, value: f64) -> Matrix {
        Matrix{
            rows,
            cols,
            data: vec![vec![value; cols]; rows]
        }
    }

    /// Uniform samples in [-scale, scale).
    pub fn random(rows: usize, cols: usize, scale: f64) -> Matrix {
        let mut rng = rand::thread_rng();
        let mut res = Matrix::zeros(rows, cols);

        for i in 0..rows {
            for j in 0..cols {
                res.data[i][j] = (rng.gen::<f64>() * 2.0 - 1.0) * scale;
            }
        }

        res
    }

    /// Wraps `data` as is; `cols` is taken from the first row. Ragged rows
    /// are not rejected here, see [`Matrix::ragged_row`].
    pub fn from_data(data: Vec<Vec<f64>>) -> Matrix {
        Matrix {
            rows: data.len(),
            cols: data.first().map_or(0, |row| row.len()),
            data
        }
    }

    /// One row holding `values`. Used for flattened heatmaps.
    pub fn row_vector(values: Vec<f64>) -> Matrix {
        Matrix::from_data(vec![values])
    }

    /// Builds a `rows x cols` matrix from row-major `values`.
    ///
    /// Returns `None` when `values.len() != rows * cols`.
    pub fn from_flat(rows: usize, cols: usize, values: &[f64]) -> Option<Matrix> {
        if values.len() != rows * cols {
            return None;
        }
        let data = if cols == 0 {
            vec![Vec::new(); rows]
        } else {
            values.chunks(cols).map(|row| row.to_vec()).collect()
        };
        Some(Matrix { rows, cols, data })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// First row whose length disagrees with `rows x cols`, as
    /// `(row index, its length)`. A missing row reports length 0.
    pub fn ragged_row(&self) -> Option<(usize, usize)> {
        if self.data.len() != self.rows {
            return Some((self.data.len().min(self.rows), 0));
        }
        self.data.iter()
            .position(|row| row.len() != self.cols)
            .map(|i| (i, self.data[i].len()))
    }

    pub fn numel(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Row-major iterator over every element.
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().flat_map(|row| row.iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.iter().sum()
    }

    pub fn map<F>(&self, functor: F) -> Matrix
    where
        F: Fn(f64) -> f64,
    {
        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data
                .iter()
                .map(|row| row.iter().map(|&x| functor(x)).collect())
                .collect()
        }
    }

    /// Combines two same-shape matrices element by element.
    pub fn zip_map<F>(&self, other: &Matrix, functor: F) -> Matrix
    where
        F: Fn(f64, f64) -> f64,
    {
        if self.shape() != other.shape() {
            panic!("Matrices are of incorrect sizes")
        }

        Matrix {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().zip(other.data.iter())
                .map(|(row_a, row_b)| {
                    row_a.iter().zip(row_b.iter()).map(|(&a, &b)| functor(a, b)).collect()
                })
                .collect()
        }
    }

    /// Element-wise (Hadamard) product of two same-shape matrices.
    pub fn hadamard(&self, other: &Matrix) -> Matrix {
        self.zip_map(other, |a, b| a * b)
    }

    pub fn scale(&self, factor: f64) -> Matrix {
        self.map(|x| x * factor)
    }

    /// Largest absolute element, or 0 for an empty matrix.
    pub fn max_abs(&self) -> f64 {
        self.iter().fold(0.0, |acc, x| acc.max(x.abs()))
    }
}

impl Add for Matrix {
    type Output = Matrix;

    fn add(self, rhs: Self) -> Self::Output {
        self.zip_map(&rhs, |a, b| a + b)
    }
}

impl Sub for Matrix {
    type Output = Matrix;

    fn sub(self, rhs: Self) -> Self::Output {
        self.zip_map(&rhs, |a, b| a - b)
    }
}
