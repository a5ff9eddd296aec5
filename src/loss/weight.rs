use crate::error::{LossError, LossResult};
use crate::loss::reduction::{LossValue, Reduction};
use crate::math::matrix::Matrix;

/// Added to every mean denominator so an all-zero weight or a zero
/// `avg_factor` yields 0 instead of NaN.
pub const MEAN_EPS: f64 = f32::EPSILON as f64;

/// Explicit weighting mode for an (N, C) loss.
///
/// The caller states which layout the values are in; nothing is inferred
/// from lengths.
#[derive(Debug, Clone, PartialEq)]
pub enum Weight {
    /// One value per row (e.g. per anchor), broadcast across every column.
    PerRow(Vec<f64>),
    /// One value per element, flattened row-major.
    PerElement(Vec<f64>),
}

impl Weight {
    pub fn mode(&self) -> &'static str {
        match self {
            Weight::PerRow(_)     => "per-row",
            Weight::PerElement(_) => "per-element",
        }
    }

    /// Expands the weight to a `rows x cols` matrix matching the loss.
    pub fn resolve(&self, rows: usize, cols: usize) -> LossResult<Matrix> {
        let mismatch = |got: usize| LossError::WeightShape {
            mode: self.mode(),
            expected: (rows, cols),
            got,
        };

        match self {
            Weight::PerRow(values) => {
                if values.len() != rows {
                    return Err(mismatch(values.len()));
                }
                let flat: Vec<f64> = values.iter()
                    .flat_map(|&w| std::iter::repeat(w).take(cols))
                    .collect();
                Matrix::from_flat(rows, cols, &flat).ok_or_else(|| mismatch(values.len()))
            }
            Weight::PerElement(values) => {
                let fits = if rows == 0 {
                    values.is_empty()
                } else {
                    values.len() % rows == 0 && values.len() / rows == cols
                };
                if !fits {
                    return Err(mismatch(values.len()));
                }
                Matrix::from_flat(rows, cols, values).ok_or_else(|| mismatch(values.len()))
            }
        }
    }
}

/// Applies an elementwise weight, then reduces.
///
/// `weight` must already have the loss's shape (see [`Weight::resolve`]).
/// `avg_factor` is only accepted with `Mean` or `None`; with `None` it is
/// ignored, with `Sum` it is an error.
pub fn weight_reduce_loss(
    loss: Matrix,
    weight: Option<&Matrix>,
    reduction: Reduction,
    avg_factor: Option<f64>,
) -> LossResult<LossValue> {
    let loss = match weight {
        Some(w) => {
            if w.shape() != loss.shape() {
                return Err(LossError::ShapeMismatch {
                    what: "weight",
                    expected: loss.shape(),
                    got: w.shape(),
                });
            }
            loss.hadamard(w)
        }
        None => loss,
    };

    match (reduction, avg_factor) {
        (Reduction::None, _) => Ok(LossValue::Elementwise(loss)),
        (Reduction::Sum, None) => Ok(LossValue::Scalar(loss.sum())),
        (Reduction::Sum, Some(_)) => Err(LossError::AvgFactorWithSum),
        (Reduction::Mean, Some(factor)) => Ok(LossValue::Scalar(loss.sum() / (factor + MEAN_EPS))),
        (Reduction::Mean, None) => {
            let total = loss.sum();
            let value = match weight {
                Some(w) => total / (w.sum() + MEAN_EPS),
                None if loss.is_empty() => 0.0,
                None => total / loss.numel() as f64,
            };
            Ok(LossValue::Scalar(value))
        }
    }
}
