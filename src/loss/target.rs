use crate::error::{LossError, LossResult};
use crate::math::matrix::Matrix;

/// Classification target for an (N, C) prediction.
#[derive(Debug, Clone, Copy)]
pub enum ClassTarget<'a> {
    /// Binary or soft labels with the prediction's shape.
    Dense(&'a Matrix),
    /// One class index per row. Index `C` is background and maps to an
    /// all-zero row.
    Labels(&'a [usize]),
}

impl ClassTarget<'_> {
    /// Checks the target against a prediction of shape `(rows, num_classes)`.
    pub fn validate(&self, rows: usize, num_classes: usize) -> LossResult<()> {
        match self {
            ClassTarget::Dense(target) => {
                if target.shape() != (rows, num_classes) {
                    return Err(LossError::ShapeMismatch {
                        what: "target",
                        expected: (rows, num_classes),
                        got: target.shape(),
                    });
                }
                if let Some((row, len)) = target.ragged_row() {
                    return Err(LossError::ShapeMismatch {
                        what: "target row",
                        expected: (row, num_classes),
                        got: (row, len),
                    });
                }
            }
            ClassTarget::Labels(labels) => {
                if labels.len() != rows {
                    return Err(LossError::ShapeMismatch {
                        what: "labels",
                        expected: (rows, 1),
                        got: (labels.len(), 1),
                    });
                }
                if let Some(&label) = labels.iter().find(|&&l| l > num_classes) {
                    return Err(LossError::LabelOutOfRange { label, num_classes });
                }
            }
        }
        Ok(())
    }

    /// Dense (N, C) view of the target.
    pub fn to_dense(&self, rows: usize, num_classes: usize) -> LossResult<Matrix> {
        self.validate(rows, num_classes)?;
        match self {
            ClassTarget::Dense(target) => Ok((*target).clone()),
            ClassTarget::Labels(labels) => one_hot(labels, num_classes),
        }
    }

    /// Target value at `(row, col)`. Callers validate first.
    pub(crate) fn value_at(&self, row: usize, col: usize) -> f64 {
        match self {
            ClassTarget::Dense(target) => target.data[row][col],
            ClassTarget::Labels(labels) => if labels[row] == col { 1.0 } else { 0.0 },
        }
    }
}

/// One-hot encodes `labels` over `num_classes + 1` channels and drops the
/// trailing background channel, giving an (N, num_classes) matrix.
pub fn one_hot(labels: &[usize], num_classes: usize) -> LossResult<Matrix> {
    let mut res = Matrix::zeros(labels.len(), num_classes);
    for (i, &label) in labels.iter().enumerate() {
        match label.cmp(&num_classes) {
            std::cmp::Ordering::Less => res.data[i][label] = 1.0,
            std::cmp::Ordering::Equal => {}
            std::cmp::Ordering::Greater => {
                return Err(LossError::LabelOutOfRange { label, num_classes });
            }
        }
    }
    Ok(res)
}
