use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::{LossError, LossResult};
use crate::loss::target::ClassTarget;
use crate::math::activation::{bce_with_logits, sigmoid};
use crate::math::matrix::Matrix;

/// Computes the unreduced sigmoid focal loss for an (N, C) logit matrix.
///
/// Implementations must agree elementwise on every valid input; the choice
/// between them is purely about how the work is laid out.
pub trait FocalKernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn forward(
        &self,
        pred: &Matrix,
        target: ClassTarget<'_>,
        gamma: f64,
        alpha: f64,
    ) -> LossResult<Matrix>;
}

/// Formula-by-formula evaluation over whole matrices.
///
/// Class-index targets are expanded to one-hot first. Slower and allocates
/// every intermediate, which makes it the one to step through when the
/// numbers look wrong.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernel;

impl FocalKernel for ReferenceKernel {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn forward(
        &self,
        pred: &Matrix,
        target: ClassTarget<'_>,
        gamma: f64,
        alpha: f64,
    ) -> LossResult<Matrix> {
        check_logits(pred)?;
        let target = target.to_dense(pred.rows, pred.cols)?;

        let p = pred.map(sigmoid);
        let one_minus_p = p.map(|v| 1.0 - v);
        let one_minus_t = target.map(|v| 1.0 - v);

        // Distance of the prediction from the correct label.
        let pt = one_minus_p.hadamard(&target) + p.hadamard(&one_minus_t);
        let alpha_factor = target.map(|v| alpha * v) + one_minus_t.map(|v| (1.0 - alpha) * v);
        let focal_weight = alpha_factor.hadamard(&pt.map(|v| v.powf(gamma)));

        let bce = pred.zip_map(&target, bce_with_logits);
        Ok(bce.hadamard(&focal_weight))
    }
}

/// Single pass over the logits, one output element per step, reading class
/// indices in place without building a one-hot matrix.
#[derive(Debug, Clone, Copy, Default)]
pub struct FusedKernel;

impl FusedKernel {
    /// Whether this build carries the fused kernel (`fused` cargo feature).
    pub fn is_available() -> bool {
        cfg!(feature = "fused")
    }
}

impl FocalKernel for FusedKernel {
    fn name(&self) -> &'static str {
        "fused"
    }

    fn forward(
        &self,
        pred: &Matrix,
        target: ClassTarget<'_>,
        gamma: f64,
        alpha: f64,
    ) -> LossResult<Matrix> {
        check_logits(pred)?;
        target.validate(pred.rows, pred.cols)?;

        let mut out = Matrix::zeros(pred.rows, pred.cols);
        for (i, row) in pred.data.iter().enumerate() {
            for (j, &x) in row.iter().enumerate() {
                out.data[i][j] = focal_term(x, target.value_at(i, j), gamma, alpha);
            }
        }
        Ok(out)
    }
}

/// Rejects a logit matrix whose rows disagree with its `cols`.
pub(crate) fn check_logits(pred: &Matrix) -> LossResult<()> {
    match pred.ragged_row() {
        Some((row, len)) => Err(LossError::ShapeMismatch {
            what: "pred row",
            expected: (row, pred.cols),
            got: (row, len),
        }),
        None => Ok(()),
    }
}

#[inline]
fn focal_term(x: f64, t: f64, gamma: f64, alpha: f64) -> f64 {
    let p = sigmoid(x);
    let pt = (1.0 - p) * t + p * (1.0 - t);
    let focal_weight = (alpha * t + (1.0 - alpha) * (1.0 - t)) * pt.powf(gamma);
    bce_with_logits(x, t) * focal_weight
}

/// Which kernel a sigmoid focal loss runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    /// Fused when available, reference otherwise.
    #[default]
    Auto,
    Fused,
    Reference,
}

impl Backend {
    /// Resolves `Auto` against what this build provides.
    pub fn resolve(self) -> LossResult<Backend> {
        match self {
            Backend::Auto if FusedKernel::is_available() => Ok(Backend::Fused),
            Backend::Auto => Ok(Backend::Reference),
            Backend::Fused if !FusedKernel::is_available() => {
                Err(LossError::Unimplemented("fused focal kernel in this build"))
            }
            other => Ok(other),
        }
    }

    pub fn kernel(self) -> LossResult<Box<dyn FocalKernel>> {
        let resolved = self.resolve()?;
        debug!(requested = ?self, resolved = ?resolved, "selected focal kernel");
        Ok(match resolved {
            Backend::Reference => Box::new(ReferenceKernel),
            Backend::Fused | Backend::Auto => Box::new(FusedKernel),
        })
    }
}
