use std::fmt;

use serde::{Serialize, Deserialize};
use tracing::{debug, trace};

use crate::error::{LossError, LossResult};
use crate::loss::kernel::{check_logits, Backend, FocalKernel, ReferenceKernel};
use crate::loss::reduction::{LossValue, ReduceArgs, Reduction};
use crate::loss::target::ClassTarget;
use crate::loss::weight::{weight_reduce_loss, Weight};
use crate::math::activation::{bce_with_logits, sigmoid};
use crate::math::matrix::Matrix;

/// Hyperparameters of a [`SigmoidFocalLoss`].
///
/// Missing fields take their defaults when deserialised, so
/// `{"gamma": 1.5}` is a complete config.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidFocalConfig {
    /// Must be `true`; softmax focal loss is not implemented.
    pub use_sigmoid: bool,
    /// Exponent of the modulating factor `(1 - p_t)^gamma`.
    pub gamma: f64,
    /// Weight of the positive class; negatives get `1 - alpha`.
    pub alpha: f64,
    pub reduction: Reduction,
    /// Multiplies the final loss.
    pub loss_weight: f64,
    pub backend: Backend,
}

impl Default for SigmoidFocalConfig {
    fn default() -> Self {
        SigmoidFocalConfig {
            use_sigmoid: true,
            gamma: 2.0,
            alpha: 0.25,
            reduction: Reduction::Mean,
            loss_weight: 1.0,
            backend: Backend::Auto,
        }
    }
}

/// Sigmoid focal loss (Lin et al., "Focal Loss for Dense Object Detection").
///
/// Hyperparameters and the kernel are fixed at construction.
pub struct SigmoidFocalLoss {
    config: SigmoidFocalConfig,
    kernel: Box<dyn FocalKernel>,
}

impl fmt::Debug for SigmoidFocalLoss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigmoidFocalLoss")
            .field("config", &self.config)
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

impl SigmoidFocalLoss {
    pub fn new(config: SigmoidFocalConfig) -> LossResult<SigmoidFocalLoss> {
        if !config.use_sigmoid {
            return Err(LossError::SigmoidRequired);
        }
        let kernel = config.backend.kernel()?;
        debug!(
            gamma = config.gamma,
            alpha = config.alpha,
            reduction = %config.reduction,
            loss_weight = config.loss_weight,
            kernel = kernel.name(),
            "built sigmoid focal loss"
        );
        Ok(SigmoidFocalLoss { config, kernel })
    }

    pub fn config(&self) -> &SigmoidFocalConfig {
        &self.config
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Focal loss of `pred` (N, C logits) against `target`.
    ///
    /// Returns the elementwise loss for `Reduction::None`, a scalar otherwise;
    /// either way scaled by `loss_weight`.
    pub fn forward(
        &self,
        pred: &Matrix,
        target: ClassTarget<'_>,
        weight: Option<&Weight>,
        args: ReduceArgs,
    ) -> LossResult<LossValue> {
        focal_loss_with(self.kernel.as_ref(), &self.config, pred, target, weight, args)
    }

    /// dL/dpred of the elementwise focal term, before weighting, reduction
    /// and `loss_weight`.
    pub fn derivative(&self, pred: &Matrix, target: ClassTarget<'_>) -> LossResult<Matrix> {
        sigmoid_focal_derivative(pred, target, self.config.gamma, self.config.alpha)
    }
}

/// Evaluates a focal loss straight from a config, without building a
/// [`SigmoidFocalLoss`]. Only the sigmoid form is implemented.
pub fn focal_loss(
    config: &SigmoidFocalConfig,
    pred: &Matrix,
    target: ClassTarget<'_>,
    weight: Option<&Weight>,
    args: ReduceArgs,
) -> LossResult<LossValue> {
    let kernel = config.backend.kernel()?;
    focal_loss_with(kernel.as_ref(), config, pred, target, weight, args)
}

fn focal_loss_with(
    kernel: &dyn FocalKernel,
    config: &SigmoidFocalConfig,
    pred: &Matrix,
    target: ClassTarget<'_>,
    weight: Option<&Weight>,
    args: ReduceArgs,
) -> LossResult<LossValue> {
    if !config.use_sigmoid {
        return Err(LossError::Unimplemented("softmax focal loss"));
    }
    let reduction = args.reduction_or(config.reduction);
    let loss = sigmoid_focal_loss(
        kernel,
        pred,
        target,
        weight,
        config.gamma,
        config.alpha,
        reduction,
        args.avg_factor,
    )?;
    trace!(kernel = kernel.name(), rows = pred.rows, cols = pred.cols, %reduction, loss = %loss, "sigmoid focal forward");
    Ok(loss.scale(config.loss_weight))
}

/// Sigmoid focal loss on the given kernel, weighted and reduced.
#[allow(clippy::too_many_arguments)]
pub fn sigmoid_focal_loss(
    kernel: &dyn FocalKernel,
    pred: &Matrix,
    target: ClassTarget<'_>,
    weight: Option<&Weight>,
    gamma: f64,
    alpha: f64,
    reduction: Reduction,
    avg_factor: Option<f64>,
) -> LossResult<LossValue> {
    let loss = kernel.forward(pred, target, gamma, alpha)?;
    let weight = weight.map(|w| w.resolve(loss.rows, loss.cols)).transpose()?;
    weight_reduce_loss(loss, weight.as_ref(), reduction, avg_factor)
}

/// [`sigmoid_focal_loss`] pinned to the reference kernel.
pub fn reference_sigmoid_focal_loss(
    pred: &Matrix,
    target: ClassTarget<'_>,
    weight: Option<&Weight>,
    gamma: f64,
    alpha: f64,
    reduction: Reduction,
    avg_factor: Option<f64>,
) -> LossResult<LossValue> {
    sigmoid_focal_loss(&ReferenceKernel, pred, target, weight, gamma, alpha, reduction, avg_factor)
}

/// Per-element gradient of the focal term w.r.t. the logit:
///
///   w · [γ·pt^(γ-1)·(1-2t)·p(1-p)·bce + pt^γ·(p - t)]
///
/// with `w = αt + (1-α)(1-t)` and `pt = (1-p)t + p(1-t)`.
pub fn sigmoid_focal_derivative(
    pred: &Matrix,
    target: ClassTarget<'_>,
    gamma: f64,
    alpha: f64,
) -> LossResult<Matrix> {
    check_logits(pred)?;
    let target = target.to_dense(pred.rows, pred.cols)?;
    Ok(pred.zip_map(&target, |x, t| {
        let p = sigmoid(x);
        let pt = (1.0 - p) * t + p * (1.0 - t);
        let w = alpha * t + (1.0 - alpha) * (1.0 - t);
        // γ = 0 drops the modulating term; skip it so pt = 0 can't make 0·∞.
        let d_modulating = if gamma == 0.0 {
            0.0
        } else {
            gamma * pt.powf(gamma - 1.0) * (1.0 - 2.0 * t) * p * (1.0 - p)
        };
        w * (d_modulating * bce_with_logits(x, t) + pt.powf(gamma) * (p - t))
    }))
}
