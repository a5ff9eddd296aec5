use serde::{Serialize, Deserialize};
use tracing::{debug, trace};

use crate::error::{LossError, LossResult};
use crate::loss::reduction::{LossValue, ReduceArgs, Reduction};
use crate::loss::weight::{weight_reduce_loss, Weight};
use crate::math::activation::sigmoid;
use crate::math::matrix::Matrix;

/// Hyperparameters of a [`HeatmapFocalLoss`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeatmapFocalConfig {
    /// Positive/negative balance. Negative disables the `-alpha` /
    /// `-(1 - alpha)` scaling, leaving both terms unsigned.
    pub alpha: f64,
    /// Exponent of `(1 - target)` down-weighting negatives near a peak.
    pub beta: f64,
    /// Exponent of the modulating factor on both terms.
    pub gamma: f64,
    /// Multiplies both returned losses.
    pub weight: f64,
    /// Predictions are clamped to `[sigmoid_clamp, 1 - sigmoid_clamp]`.
    pub sigmoid_clamp: f64,
    /// When positive, negatives predicted at or above this score are not
    /// penalised.
    pub ignore_high_fp: f64,
    pub reduction: Reduction,
}

impl Default for HeatmapFocalConfig {
    fn default() -> Self {
        HeatmapFocalConfig {
            alpha: 0.25,
            beta: 4.0,
            gamma: 2.0,
            weight: 1.0,
            sigmoid_clamp: 1e-4,
            ignore_high_fp: -1.0,
            reduction: Reduction::Mean,
        }
    }
}

/// Binary focal loss over a Gaussian target heatmap, as used by center-point
/// heads (Zhou et al., "Probabilistic two-stage detection").
///
/// Only the locations in `pos_inds` contribute a positive term; every
/// location contributes a negative term, damped by `(1 - target)^beta`.
#[derive(Debug, Clone)]
pub struct HeatmapFocalLoss {
    config: HeatmapFocalConfig,
}

impl HeatmapFocalLoss {
    pub fn new(config: HeatmapFocalConfig) -> LossResult<HeatmapFocalLoss> {
        let clamp = config.sigmoid_clamp;
        // Zero would let ln(0) through on a saturated logit.
        if clamp.is_nan() || clamp <= 0.0 || clamp >= 0.5 {
            return Err(LossError::Config(format!(
                "sigmoid_clamp must be in (0, 0.5), got {clamp}"
            )));
        }
        debug!(
            alpha = config.alpha,
            beta = config.beta,
            gamma = config.gamma,
            weight = config.weight,
            sigmoid_clamp = clamp,
            ignore_high_fp = config.ignore_high_fp,
            reduction = %config.reduction,
            "built heatmap focal loss"
        );
        Ok(HeatmapFocalLoss { config })
    }

    pub fn config(&self) -> &HeatmapFocalConfig {
        &self.config
    }

    /// `(1 - target)^beta` for every location.
    pub fn neg_weights(&self, targets: &[f64]) -> Vec<f64> {
        targets.iter().map(|&t| (1.0 - t).powf(self.config.beta)).collect()
    }

    /// Returns `(pos_loss, neg_loss)`, each reduced on its own.
    ///
    /// `inputs` are raw logits of the flattened heatmap and are not modified.
    /// `pos_weight` applies to the `pos_inds.len()` positive terms,
    /// `neg_weight` to all `inputs.len()` negative terms.
    pub fn forward(
        &self,
        inputs: &[f64],
        targets: &[f64],
        pos_inds: &[usize],
        pos_weight: Option<&Weight>,
        neg_weight: Option<&Weight>,
        args: ReduceArgs,
    ) -> LossResult<(LossValue, LossValue)> {
        let len = inputs.len();
        if targets.len() != len {
            return Err(LossError::ShapeMismatch {
                what: "heatmap targets",
                expected: (1, len),
                got: (1, targets.len()),
            });
        }
        if let Some(&index) = pos_inds.iter().find(|&&i| i >= len) {
            return Err(LossError::IndexOutOfRange { index, len });
        }

        let HeatmapFocalConfig { alpha, gamma, sigmoid_clamp, ignore_high_fp, .. } = self.config;
        let reduction = args.reduction_or(self.config.reduction);

        let pred: Vec<f64> = inputs.iter()
            .map(|&x| sigmoid(x).clamp(sigmoid_clamp, 1.0 - sigmoid_clamp))
            .collect();

        let mut pos_loss: Vec<f64> = pos_inds.iter()
            .map(|&i| {
                let p = pred[i];
                p.ln() * (1.0 - p).powf(gamma)
            })
            .collect();

        let mut neg_loss: Vec<f64> = pred.iter().zip(self.neg_weights(targets))
            .map(|(&p, w)| (1.0 - p).ln() * p.powf(gamma) * w)
            .collect();

        if ignore_high_fp > 0.0 {
            for (loss, &p) in neg_loss.iter_mut().zip(pred.iter()) {
                if p >= ignore_high_fp {
                    *loss = 0.0;
                }
            }
        }

        // Open question: with alpha < 0 both terms stay unsigned (ln p <= 0).
        if alpha >= 0.0 {
            pos_loss.iter_mut().for_each(|l| *l *= -alpha);
            neg_loss.iter_mut().for_each(|l| *l *= -(1.0 - alpha));
        }

        let pos_weight = pos_weight.map(|w| w.resolve(1, pos_loss.len())).transpose()?;
        let neg_weight = neg_weight.map(|w| w.resolve(1, neg_loss.len())).transpose()?;

        let pos = weight_reduce_loss(Matrix::row_vector(pos_loss), pos_weight.as_ref(), reduction, args.avg_factor)?
            .scale(self.config.weight);
        let neg = weight_reduce_loss(Matrix::row_vector(neg_loss), neg_weight.as_ref(), reduction, args.avg_factor)?
            .scale(self.config.weight);

        trace!(len, positives = pos_inds.len(), %reduction, pos = %pos, neg = %neg, "heatmap focal forward");
        Ok((pos, neg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn default_loss() -> HeatmapFocalLoss {
        HeatmapFocalLoss::new(HeatmapFocalConfig::default()).unwrap()
    }

    fn with(config: HeatmapFocalConfig) -> HeatmapFocalLoss {
        HeatmapFocalLoss::new(config).unwrap()
    }

    // A 1-D Gaussian bump peaking at index 2.
    fn heatmap() -> (Vec<f64>, Vec<f64>, Vec<usize>) {
        let inputs = vec![-3.0, 0.5, 2.0, 1.0, -1.5, 4.0];
        let targets = vec![0.0, 0.6, 1.0, 0.6, 0.1, 0.0];
        (inputs, targets, vec![2])
    }

    #[test]
    fn single_positive_pixel() {
        let (pos, neg) = default_loss()
            .forward(&[0.0], &[1.0], &[0], None, None, ReduceArgs::default())
            .unwrap();
        let expected = -0.25 * 0.5f64.ln() * 0.5f64.powi(2);
        assert_relative_eq!(pos.as_scalar().unwrap(), expected, max_relative = 1e-12);
        assert_eq!(neg.as_scalar().unwrap(), 0.0);
    }

    #[test]
    fn disabled_ignore_high_fp_is_a_no_op() {
        let (inputs, targets, pos_inds) = heatmap();
        let (_, neg) = default_loss()
            .forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default().with_reduction(Reduction::None))
            .unwrap();

        let expected: Vec<f64> = inputs.iter().zip(targets.iter())
            .map(|(&x, &t)| {
                let p = sigmoid(x).clamp(1e-4, 1.0 - 1e-4);
                -0.75 * (1.0 - p).ln() * p.powi(2) * (1.0 - t).powi(4)
            })
            .collect();
        for (got, want) in neg.as_elementwise().unwrap().iter().zip(expected) {
            assert_relative_eq!(got, want, epsilon = 1e-15, max_relative = 1e-12);
        }
    }

    #[test]
    fn ignore_high_fp_zeroes_confident_negatives() {
        let (inputs, targets, pos_inds) = heatmap();
        let args = ReduceArgs::default().with_reduction(Reduction::None);
        let (_, plain) = default_loss().forward(&inputs, &targets, &pos_inds, None, None, args).unwrap();
        let (_, ignored) = with(HeatmapFocalConfig { ignore_high_fp: 0.85, ..Default::default() })
            .forward(&inputs, &targets, &pos_inds, None, None, args)
            .unwrap();

        let plain = plain.as_elementwise().unwrap();
        let ignored = ignored.as_elementwise().unwrap();
        for (i, &x) in inputs.iter().enumerate() {
            if sigmoid(x) >= 0.85 {
                assert_eq!(ignored.data[0][i], 0.0);
            } else {
                assert_eq!(ignored.data[0][i], plain.data[0][i]);
            }
        }
        // sigmoid(4.0) is the only confident negative with a nonzero penalty.
        assert!(plain.data[0][5] > 0.0);
        assert_eq!(ignored.data[0][5], 0.0);
    }

    #[test]
    fn larger_beta_damps_soft_negatives_harder() {
        let (_, targets, _) = heatmap();
        let low = with(HeatmapFocalConfig { beta: 2.0, ..Default::default() }).neg_weights(&targets);
        let high = with(HeatmapFocalConfig { beta: 4.0, ..Default::default() }).neg_weights(&targets);

        for ((&t, l), h) in targets.iter().zip(low).zip(high) {
            if t == 1.0 {
                assert_eq!(l, 0.0);
                assert_eq!(h, 0.0);
            } else if t > 0.0 {
                assert!(h < l, "target {t}: beta 4 gave {h}, beta 2 gave {l}");
            }
        }
    }

    #[test]
    fn negative_alpha_leaves_terms_unsigned() {
        let (inputs, targets, pos_inds) = heatmap();
        let (pos, neg) = with(HeatmapFocalConfig { alpha: -1.0, reduction: Reduction::Sum, ..Default::default() })
            .forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default())
            .unwrap();
        assert!(pos.as_scalar().unwrap() < 0.0);
        assert!(neg.as_scalar().unwrap() < 0.0);
    }

    #[test]
    fn avg_factor_is_shared_by_both_sides() {
        let (inputs, targets, pos_inds) = heatmap();
        let loss = with(HeatmapFocalConfig { reduction: Reduction::Sum, ..Default::default() });
        let (pos_sum, neg_sum) = loss.forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default()).unwrap();

        let args = ReduceArgs::default().with_reduction(Reduction::Mean).with_avg_factor(4.0);
        let (pos, neg) = loss.forward(&inputs, &targets, &pos_inds, None, None, args).unwrap();
        assert_relative_eq!(pos.as_scalar().unwrap(), pos_sum.total() / 4.0, max_relative = 1e-6);
        assert_relative_eq!(neg.as_scalar().unwrap(), neg_sum.total() / 4.0, max_relative = 1e-6);
    }

    #[test]
    fn side_weights_apply_independently() {
        let (inputs, targets, _) = heatmap();
        let pos_inds = [2, 3];
        let loss = with(HeatmapFocalConfig { reduction: Reduction::Sum, weight: 2.0, ..Default::default() });
        let args = ReduceArgs::default();

        let (pos, neg) = loss.forward(&inputs, &targets, &pos_inds, None, None, args).unwrap();
        let pos_w = Weight::PerElement(vec![1.0, 0.0]);
        let (pos_only_first, neg_same) = loss
            .forward(&inputs, &targets, &pos_inds, Some(&pos_w), None, args)
            .unwrap();
        assert_eq!(neg_same, neg);
        assert!(pos_only_first.total() < pos.total());

        let first = loss.forward(&inputs, &targets, &[2], None, None, args).unwrap().0;
        assert_relative_eq!(pos_only_first.total(), first.total(), max_relative = 1e-12);

        let err = loss
            .forward(&inputs, &targets, &pos_inds, None, Some(&Weight::PerElement(vec![1.0; 3])), args)
            .unwrap_err();
        assert!(matches!(err, LossError::WeightShape { .. }));
    }

    #[test]
    fn overall_weight_scales_both_losses() {
        let (inputs, targets, pos_inds) = heatmap();
        let args = ReduceArgs::default();
        let (p1, n1) = default_loss().forward(&inputs, &targets, &pos_inds, None, None, args).unwrap();
        let (p3, n3) = with(HeatmapFocalConfig { weight: 3.0, ..Default::default() })
            .forward(&inputs, &targets, &pos_inds, None, None, args)
            .unwrap();
        assert_relative_eq!(p3.total(), 3.0 * p1.total(), max_relative = 1e-12);
        assert_relative_eq!(n3.total(), 3.0 * n1.total(), max_relative = 1e-12);
    }

    #[test]
    fn clamp_keeps_extreme_logits_finite() {
        let inputs = [60.0, -60.0];
        let targets = [1.0, 0.0];
        let (pos, neg) = default_loss()
            .forward(&inputs, &targets, &[0], None, None, ReduceArgs::default().with_reduction(Reduction::Sum))
            .unwrap();
        assert!(pos.total().is_finite());
        assert!(neg.total().is_finite());
    }

    #[test]
    fn empty_positive_set_reduces_to_zero() {
        let (inputs, targets, _) = heatmap();
        let (pos, _) = default_loss().forward(&inputs, &targets, &[], None, None, ReduceArgs::default()).unwrap();
        assert_eq!(pos.as_scalar(), Some(0.0));
    }

    #[test]
    fn rejects_malformed_inputs() {
        let loss = default_loss();
        let err = loss.forward(&[0.0, 1.0], &[1.0], &[0], None, None, ReduceArgs::default()).unwrap_err();
        assert!(matches!(err, LossError::ShapeMismatch { what: "heatmap targets", .. }));

        let err = loss.forward(&[0.0], &[1.0], &[1], None, None, ReduceArgs::default()).unwrap_err();
        assert!(matches!(err, LossError::IndexOutOfRange { index: 1, len: 1 }));

        for clamp in [0.0, 0.5, -1e-4, f64::NAN] {
            let err = HeatmapFocalLoss::new(HeatmapFocalConfig { sigmoid_clamp: clamp, ..Default::default() }).unwrap_err();
            assert!(matches!(err, LossError::Config(_)), "clamp {clamp} was accepted");
        }
    }

    #[test]
    fn saturated_logit_on_peak_keeps_negative_term_finite() {
        for clamp in [1e-4, 1e-12] {
            let (pos, neg) = with(HeatmapFocalConfig { sigmoid_clamp: clamp, ..Default::default() })
                .forward(&[40.0], &[1.0], &[0], None, None, ReduceArgs::default().with_reduction(Reduction::Sum))
                .unwrap();
            assert!(pos.total().is_finite());
            assert_eq!(neg.total(), 0.0);
        }
    }

    #[test]
    fn neg_weight_masks_part_of_the_negative_loss() {
        let (inputs, targets, pos_inds) = heatmap();
        let loss = with(HeatmapFocalConfig { reduction: Reduction::Sum, ..Default::default() });
        let per_pixel = loss
            .forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default().with_reduction(Reduction::None))
            .unwrap()
            .1;
        let per_pixel = per_pixel.as_elementwise().unwrap();

        // Keep only the last three pixels.
        let mask = Weight::PerElement(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]);
        let (pos_masked, neg_masked) = loss
            .forward(&inputs, &targets, &pos_inds, None, Some(&mask), ReduceArgs::default())
            .unwrap();
        let (pos, neg) = loss.forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default()).unwrap();

        let kept: f64 = per_pixel.data[0][3..].iter().sum();
        assert_relative_eq!(neg_masked.total(), kept, max_relative = 1e-12);
        assert!(neg_masked.total() < neg.total());
        assert_eq!(pos_masked, pos);
    }

    #[test]
    fn inputs_are_not_mutated() {
        let (inputs, targets, pos_inds) = heatmap();
        let before = inputs.clone();
        default_loss().forward(&inputs, &targets, &pos_inds, None, None, ReduceArgs::default()).unwrap();
        assert_eq!(inputs, before);
    }
}
