use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Deserialize};

use crate::error::{LossError, LossResult};
use crate::math::matrix::Matrix;

/// How an elementwise loss is collapsed.
///
/// - `None`: return the (weighted) elementwise loss unchanged.
/// - `Mean`: divide the sum by `avg_factor`, the weight sum, or the element
///   count, in that order of precedence.
/// - `Sum`: sum every element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reduction {
    None,
    #[default]
    Mean,
    Sum,
}

impl Reduction {
    pub fn as_str(self) -> &'static str {
        match self {
            Reduction::None => "none",
            Reduction::Mean => "mean",
            Reduction::Sum  => "sum",
        }
    }
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Reduction {
    type Err = LossError;

    fn from_str(s: &str) -> LossResult<Self> {
        match s {
            "none" => Ok(Reduction::None),
            "mean" => Ok(Reduction::Mean),
            "sum"  => Ok(Reduction::Sum),
            other  => Err(LossError::InvalidReduction(other.to_string())),
        }
    }
}

/// Per-call reduction arguments shared by every loss in the crate.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReduceArgs {
    /// Denominator override for `mean` (e.g. the number of positives).
    pub avg_factor: Option<f64>,
    /// Replaces the loss's configured reduction for this call only.
    pub reduction_override: Option<Reduction>,
}

impl ReduceArgs {
    pub fn with_avg_factor(mut self, avg_factor: f64) -> Self {
        self.avg_factor = Some(avg_factor);
        self
    }

    pub fn with_reduction(mut self, reduction: Reduction) -> Self {
        self.reduction_override = Some(reduction);
        self
    }

    /// The reduction to apply given the loss's configured default.
    pub fn reduction_or(&self, default: Reduction) -> Reduction {
        self.reduction_override.unwrap_or(default)
    }
}

/// Output of a loss call: the elementwise tensor for `Reduction::None`,
/// otherwise a scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum LossValue {
    Elementwise(Matrix),
    Scalar(f64),
}

impl LossValue {
    pub fn scale(self, factor: f64) -> LossValue {
        match self {
            LossValue::Elementwise(m) => LossValue::Elementwise(m.scale(factor)),
            LossValue::Scalar(v)      => LossValue::Scalar(v * factor),
        }
    }

    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            LossValue::Scalar(v) => Some(*v),
            LossValue::Elementwise(_) => None,
        }
    }

    pub fn as_elementwise(&self) -> Option<&Matrix> {
        match self {
            LossValue::Elementwise(m) => Some(m),
            LossValue::Scalar(_) => None,
        }
    }

    /// Scalar value, or the sum of the elementwise tensor.
    pub fn total(&self) -> f64 {
        match self {
            LossValue::Elementwise(m) => m.sum(),
            LossValue::Scalar(v)      => *v,
        }
    }
}

impl fmt::Display for LossValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LossValue::Scalar(v) => write!(f, "{v:.6}"),
            LossValue::Elementwise(m) => {
                write!(f, "[{}x{}] sum={:.6}", m.rows, m.cols, m.sum())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_reductions() {
        assert_eq!("none".parse::<Reduction>().unwrap(), Reduction::None);
        assert_eq!("mean".parse::<Reduction>().unwrap(), Reduction::Mean);
        assert_eq!("sum".parse::<Reduction>().unwrap(), Reduction::Sum);
    }

    #[test]
    fn rejects_unknown_reduction() {
        let err = "avg".parse::<Reduction>().unwrap_err();
        assert!(matches!(err, LossError::InvalidReduction(ref s) if s == "avg"));
        assert!("Mean".parse::<Reduction>().is_err());
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&Reduction::Sum).unwrap(), "\"sum\"");
        let r: Reduction = serde_json::from_str("\"none\"").unwrap();
        assert_eq!(r, Reduction::None);
        assert!(serde_json::from_str::<Reduction>("\"max\"").is_err());
    }

    #[test]
    fn override_takes_precedence() {
        let args = ReduceArgs::default();
        assert_eq!(args.reduction_or(Reduction::Mean), Reduction::Mean);
        let args = args.with_reduction(Reduction::Sum);
        assert_eq!(args.reduction_or(Reduction::Mean), Reduction::Sum);
    }

    #[test]
    fn scale_applies_to_both_shapes() {
        assert_eq!(LossValue::Scalar(2.0).scale(1.5), LossValue::Scalar(3.0));
        let m = Matrix::filled(1, 2, 1.0);
        let scaled = LossValue::Elementwise(m).scale(3.0);
        assert_eq!(scaled.total(), 6.0);
        assert!(scaled.as_scalar().is_none());
    }
}
