//! Error types for loss construction and evaluation.

use thiserror::Error;

/// Every way a loss call can violate its contract.
///
/// None of these are transient: retrying with the same arguments fails the
/// same way.
#[derive(Error, Debug)]
pub enum LossError {
    /// Reduction name outside `none`, `mean`, `sum`.
    #[error("invalid reduction '{0}', expected one of: none, mean, sum")]
    InvalidReduction(String),

    /// Focal loss was configured with `use_sigmoid = false`.
    #[error("only sigmoid focal loss is supported")]
    SigmoidRequired,

    /// A code path that exists in the interface but has no implementation.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),

    /// Two operands that must agree in shape do not.
    #[error("{what}: expected shape {expected:?}, got {got:?}")]
    ShapeMismatch {
        what: &'static str,
        expected: (usize, usize),
        got: (usize, usize),
    },

    /// A weight could not be resolved against the loss it applies to.
    #[error("{mode} weight does not fit loss of shape {expected:?}: got {got} values")]
    WeightShape {
        mode: &'static str,
        expected: (usize, usize),
        got: usize,
    },

    /// Class index above the background index `num_classes`.
    #[error("class label {label} out of range for {num_classes} classes")]
    LabelOutOfRange { label: usize, num_classes: usize },

    /// Positive index beyond the end of the heatmap.
    #[error("positive index {index} out of range for heatmap of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// `avg_factor` only makes sense for mean reduction.
    #[error("avg_factor can not be used with reduction = sum")]
    AvgFactorWithSum,

    /// Hyperparameter outside its valid range.
    #[error("invalid loss config: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for loss operations.
pub type LossResult<T> = Result<T, LossError>;
