pub mod config;
pub mod error;
pub mod loss;
pub mod math;

// Convenience re-exports
pub use config::spec::{LossModule, LossSpec};
pub use error::{LossError, LossResult};
pub use loss::{
    Backend, ClassTarget, HeatmapFocalConfig, HeatmapFocalLoss, LossValue, ReduceArgs, Reduction,
    SigmoidFocalConfig, SigmoidFocalLoss, Weight,
};
pub use math::matrix::Matrix;
