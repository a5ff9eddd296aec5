pub mod heatmap_focal;
pub mod kernel;
pub mod reduction;
pub mod sigmoid_focal;
pub mod target;
pub mod weight;

pub use heatmap_focal::{HeatmapFocalConfig, HeatmapFocalLoss};
pub use kernel::{Backend, FocalKernel, FusedKernel, ReferenceKernel};
pub use reduction::{LossValue, ReduceArgs, Reduction};
pub use sigmoid_focal::{
    focal_loss, reference_sigmoid_focal_loss, sigmoid_focal_derivative, sigmoid_focal_loss,
    SigmoidFocalConfig, SigmoidFocalLoss,
};
pub use target::{one_hot, ClassTarget};
pub use weight::{weight_reduce_loss, Weight};
