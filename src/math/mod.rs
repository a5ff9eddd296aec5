pub mod activation;
pub mod matrix;

pub use activation::{bce_with_logits, sigmoid, softplus};
pub use matrix::Matrix;
