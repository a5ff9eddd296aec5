pub mod spec;

pub use spec::{LossModule, LossSpec};
