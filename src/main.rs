// Evaluates a loss spec on a few fixed scenarios.
// Run with:
//   cargo run -- path/to/loss.json
//   RUST_LOG=debug cargo run
// Without a path both built-in losses run with default hyperparameters.
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use ferrite_focal::loss::{FocalKernel, FusedKernel, ReferenceKernel};
use ferrite_focal::{
    ClassTarget, HeatmapFocalConfig, HeatmapFocalLoss, LossModule, LossResult, LossSpec, Matrix,
    ReduceArgs, SigmoidFocalConfig, SigmoidFocalLoss,
};

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(spec_path: Option<String>) -> LossResult<()> {
    let specs = match spec_path {
        Some(path) => {
            info!(%path, "loading loss spec");
            vec![LossSpec::load_json(&path)?]
        }
        None => vec![
            LossSpec::SigmoidFocal(SigmoidFocalConfig::default()),
            LossSpec::HeatmapFocal(HeatmapFocalConfig::default()),
        ],
    };

    for spec in &specs {
        match spec.build()? {
            LossModule::SigmoidFocal(loss) => run_sigmoid_focal(&loss)?,
            LossModule::HeatmapFocal(loss) => run_heatmap_focal(&loss)?,
        }
    }
    Ok(())
}

fn run_sigmoid_focal(loss: &SigmoidFocalLoss) -> LossResult<()> {
    println!("FocalLoss ({} kernel, {:?})", loss.kernel_name(), loss.config());

    let pred = Matrix::from_data(vec![vec![2.0, -2.0]]);
    let value = loss.forward(&pred, ClassTarget::Labels(&[0]), None, ReduceArgs::default())?;
    println!("  pred [[2, -2]], label 0        -> {value}");

    // Random batch: both kernels on the same logits.
    let (rows, classes) = (64, 8);
    let pred = Matrix::random(rows, classes, 6.0);
    let labels: Vec<usize> = (0..rows).map(|i| i % (classes + 1)).collect();
    let config = loss.config();
    let fused = FusedKernel.forward(&pred, ClassTarget::Labels(&labels), config.gamma, config.alpha)?;
    let reference = ReferenceKernel.forward(&pred, ClassTarget::Labels(&labels), config.gamma, config.alpha)?;
    let total = fused.sum();
    let max_diff = (fused - reference).max_abs();
    println!("  random {rows}x{classes} batch           -> sum {total:.6}, max |fused - reference| = {max_diff:e}");
    Ok(())
}

fn run_heatmap_focal(loss: &HeatmapFocalLoss) -> LossResult<()> {
    println!("BinaryFocalLoss ({:?})", loss.config());

    let (pos, neg) = loss.forward(&[0.0], &[1.0], &[0], None, None, ReduceArgs::default())?;
    println!("  single positive pixel          -> pos {pos}, neg {neg}");

    // Gaussian bump of sigma 1.5 centred on pixel 7 of a 16-pixel row.
    let targets: Vec<f64> = (0..16)
        .map(|i| (-((i as f64 - 7.0).powi(2)) / (2.0 * 1.5 * 1.5)).exp())
        .collect();
    let inputs: Vec<f64> = targets.iter().map(|t| 4.0 * t - 2.0).collect();
    let (pos, neg) = loss.forward(&inputs, &targets, &[7], None, None, ReduceArgs::default())?;
    println!("  16-pixel gaussian, peak 7      -> pos {pos}, neg {neg}");
    Ok(())
}
