use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::error::LossResult;
use crate::loss::heatmap_focal::{HeatmapFocalConfig, HeatmapFocalLoss};
use crate::loss::sigmoid_focal::{SigmoidFocalConfig, SigmoidFocalLoss};

/// A serializable description of one loss component.
///
/// Stored as JSON with a `type` tag next to the hyperparameters:
///
/// ```json
/// { "type": "FocalLoss", "gamma": 2.0, "alpha": 0.25, "reduction": "sum" }
/// ```
///
/// Omitted hyperparameters take their defaults, so a spec can be saved
/// before anything is tuned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LossSpec {
    #[serde(rename = "FocalLoss", alias = "SigmoidFocalLoss")]
    SigmoidFocal(SigmoidFocalConfig),
    #[serde(rename = "BinaryFocalLoss", alias = "HeatmapFocalLoss")]
    HeatmapFocal(HeatmapFocalConfig),
}

/// A constructed loss, ready for `forward`.
#[derive(Debug)]
pub enum LossModule {
    SigmoidFocal(SigmoidFocalLoss),
    HeatmapFocal(HeatmapFocalLoss),
}

impl LossModule {
    pub fn name(&self) -> &'static str {
        match self {
            LossModule::SigmoidFocal(_) => "FocalLoss",
            LossModule::HeatmapFocal(_) => "BinaryFocalLoss",
        }
    }
}

impl LossSpec {
    /// Validates the hyperparameters and builds the loss.
    pub fn build(&self) -> LossResult<LossModule> {
        let module = match self {
            LossSpec::SigmoidFocal(config) => LossModule::SigmoidFocal(SigmoidFocalLoss::new(*config)?),
            LossSpec::HeatmapFocal(config) => LossModule::HeatmapFocal(HeatmapFocalLoss::new(*config)?),
        };
        debug!(name = module.name(), "built loss from spec");
        Ok(module)
    }

    pub fn from_json_str(json: &str) -> LossResult<LossSpec> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the spec to a pretty-printed JSON file.
    pub fn save_json(&self, path: &str) -> LossResult<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Deserializes a `LossSpec` from a JSON file.
    pub fn load_json(path: &str) -> LossResult<LossSpec> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LossError;
    use crate::loss::kernel::Backend;
    use crate::loss::reduction::Reduction;

    #[test]
    fn missing_fields_take_defaults() {
        let spec = LossSpec::from_json_str(r#"{ "type": "FocalLoss" }"#).unwrap();
        assert_eq!(spec, LossSpec::SigmoidFocal(SigmoidFocalConfig::default()));

        let spec = LossSpec::from_json_str(r#"{ "type": "BinaryFocalLoss", "beta": 2.0 }"#).unwrap();
        match spec {
            LossSpec::HeatmapFocal(config) => {
                assert_eq!(config.beta, 2.0);
                assert_eq!(config.sigmoid_clamp, 1e-4);
                assert_eq!(config.ignore_high_fp, -1.0);
            }
            other => panic!("unexpected spec {other:?}"),
        }
    }

    #[test]
    fn aliases_are_accepted() {
        let spec = LossSpec::from_json_str(
            r#"{ "type": "SigmoidFocalLoss", "reduction": "sum", "backend": "reference" }"#,
        ).unwrap();
        assert_eq!(spec, LossSpec::SigmoidFocal(SigmoidFocalConfig {
            reduction: Reduction::Sum,
            backend: Backend::Reference,
            ..Default::default()
        }));
        assert!(LossSpec::from_json_str(r#"{ "type": "HeatmapFocalLoss" }"#).is_ok());
    }

    #[test]
    fn bad_reduction_is_a_json_error() {
        let err = LossSpec::from_json_str(r#"{ "type": "FocalLoss", "reduction": "max" }"#).unwrap_err();
        assert!(matches!(err, LossError::Json(_)));
    }

    #[test]
    fn build_validates_hyperparameters() {
        let spec = LossSpec::SigmoidFocal(SigmoidFocalConfig { use_sigmoid: false, ..Default::default() });
        assert!(matches!(spec.build(), Err(LossError::SigmoidRequired)));

        let spec = LossSpec::HeatmapFocal(HeatmapFocalConfig { sigmoid_clamp: -0.1, ..Default::default() });
        assert!(matches!(spec.build(), Err(LossError::Config(_))));

        let module = LossSpec::HeatmapFocal(HeatmapFocalConfig::default()).build().unwrap();
        assert_eq!(module.name(), "BinaryFocalLoss");
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focal.json");
        let path = path.to_str().unwrap();

        let spec = LossSpec::SigmoidFocal(SigmoidFocalConfig { gamma: 1.5, loss_weight: 2.0, ..Default::default() });
        spec.save_json(path).unwrap();
        assert_eq!(LossSpec::load_json(path).unwrap(), spec);

        let raw = std::fs::read_to_string(path).unwrap();
        assert!(raw.contains("\"type\": \"FocalLoss\""));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = LossSpec::load_json("/nonexistent/focal.json").unwrap_err();
        assert!(matches!(err, LossError::Io(_)));
    }
}
