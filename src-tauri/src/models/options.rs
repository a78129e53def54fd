// Processing option snapshot as produced by the panel UI
use serde::{Deserialize, Serialize};

/// A factor as the UI stores it: either a bare number or text such as "2.5x"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactorInput {
    Number(f64),
    Text(String),
}

impl From<f64> for FactorInput {
    fn from(value: f64) -> Self {
        FactorInput::Number(value)
    }
}

impl From<&str> for FactorInput {
    fn from(value: &str) -> Self {
        FactorInput::Text(value.to_string())
    }
}

/// Raw processing toggles and parameters.
///
/// Every field defaults when absent so partially populated and legacy
/// snapshots still load. Nothing here is trusted: run it through
/// `engine::validate` before compiling a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProcessingOptions {
    pub resize: bool,
    pub resize_factor: Option<f64>,

    pub dedup: bool,
    pub dedup_method: Option<String>,
    pub dedup_sensitivity: Option<f64>,

    pub restore: bool,
    pub restore_model: Option<String>,

    pub upscale: bool,
    pub upscale_model: Option<String>,
    pub upscale_static: bool,

    pub interpolate: bool,
    pub interpolate_factor: Option<FactorInput>,
    pub interpolation_model: Option<String>,
    pub slowmo: bool,
    pub ensemble: bool,
    pub dynamic_scale: bool,

    pub sharpen: bool,
    pub sharpen_sensitivity: Option<f64>,

    pub depth: bool,
    pub depth_model: Option<String>,

    /// Background removal
    pub segment: bool,
    pub segment_model: Option<String>,

    pub output_scale: bool,
    /// "WxH", e.g. "1920x1080"
    pub output_resolution: Option<String>,

    pub encode_method: Option<String>,
    pub bit_depth: Option<String>,
    pub half: Option<bool>,

    /// Keep the pre-render after the job. Older panels saved this as
    /// `keepPreRender` or `deletePreRender`.
    #[serde(alias = "keepPreRender", alias = "deletePreRender")]
    pub retain_pre_render: bool,
}

impl ProcessingOptions {
    /// Whether any processing stage is toggled on
    pub fn any_stage_enabled(&self) -> bool {
        self.resize
            || self.dedup
            || self.restore
            || self.upscale
            || self.interpolate
            || self.sharpen
            || self.depth
            || self.segment
            || self.output_scale
    }
}

/// Composition facts reported by the host editor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub frame_rate: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_snapshot_loads_with_defaults() {
        let options: ProcessingOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, ProcessingOptions::default());
        assert!(!options.any_stage_enabled());
    }

    #[test]
    fn test_legacy_snapshot_with_unknown_keys() {
        let json = r#"{
            "upscale": true,
            "upscaleModel": "span",
            "interpolateFactor": "2x",
            "keepPreRender": true,
            "theme": "dark",
            "lastDownloadCheck": 1700000000
        }"#;
        let options: ProcessingOptions = serde_json::from_str(json).unwrap();
        assert!(options.upscale);
        assert_eq!(options.upscale_model.as_deref(), Some("span"));
        assert_eq!(options.interpolate_factor, Some(FactorInput::Text("2x".into())));
        assert!(options.retain_pre_render);
        assert!(options.any_stage_enabled());
    }

    #[test]
    fn test_delete_pre_render_key_retains_artifact() {
        let options: ProcessingOptions =
            serde_json::from_str(r#"{"upscale": true, "deletePreRender": true}"#).unwrap();
        assert!(options.upscale);
        assert!(options.retain_pre_render);
    }

    #[test]
    fn test_numeric_factor_accepted() {
        let options: ProcessingOptions =
            serde_json::from_str(r#"{"interpolateFactor": 3}"#).unwrap();
        assert_eq!(options.interpolate_factor, Some(FactorInput::Number(3.0)));
    }
}
