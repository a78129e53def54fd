//! Job compiler.
//!
//! [`compile`] is a pure function from validated options to a
//! [`Compilation`]. The same [`CompiledJob`] serializes either to worker
//! flags ([`CompiledJob::to_args`]) or to a JSON job document
//! ([`CompiledJob::to_document`]); stage ordering lives in one place.

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};

use super::error::EngineError;
use super::validate::{
    validate_for_source, DedupStage, DepthStage, EncodeSettings, InterpolateStage, ResizeStage,
    Resolution, RestoreStage, SegmentStage, SharpenStage, UpscaleStage, ValidatedOptions,
    UPSCALE_FACTOR,
};
use crate::models::{ProcessingOptions, SourceInfo};

/// Where the job's input file came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputOrigin {
    /// A file the user picked; never deleted
    File,
    /// Exported from the host composition; owned by the job
    PreRender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobInput {
    pub path: PathBuf,
    pub origin: InputOrigin,
}

impl JobInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: InputOrigin::File,
        }
    }

    pub fn pre_render(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            origin: InputOrigin::PreRender,
        }
    }
}

/// Pipeline position of a stage. The derived ordering is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    PreRender,
    Resize,
    Dedup,
    Restore,
    Upscale,
    Interpolate,
    Sharpen,
    Depth,
    Segment,
    OutputScale,
    Encode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum Stage {
    Resize(ResizeStage),
    Dedup(DedupStage),
    Restore(RestoreStage),
    Upscale(UpscaleStage),
    Interpolate(InterpolateStage),
    Sharpen(SharpenStage),
    Depth(DepthStage),
    Segment(SegmentStage),
    OutputScale(Resolution),
}

impl Stage {
    pub fn kind(&self) -> StageKind {
        match self {
            Stage::Resize(_) => StageKind::Resize,
            Stage::Dedup(_) => StageKind::Dedup,
            Stage::Restore(_) => StageKind::Restore,
            Stage::Upscale(_) => StageKind::Upscale,
            Stage::Interpolate(_) => StageKind::Interpolate,
            Stage::Sharpen(_) => StageKind::Sharpen,
            Stage::Depth(_) => StageKind::Depth,
            Stage::Segment(_) => StageKind::Segment,
            Stage::OutputScale(_) => StageKind::OutputScale,
        }
    }

    fn push_args(&self, args: &mut Vec<String>) {
        match self {
            Stage::Resize(s) => {
                args.push("--resize".into());
                args.push("--resize_factor".into());
                args.push(format_factor(s.factor));
            }
            Stage::Dedup(s) => {
                args.push("--dedup".into());
                args.push("--dedup_sens".into());
                args.push(percent(s.sensitivity).to_string());
                args.push("--dedup_method".into());
                args.push(s.method.as_str().into());
            }
            Stage::Restore(s) => {
                args.push("--restore".into());
                args.push("--restore_method".into());
                args.push(s.model.as_str().into());
            }
            Stage::Upscale(s) => {
                args.push("--upscale".into());
                args.push("--upscale_method".into());
                args.push(s.model.as_str().into());
                if s.static_shape {
                    args.push("--static".into());
                }
            }
            Stage::Interpolate(s) => {
                args.push("--interpolate".into());
                args.push("--interpolate_factor".into());
                args.push(format_factor(s.factor));
                args.push("--interpolate_method".into());
                args.push(s.model.as_str().into());
                if s.slowmo {
                    args.push("--slowmo".into());
                }
                if s.ensemble {
                    args.push("--ensemble".into());
                }
                if s.dynamic_scale {
                    args.push("--dynamic_scale".into());
                }
            }
            Stage::Sharpen(s) => {
                args.push("--sharpen".into());
                args.push("--sharpen_sens".into());
                args.push(percent(s.sensitivity).to_string());
            }
            Stage::Depth(s) => {
                args.push("--depth".into());
                args.push("--depth_method".into());
                args.push(s.model.as_str().into());
            }
            Stage::Segment(s) => {
                args.push("--segment".into());
                args.push("--segment_method".into());
                args.push(s.model.as_str().into());
            }
            Stage::OutputScale(r) => {
                args.push("--output_scale".into());
                args.push(r.to_string());
            }
        }
    }

    fn write_fields(&self, doc: &mut Map<String, Value>) {
        match self {
            Stage::Resize(s) => {
                doc.insert("resize".into(), json!(true));
                doc.insert("resize_factor".into(), json!(s.factor));
            }
            Stage::Dedup(s) => {
                doc.insert("dedup".into(), json!(true));
                doc.insert("dedup_sens".into(), json!(percent(s.sensitivity)));
                doc.insert("dedup_method".into(), json!(s.method.as_str()));
            }
            Stage::Restore(s) => {
                doc.insert("restore".into(), json!(true));
                doc.insert("restore_method".into(), json!(s.model.as_str()));
            }
            Stage::Upscale(s) => {
                doc.insert("upscale".into(), json!(true));
                doc.insert("upscale_factor".into(), json!(UPSCALE_FACTOR));
                doc.insert("upscale_method".into(), json!(s.model.as_str()));
                doc.insert("static".into(), json!(s.static_shape));
            }
            Stage::Interpolate(s) => {
                doc.insert("interpolate".into(), json!(true));
                doc.insert("interpolate_factor".into(), json!(s.factor));
                doc.insert("interpolate_method".into(), json!(s.model.as_str()));
                doc.insert("slowmo".into(), json!(s.slowmo));
                doc.insert("ensemble".into(), json!(s.ensemble));
                doc.insert("dynamic_scale".into(), json!(s.dynamic_scale));
            }
            Stage::Sharpen(s) => {
                doc.insert("sharpen".into(), json!(true));
                doc.insert("sharpen_sens".into(), json!(percent(s.sensitivity)));
            }
            Stage::Depth(s) => {
                doc.insert("depth".into(), json!(true));
                doc.insert("depth_method".into(), json!(s.model.as_str()));
            }
            Stage::Segment(s) => {
                doc.insert("segment".into(), json!(true));
                doc.insert("segment_method".into(), json!(s.model.as_str()));
            }
            Stage::OutputScale(r) => {
                doc.insert("output_scale".into(), json!(r.to_string()));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledJob {
    pub input: JobInput,
    pub output: PathBuf,
    /// Sorted by [`StageKind`]; never empty
    pub stages: Vec<Stage>,
    pub encode: EncodeSettings,
    pub retain_pre_render: bool,
}

impl CompiledJob {
    pub fn stage_kinds(&self) -> Vec<StageKind> {
        let mut kinds = Vec::with_capacity(self.stages.len() + 2);
        if self.input.origin == InputOrigin::PreRender {
            kinds.push(StageKind::PreRender);
        }
        kinds.extend(self.stages.iter().map(Stage::kind));
        kinds.push(StageKind::Encode);
        kinds
    }

    /// Worker flags, without the program and script
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "--input".to_string(),
            path_arg(&self.input.path),
            "--output".to_string(),
            path_arg(&self.output),
            "--ae".to_string(),
        ];
        for stage in &self.stages {
            stage.push_args(&mut args);
        }
        args.push("--encode_method".into());
        args.push(self.encode.method.as_str().into());
        args.push("--bit_depth".into());
        args.push(self.encode.bit_depth.as_str().into());
        args.push("--half".into());
        args.push(self.encode.half.to_string());
        args
    }

    /// The same job as a JSON object for `--json <path>`
    pub fn to_document(&self) -> Value {
        let mut doc = Map::new();
        doc.insert("input".into(), json!(path_arg(&self.input.path)));
        doc.insert("output".into(), json!(path_arg(&self.output)));
        doc.insert("ae".into(), json!(true));
        for stage in &self.stages {
            stage.write_fields(&mut doc);
        }
        doc.insert("encode_method".into(), json!(self.encode.method.as_str()));
        doc.insert("bit_depth".into(), json!(self.encode.bit_depth.as_str()));
        doc.insert("half".into(), json!(self.encode.half));
        Value::Object(doc)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Compilation {
    /// Nothing to do: hand the input straight back to the caller
    Passthrough { input: JobInput },
    Job(CompiledJob),
}

pub fn compile(options: &ValidatedOptions, input: JobInput, output: impl Into<PathBuf>) -> Compilation {
    let mut stages = Vec::new();

    if let Some(s) = &options.resize {
        stages.push(Stage::Resize(s.clone()));
    }
    if let Some(s) = &options.dedup {
        stages.push(Stage::Dedup(s.clone()));
    }
    if let Some(s) = &options.restore {
        stages.push(Stage::Restore(s.clone()));
    }
    if let Some(s) = &options.upscale {
        stages.push(Stage::Upscale(s.clone()));
    }
    if let Some(s) = &options.interpolate {
        stages.push(Stage::Interpolate(s.clone()));
    }
    if let Some(s) = &options.sharpen {
        stages.push(Stage::Sharpen(s.clone()));
    }
    if let Some(s) = &options.depth {
        stages.push(Stage::Depth(s.clone()));
    }
    if let Some(s) = &options.segment {
        stages.push(Stage::Segment(s.clone()));
    }
    if let Some(r) = options.output_scale {
        stages.push(Stage::OutputScale(r));
    }

    if stages.is_empty() {
        return Compilation::Passthrough { input };
    }

    debug_assert!(stages.windows(2).all(|w| w[0].kind() < w[1].kind()));

    Compilation::Job(CompiledJob {
        input,
        output: output.into(),
        stages,
        encode: options.encode.clone(),
        retain_pre_render: options.retain_pre_render,
    })
}

/// Validate then compile
pub fn prepare(
    options: &ProcessingOptions,
    source: Option<&SourceInfo>,
    input: JobInput,
    output: impl Into<PathBuf>,
) -> Result<Compilation, EngineError> {
    let validated = validate_for_source(options, source)?;
    Ok(compile(&validated, input, output))
}

/// Shortest decimal form: 2.0 -> "2", 2.5 -> "2.5"
fn format_factor(factor: f64) -> String {
    format!("{}", factor)
}

/// Sensitivity in [0,1] as the worker's integer percent
fn percent(sensitivity: f64) -> u8 {
    (sensitivity.clamp(0.0, 1.0) * 100.0).round() as u8
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::validate::validate;
    use crate::models::{FactorInput, ProcessingOptions};

    fn compile_options(options: &ProcessingOptions) -> Compilation {
        let validated = validate(options).unwrap();
        compile(&validated, JobInput::file("in.mp4"), "out.mp4")
    }

    fn args_of(options: &ProcessingOptions) -> Vec<String> {
        match compile_options(options) {
            Compilation::Job(job) => job.to_args(),
            Compilation::Passthrough { .. } => panic!("expected a job"),
        }
    }

    fn contains_run(haystack: &[String], needle: &[&str]) -> bool {
        haystack
            .windows(needle.len())
            .any(|w| w.iter().zip(needle).all(|(a, b)| a == b))
    }

    #[test]
    fn test_upscale_only_scenario() {
        let options = ProcessingOptions {
            upscale: true,
            upscale_model: Some("span".into()),
            interpolate: false,
            ..Default::default()
        };
        let args = args_of(&options);
        assert!(contains_run(&args, &["--upscale", "--upscale_method", "span"]));
        assert!(!args.iter().any(|a| a == "--interpolate"));
        assert_eq!(
            &args[..5],
            &["--input", "in.mp4", "--output", "out.mp4", "--ae"]
        );
    }

    #[test]
    fn test_interpolate_factor_normalized() {
        let options = ProcessingOptions {
            interpolate: true,
            interpolate_factor: Some("2.5x".into()),
            interpolation_model: Some("rife4.25".into()),
            ..Default::default()
        };
        let args = args_of(&options);
        assert!(contains_run(
            &args,
            &[
                "--interpolate",
                "--interpolate_factor",
                "2.5",
                "--interpolate_method",
                "rife4.25"
            ]
        ));
    }

    #[test]
    fn test_invalid_factor_blocks_compilation() {
        let options = ProcessingOptions {
            interpolate: true,
            interpolate_factor: Some("abc".into()),
            interpolation_model: Some("rife4.25".into()),
            ..Default::default()
        };
        let result = prepare(&options, None, JobInput::file("in.mp4"), "out.mp4");
        assert!(matches!(result, Err(EngineError::Validation(_))));
    }

    #[test]
    fn test_sensitivity_emitted_as_percent() {
        let options = ProcessingOptions {
            dedup: true,
            dedup_sensitivity: Some(0.35),
            sharpen: true,
            sharpen_sensitivity: Some(0.504),
            ..Default::default()
        };
        let args = args_of(&options);
        assert!(contains_run(&args, &["--dedup", "--dedup_sens", "35", "--dedup_method", "ssim"]));
        assert!(contains_run(&args, &["--sharpen", "--sharpen_sens", "50"]));
    }

    #[test]
    fn test_no_stage_is_passthrough() {
        let options = ProcessingOptions {
            encode_method: Some("x265".into()),
            ..Default::default()
        };
        match compile_options(&options) {
            Compilation::Passthrough { input } => assert_eq!(input, JobInput::file("in.mp4")),
            other => panic!("expected passthrough, got {:?}", other),
        }
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let options = ProcessingOptions {
            sharpen: true,
            output_scale: true,
            output_resolution: Some("3840x2160".into()),
            interpolate: true,
            upscale: true,
            restore: true,
            dedup: true,
            resize: true,
            depth: true,
            segment: true,
            ..Default::default()
        };
        let job = match compile(
            &validate(&options).unwrap(),
            JobInput::pre_render("render.mov"),
            "out.mp4",
        ) {
            Compilation::Job(job) => job,
            other => panic!("expected job, got {:?}", other),
        };
        assert_eq!(
            job.stage_kinds(),
            vec![
                StageKind::PreRender,
                StageKind::Resize,
                StageKind::Dedup,
                StageKind::Restore,
                StageKind::Upscale,
                StageKind::Interpolate,
                StageKind::Sharpen,
                StageKind::Depth,
                StageKind::Segment,
                StageKind::OutputScale,
                StageKind::Encode,
            ]
        );

        let args = job.to_args();
        let position = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        let flags = [
            "--resize",
            "--dedup",
            "--restore",
            "--upscale",
            "--interpolate",
            "--sharpen",
            "--depth",
            "--segment",
            "--output_scale",
            "--encode_method",
        ];
        for pair in flags.windows(2) {
            assert!(position(pair[0]) < position(pair[1]), "{} before {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_compile_is_deterministic() {
        let options = ProcessingOptions {
            dedup: true,
            upscale: true,
            upscale_static: true,
            interpolate: true,
            interpolate_factor: Some(FactorInput::Number(3.0)),
            slowmo: true,
            ensemble: true,
            ..Default::default()
        };
        let a = compile_options(&options);
        let b = compile_options(&options);
        assert_eq!(a, b);
        if let (Compilation::Job(a), Compilation::Job(b)) = (a, b) {
            assert_eq!(a.to_args(), b.to_args());
            assert_eq!(
                serde_json::to_vec(&a.to_document()).unwrap(),
                serde_json::to_vec(&b.to_document()).unwrap()
            );
        }
    }

    #[test]
    fn test_document_mirrors_arguments() {
        let options = ProcessingOptions {
            upscale: true,
            upscale_model: Some("compact".into()),
            dedup: true,
            dedup_sensitivity: Some(0.6),
            bit_depth: Some("16bit".into()),
            half: Some(false),
            ..Default::default()
        };
        let job = match compile_options(&options) {
            Compilation::Job(job) => job,
            _ => unreachable!(),
        };
        let doc = job.to_document();
        assert_eq!(doc["input"], "in.mp4");
        assert_eq!(doc["ae"], true);
        assert_eq!(doc["upscale_method"], "compact");
        assert_eq!(doc["upscale_factor"], 2);
        assert_eq!(doc["dedup_sens"], 60);
        assert_eq!(doc["bit_depth"], "16bit");
        assert_eq!(doc["half"], false);
        assert!(doc.get("interpolate").is_none());

        let args = job.to_args();
        assert!(contains_run(&args, &["--half", "false"]));
        assert!(contains_run(&args, &["--bit_depth", "16bit"]));
    }

    #[test]
    fn test_optional_flags_only_when_set() {
        let options = ProcessingOptions {
            upscale: true,
            interpolate: true,
            ..Default::default()
        };
        let args = args_of(&options);
        for flag in ["--static", "--slowmo", "--ensemble", "--dynamic_scale"] {
            assert!(!args.iter().any(|a| a == flag), "unexpected {}", flag);
        }
    }
}
