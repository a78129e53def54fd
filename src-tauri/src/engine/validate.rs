//! Option validation.
//!
//! Turns a loosely-populated [`ProcessingOptions`] snapshot into an immutable
//! [`ValidatedOptions`]. All defaulting happens here, once, so the compiler
//! never has to guess. Errors are collected rather than returned on the
//! first failure so the UI can flag every offending control at once.

use crate::models::{
    BitDepth, DedupMethod, DepthModel, EncodeMethod, FactorInput, InterpolationModel,
    ProcessingOptions, RestoreModel, SegmentModel, SourceInfo, UpscaleModel,
};
use log::warn;
use serde::Serialize;
use std::str::FromStr;

use super::error::ValidationError;

pub const DEFAULT_RESIZE_FACTOR: f64 = 2.0;
pub const DEFAULT_INTERPOLATE_FACTOR: f64 = 2.0;
pub const DEFAULT_DEDUP_SENSITIVITY: f64 = 0.35;
pub const DEFAULT_SHARPEN_SENSITIVITY: f64 = 0.5;
pub const UPSCALE_FACTOR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn is_even(&self) -> bool {
        self.width % 2 == 0 && self.height % 2 == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResizeStage {
    pub factor: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStage {
    pub method: DedupMethod,
    /// Always within [0, 1]
    pub sensitivity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreStage {
    pub model: RestoreModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpscaleStage {
    pub model: UpscaleModel,
    pub static_shape: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InterpolateStage {
    pub factor: f64,
    pub model: InterpolationModel,
    pub slowmo: bool,
    pub ensemble: bool,
    pub dynamic_scale: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SharpenStage {
    pub sensitivity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepthStage {
    pub model: DepthModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentStage {
    pub model: SegmentModel,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodeSettings {
    pub method: EncodeMethod,
    pub bit_depth: BitDepth,
    pub half: bool,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            method: EncodeMethod::default(),
            bit_depth: BitDepth::default(),
            half: true,
        }
    }
}

/// Options after defaulting and domain checks; `None` means the stage is off
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ValidatedOptions {
    pub resize: Option<ResizeStage>,
    pub dedup: Option<DedupStage>,
    pub restore: Option<RestoreStage>,
    pub upscale: Option<UpscaleStage>,
    pub interpolate: Option<InterpolateStage>,
    pub sharpen: Option<SharpenStage>,
    pub depth: Option<DepthStage>,
    pub segment: Option<SegmentStage>,
    pub output_scale: Option<Resolution>,
    pub encode: EncodeSettings,
    pub retain_pre_render: bool,
}

pub fn validate(options: &ProcessingOptions) -> Result<ValidatedOptions, Vec<ValidationError>> {
    validate_for_source(options, None)
}

/// Validate with the composition size known, which enables the parity check
/// on the resized frame size as well as on the explicit output resolution.
pub fn validate_for_source(
    options: &ProcessingOptions,
    source: Option<&SourceInfo>,
) -> Result<ValidatedOptions, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut validated = ValidatedOptions {
        retain_pre_render: options.retain_pre_render,
        ..Default::default()
    };

    if options.resize {
        let factor = options.resize_factor.unwrap_or(DEFAULT_RESIZE_FACTOR);
        if factor.is_finite() && factor > 0.0 {
            validated.resize = Some(ResizeStage { factor });
        } else {
            errors.push(ValidationError::OutOfRange {
                field: "resizeFactor",
                value: factor,
                expected: "greater than 0",
            });
        }
    }

    if options.dedup {
        let method = resolve(&options.dedup_method, "dedupMethod", &mut errors);
        let sensitivity = sensitivity(
            options.dedup_sensitivity,
            DEFAULT_DEDUP_SENSITIVITY,
            "dedupSensitivity",
            &mut errors,
        );
        if let (Some(method), Some(sensitivity)) = (method, sensitivity) {
            validated.dedup = Some(DedupStage { method, sensitivity });
        }
    }

    if options.restore {
        if let Some(model) = resolve(&options.restore_model, "restoreModel", &mut errors) {
            validated.restore = Some(RestoreStage { model });
        }
    }

    if options.upscale {
        if let Some(model) = resolve(&options.upscale_model, "upscaleModel", &mut errors) {
            validated.upscale = Some(UpscaleStage {
                model,
                static_shape: options.upscale_static,
            });
        }
    }

    if options.interpolate {
        let factor = match &options.interpolate_factor {
            None => Some(DEFAULT_INTERPOLATE_FACTOR),
            Some(input) => match parse_factor(input) {
                Ok(factor) => Some(factor),
                Err(err) => {
                    errors.push(err);
                    None
                }
            },
        };
        let model = resolve(&options.interpolation_model, "interpolationModel", &mut errors);
        if let (Some(factor), Some(model)) = (factor, model) {
            validated.interpolate = Some(InterpolateStage {
                factor,
                model,
                slowmo: options.slowmo,
                ensemble: options.ensemble,
                dynamic_scale: options.dynamic_scale,
            });
        }
    }

    if options.sharpen {
        if let Some(sensitivity) = sensitivity(
            options.sharpen_sensitivity,
            DEFAULT_SHARPEN_SENSITIVITY,
            "sharpenSensitivity",
            &mut errors,
        ) {
            validated.sharpen = Some(SharpenStage { sensitivity });
        }
    }

    if options.depth {
        if let Some(model) = resolve(&options.depth_model, "depthModel", &mut errors) {
            validated.depth = Some(DepthStage { model });
        }
    }

    if options.segment {
        if let Some(model) = resolve(&options.segment_model, "segmentModel", &mut errors) {
            validated.segment = Some(SegmentStage { model });
        }
    }

    if options.output_scale {
        match options.output_resolution.as_deref().map(str::trim) {
            None | Some("") => errors.push(ValidationError::MissingParameter {
                field: "outputScale",
                parameter: "outputResolution",
            }),
            Some(text) => match parse_resolution(text) {
                Some(resolution) => validated.output_scale = Some(resolution),
                None => errors.push(ValidationError::InvalidParameter {
                    field: "outputResolution",
                    value: text.to_string(),
                    reason: "expected WIDTHxHEIGHT with positive integers",
                }),
            },
        }
    }

    if let Some(method) = resolve(&options.encode_method, "encodeMethod", &mut errors) {
        validated.encode.method = method;
    }
    if let Some(bit_depth) = resolve(&options.bit_depth, "bitDepth", &mut errors) {
        validated.encode.bit_depth = bit_depth;
    }
    validated.encode.half = options.half.unwrap_or(true);

    // Upscaling re-derives the frame size, which fixes odd dimensions.
    if validated.upscale.is_none() {
        let final_size = validated
            .output_scale
            .or_else(|| resized_source(source, validated.resize.as_ref()));
        if let Some(size) = final_size {
            if !size.is_even() {
                errors.push(ValidationError::DimensionParity {
                    width: size.width,
                    height: size.height,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(validated)
    } else {
        Err(errors)
    }
}

/// Resolve an optional identifier against its vocabulary, defaulting when unset
fn resolve<T>(value: &Option<String>, field: &'static str, errors: &mut Vec<ValidationError>) -> Option<T>
where
    T: FromStr<Err = crate::models::UnknownIdentifier> + Default,
{
    match value.as_deref().map(str::trim) {
        None | Some("") => Some(T::default()),
        Some(text) => match text.parse::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                errors.push(ValidationError::UnknownValue {
                    field,
                    vocabulary: e.vocabulary,
                    value: e.value,
                });
                None
            }
        },
    }
}

fn sensitivity(
    value: Option<f64>,
    default: f64,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) -> Option<f64> {
    let value = value.unwrap_or(default);
    if !value.is_finite() {
        errors.push(ValidationError::OutOfRange {
            field,
            value,
            expected: "between 0 and 1",
        });
        return None;
    }
    let clamped = value.clamp(0.0, 1.0);
    if clamped != value {
        warn!("{} {} clamped to {}", field, value, clamped);
    }
    Some(clamped)
}

/// Accepts `2`, `2.5`, `"2.5"`, `"2.5x"` and `" 3X "`
pub fn parse_factor(input: &FactorInput) -> Result<f64, ValidationError> {
    let (value, text) = match input {
        FactorInput::Number(n) => (Some(*n), n.to_string()),
        FactorInput::Text(raw) => {
            let trimmed = raw.trim();
            let bare = trimmed
                .strip_suffix('x')
                .or_else(|| trimmed.strip_suffix('X'))
                .unwrap_or(trimmed)
                .trim();
            (bare.parse::<f64>().ok(), raw.clone())
        }
    };

    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(_) => Err(ValidationError::InvalidParameter {
            field: "interpolateFactor",
            value: text,
            reason: "factor must be greater than 0",
        }),
        None => Err(ValidationError::InvalidParameter {
            field: "interpolateFactor",
            value: text,
            reason: "not a number",
        }),
    }
}

pub fn parse_resolution(text: &str) -> Option<Resolution> {
    let (w, h) = text.split_once(['x', 'X'])?;
    let width = w.trim().parse::<u32>().ok()?;
    let height = h.trim().parse::<u32>().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some(Resolution { width, height })
}

fn resized_source(source: Option<&SourceInfo>, resize: Option<&ResizeStage>) -> Option<Resolution> {
    let source = source?;
    if source.width == 0 || source.height == 0 {
        return None;
    }
    let factor = resize.map(|r| r.factor)?;
    Some(Resolution {
        width: (source.width as f64 * factor).round() as u32,
        height: (source.height as f64 * factor).round() as u32,
    })
}
