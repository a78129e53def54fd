// Closed vocabularies for model / method / encoder identifiers
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Error returned when a string is not part of a vocabulary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownIdentifier {
    pub vocabulary: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} '{}'", self.vocabulary, self.value)
    }
}

impl std::error::Error for UnknownIdentifier {}

/// Declares a string-backed enum with `as_str`, `FromStr`, `Display`, a
/// documented default and serde support using the worker's spelling.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident, $label:literal, default = $default:ident {
            $($variant:ident => $text:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const LABEL: &'static str = $label;

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl FromStr for $name {
            type Err = UnknownIdentifier;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let needle = s.trim();
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(needle))
                    .ok_or_else(|| UnknownIdentifier {
                        vocabulary: $label,
                        value: needle.to_string(),
                    })
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

vocabulary! {
    /// Upscaling networks understood by the worker
    UpscaleModel, "upscale model", default = ShuffleCugan {
        ShuffleCugan => "shufflecugan",
        Compact => "compact",
        UltraCompact => "ultracompact",
        SuperUltraCompact => "superultracompact",
        Span => "span",
        AniScale2 => "aniscale2",
        OpenProteus => "open-proteus",
        ShuffleSpan => "shufflespan",
        Rtmosr => "rtmosr",
        ShuffleCuganTensorRt => "shufflecugan-tensorrt",
        CompactTensorRt => "compact-tensorrt",
        UltraCompactTensorRt => "ultracompact-tensorrt",
        SuperUltraCompactTensorRt => "superultracompact-tensorrt",
        SpanTensorRt => "span-tensorrt",
        AniScale2TensorRt => "aniscale2-tensorrt",
        OpenProteusTensorRt => "open-proteus-tensorrt",
        CompactDirectMl => "compact-directml",
        UltraCompactDirectMl => "ultracompact-directml",
        SuperUltraCompactDirectMl => "superultracompact-directml",
        SpanDirectMl => "span-directml",
        AniScale2DirectMl => "aniscale2-directml",
        OpenProteusDirectMl => "open-proteus-directml",
        ShuffleCuganDirectMl => "shufflecugan-directml",
    }
}

vocabulary! {
    /// Frame interpolation networks
    InterpolationModel, "interpolation model", default = Rife4_22 {
        Rife4_6 => "rife4.6",
        Rife4_15Lite => "rife4.15-lite",
        Rife4_16Lite => "rife4.16-lite",
        Rife4_17 => "rife4.17",
        Rife4_18 => "rife4.18",
        Rife4_20 => "rife4.20",
        Rife4_21 => "rife4.21",
        Rife4_22 => "rife4.22",
        Rife4_22Lite => "rife4.22-lite",
        Rife4_25 => "rife4.25",
        Rife4_25Lite => "rife4.25-lite",
        Rife4_25Heavy => "rife4.25-heavy",
        Gmfss => "gmfss",
        RifeElexor => "rife_elexor",
        Rife4_6TensorRt => "rife4.6-tensorrt",
        Rife4_22TensorRt => "rife4.22-tensorrt",
        Rife4_22LiteTensorRt => "rife4.22-lite-tensorrt",
        Rife4_25TensorRt => "rife4.25-tensorrt",
        Rife4_25LiteTensorRt => "rife4.25-lite-tensorrt",
        Rife4_25HeavyTensorRt => "rife4.25-heavy-tensorrt",
    }
}

vocabulary! {
    /// Restoration / denoise networks
    RestoreModel, "restore model", default = Scunet {
        Scunet => "scunet",
        Dpir => "dpir",
        RealPlksr => "real-plksr",
        Nafnet => "nafnet",
        Anime1080Fixer => "anime1080fixer",
        FastLineDarken => "fastlinedarken",
        Gater3 => "gater3",
        Deh264Real => "deh264_real",
    }
}

vocabulary! {
    /// Duplicate-frame detection methods
    DedupMethod, "dedup method", default = Ssim {
        Ssim => "ssim",
        Mse => "mse",
        SsimCuda => "ssim-cuda",
        MseCuda => "mse-cuda",
        FlowNets => "flownets",
        Vmaf => "vmaf",
    }
}

vocabulary! {
    /// Depth-map networks
    DepthModel, "depth model", default = SmallV2 {
        SmallV2 => "small_v2",
        BaseV2 => "base_v2",
        LargeV2 => "large_v2",
        DistillSmallV2 => "distill_small_v2",
        DistillBaseV2 => "distill_base_v2",
        DistillLargeV2 => "distill_large_v2",
        OgSmallV2 => "og_small_v2",
        OgBaseV2 => "og_base_v2",
        OgLargeV2 => "og_large_v2",
    }
}

vocabulary! {
    /// Background removal networks
    SegmentModel, "segment model", default = Anime {
        Anime => "anime",
        Cartoon => "cartoon",
    }
}

vocabulary! {
    /// Encoders the worker can write the final file with
    EncodeMethod, "encode method", default = X264 {
        X264 => "x264",
        X264_10Bit => "x264_10bit",
        X264Animation => "x264_animation",
        X264Animation10Bit => "x264_animation_10bit",
        X265 => "x265",
        X265_10Bit => "x265_10bit",
        NvencH264 => "nvenc_h264",
        NvencH265 => "nvenc_h265",
        NvencH265_10Bit => "nvenc_h265_10bit",
        NvencAv1 => "nvenc_av1",
        QsvH264 => "qsv_h264",
        QsvH265 => "qsv_h265",
        QsvH265_10Bit => "qsv_h265_10bit",
        Av1 => "av1",
        H264Amf => "h264_amf",
        HevcAmf => "hevc_amf",
        HevcAmf10Bit => "hevc_amf_10bit",
        Vp9 => "vp9",
        QsvVp9 => "qsv_vp9",
        Prores => "prores",
        ProresSegment => "prores_segment",
        Gif => "gif",
        Lossless => "lossless",
        LosslessNvenc => "lossless_nvenc",
    }
}

vocabulary! {
    /// Bit depth of the worker's internal frame pipeline
    BitDepth, "bit depth", default = Eight {
        Eight => "8bit",
        Sixteen => "16bit",
    }
}

impl EncodeMethod {
    /// Container extension the worker writes for this encoder
    pub fn container_extension(&self) -> &'static str {
        match self {
            EncodeMethod::Prores | EncodeMethod::ProresSegment => "mov",
            EncodeMethod::Gif => "gif",
            EncodeMethod::Lossless | EncodeMethod::LosslessNvenc => "mkv",
            EncodeMethod::Vp9 | EncodeMethod::QsvVp9 => "webm",
            _ => "mp4",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive_and_trimmed() {
        assert_eq!(" SPAN ".parse::<UpscaleModel>().unwrap(), UpscaleModel::Span);
        assert_eq!(
            "rife4.25".parse::<InterpolationModel>().unwrap(),
            InterpolationModel::Rife4_25
        );
    }

    #[test]
    fn test_unknown_identifier_names_vocabulary() {
        let err = "waifu2x".parse::<UpscaleModel>().unwrap_err();
        assert_eq!(err.vocabulary, "upscale model");
        assert_eq!(err.to_string(), "unknown upscale model 'waifu2x'");
    }

    #[test]
    fn test_identifiers_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for model in UpscaleModel::ALL {
            assert!(seen.insert(model.as_str()), "duplicate {}", model);
        }
    }

    #[test]
    fn test_serde_uses_worker_spelling() {
        let json = serde_json::to_string(&DepthModel::DistillBaseV2).unwrap();
        assert_eq!(json, "\"distill_base_v2\"");
        let parsed: BitDepth = serde_json::from_str("\"16bit\"").unwrap();
        assert_eq!(parsed, BitDepth::Sixteen);
    }

    #[test]
    fn test_container_extension() {
        assert_eq!(EncodeMethod::Prores.container_extension(), "mov");
        assert_eq!(EncodeMethod::NvencH265.container_extension(), "mp4");
        assert_eq!(EncodeMethod::Vp9.container_extension(), "webm");
    }
}
