//! Style identifiers and their parameter records.
//!
//! Every identifier accepted by the engine resolves to exactly one variant
//! of [`StyleSpec`]. Parsing happens before any pixel or file is touched, so
//! an unknown identifier never costs compute or I/O.
//!
//! | Identifier | Variant |
//! |------------|---------|
//! | `gray-sketch` | [`ClassicalStyle::GraySketch`] |
//! | `color-sketch` | [`ClassicalStyle::ColorSketch`] |
//! | `comic-art` | [`ClassicalStyle::ComicArt`] |
//! | `manga` | [`ClassicalStyle::Manga`] |
//! | `neon-glow` | [`ClassicalStyle::NeonGlow`] |
//! | `pop-art` | [`ClassicalStyle::PopArt`] |
//! | `pixel-art:{8bit,16bit,modern,mosaic}` | [`ClassicalStyle::PixelArt`] |
//! | `cartoon` | [`NeuralStyle::Cartoon`] |
//! | `style-transfer:{candy,mosaic,rain_princess,udnie}` | [`NeuralStyle::StyleTransfer`] |
//! | `sticker` | [`StyleSpec::Sticker`] |

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::filters::comic::ComicParams;
use crate::filters::manga::MangaParams;
use crate::filters::neon::NeonParams;
use crate::filters::pixel_art::PixelArtParams;
use crate::filters::pop_art::PopArtParams;
use crate::filters::sketch::{ColorSketchParams, GraySketchParams};

// ============================================================================
// Pixel art presets
// ============================================================================

/// Named (downscale factor, palette size) pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelArtPreset {
    EightBit,
    SixteenBit,
    Modern,
    Mosaic,
}

impl PixelArtPreset {
    pub const ALL: [PixelArtPreset; 4] = [
        PixelArtPreset::EightBit,
        PixelArtPreset::SixteenBit,
        PixelArtPreset::Modern,
        PixelArtPreset::Mosaic,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PixelArtPreset::EightBit => "8bit",
            PixelArtPreset::SixteenBit => "16bit",
            PixelArtPreset::Modern => "modern",
            PixelArtPreset::Mosaic => "mosaic",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.name() == lowered)
            .ok_or_else(|| {
                Error::invalid_style(
                    format!("pixel-art:{name}"),
                    format!("unknown preset, expected one of {}", join_names(Self::ALL.map(Self::name))),
                )
            })
    }

    pub fn params(self) -> PixelArtParams {
        let (scale, colors) = match self {
            PixelArtPreset::EightBit => (0.08, 12),
            PixelArtPreset::SixteenBit => (0.12, 24),
            PixelArtPreset::Modern => (0.18, 48),
            PixelArtPreset::Mosaic => (0.05, 8),
        };
        PixelArtParams { scale, colors }
    }
}

// ============================================================================
// Neural styles
// ============================================================================

/// Style-transfer checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferStyle {
    Candy,
    Mosaic,
    RainPrincess,
    Udnie,
}

impl TransferStyle {
    pub const ALL: [TransferStyle; 4] = [
        TransferStyle::Candy,
        TransferStyle::Mosaic,
        TransferStyle::RainPrincess,
        TransferStyle::Udnie,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TransferStyle::Candy => "candy",
            TransferStyle::Mosaic => "mosaic",
            TransferStyle::RainPrincess => "rain_princess",
            TransferStyle::Udnie => "udnie",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        let lowered = name.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|s| s.name() == lowered)
            .ok_or_else(|| {
                Error::invalid_style(
                    format!("style-transfer:{name}"),
                    format!("unknown style, expected one of {}", join_names(Self::ALL.map(Self::name))),
                )
            })
    }

    /// Long side above which the input is downscaled before inference.
    pub fn max_size(self) -> u32 {
        match self {
            TransferStyle::Udnie => 640,
            _ => 512,
        }
    }
}

/// Styles backed by a neural network checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeuralStyle {
    Cartoon,
    StyleTransfer(TransferStyle),
}

impl NeuralStyle {
    pub const ALL: [NeuralStyle; 5] = [
        NeuralStyle::Cartoon,
        NeuralStyle::StyleTransfer(TransferStyle::Candy),
        NeuralStyle::StyleTransfer(TransferStyle::Mosaic),
        NeuralStyle::StyleTransfer(TransferStyle::RainPrincess),
        NeuralStyle::StyleTransfer(TransferStyle::Udnie),
    ];

    pub fn parse(id: &str) -> Result<Self> {
        let (family, variant) = split_id(id);
        match (family.as_str(), variant) {
            ("cartoon", None) => Ok(NeuralStyle::Cartoon),
            ("style-transfer", Some(name)) => Ok(NeuralStyle::StyleTransfer(TransferStyle::parse(name)?)),
            ("style-transfer", None) => Err(Error::invalid_style(id, "style-transfer requires a style name")),
            _ => Err(Error::invalid_style(id, "not a neural style")),
        }
    }

    /// Canonical identifier, e.g. `style-transfer:candy`.
    pub fn id(&self) -> String {
        match self {
            NeuralStyle::Cartoon => "cartoon".to_string(),
            NeuralStyle::StyleTransfer(style) => format!("style-transfer:{}", style.name()),
        }
    }

    /// Location of the checkpoint under `model_dir`.
    pub fn checkpoint_path(&self, model_dir: &Path) -> PathBuf {
        match self {
            NeuralStyle::Cartoon => model_dir.join("face_paint_512_v2.safetensors"),
            NeuralStyle::StyleTransfer(style) => model_dir
                .join("instance_norm")
                .join(format!("{}.safetensors", style.name())),
        }
    }
}

impl fmt::Display for NeuralStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

// ============================================================================
// Classical styles
// ============================================================================

/// A classical filter together with its fully resolved parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassicalStyle {
    GraySketch(GraySketchParams),
    ColorSketch(ColorSketchParams),
    ComicArt(ComicParams),
    Manga(MangaParams),
    NeonGlow(NeonParams),
    PopArt(PopArtParams),
    PixelArt(PixelArtParams),
}

impl ClassicalStyle {
    /// Resolve an identifier and optional caller parameters.
    ///
    /// Parameters that do not apply to the selected style are ignored.
    ///
    /// # Errors
    ///
    /// `InvalidStyle` for unknown identifiers or presets, `InvalidParameter`
    /// for out-of-range overrides.
    pub fn resolve(id: &str, params: Option<&StyleParams>) -> Result<Self> {
        let (family, variant) = split_id(id);
        let defaults = StyleParams::default();
        let params = params.unwrap_or(&defaults);

        if family != "pixel-art" {
            if let Some(variant) = variant {
                return Err(Error::invalid_style(id, format!("'{family}' takes no variant '{variant}'")));
            }
        }

        let style = match family.as_str() {
            "gray-sketch" => ClassicalStyle::GraySketch(GraySketchParams::default()),
            "color-sketch" => ClassicalStyle::ColorSketch(ColorSketchParams::default()),
            "comic-art" => {
                let mut comic = ComicParams::default();
                if let Some(clusters) = params.clusters {
                    if !(1..=64).contains(&clusters) {
                        return Err(Error::invalid_parameter("clusters", format!("{clusters} is outside 1..=64")));
                    }
                    comic.clusters = clusters;
                }
                if let Some(seed) = params.seed {
                    comic.seed = seed;
                }
                ClassicalStyle::ComicArt(comic)
            }
            "manga" => ClassicalStyle::Manga(MangaParams::default()),
            "neon-glow" => {
                let mut neon = NeonParams::default();
                if let Some(color_mapping) = params.color_mapping {
                    neon.color_mapping = color_mapping;
                }
                ClassicalStyle::NeonGlow(neon)
            }
            "pop-art" => {
                let mut pop = PopArtParams::default();
                if let Some(levels) = params.levels {
                    if !(2..=256).contains(&levels) {
                        return Err(Error::invalid_parameter("levels", format!("{levels} is outside 2..=256")));
                    }
                    pop.levels = levels;
                }
                ClassicalStyle::PopArt(pop)
            }
            "pixel-art" => ClassicalStyle::PixelArt(resolve_pixel_art(id, variant, params)?),
            _ => return Err(Error::invalid_style(id, "unknown style")),
        };
        Ok(style)
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClassicalStyle::GraySketch(_) => "gray-sketch",
            ClassicalStyle::ColorSketch(_) => "color-sketch",
            ClassicalStyle::ComicArt(_) => "comic-art",
            ClassicalStyle::Manga(_) => "manga",
            ClassicalStyle::NeonGlow(_) => "neon-glow",
            ClassicalStyle::PopArt(_) => "pop-art",
            ClassicalStyle::PixelArt(_) => "pixel-art",
        }
    }
}

fn resolve_pixel_art(id: &str, variant: Option<&str>, params: &StyleParams) -> Result<PixelArtParams> {
    let preset = match (variant, params.preset.as_deref()) {
        (Some(a), Some(b)) if !a.trim().eq_ignore_ascii_case(b.trim()) => {
            return Err(Error::invalid_style(id, format!("conflicting presets '{a}' and '{b}'")));
        }
        (Some(name), _) | (None, Some(name)) => PixelArtPreset::parse(name)?,
        (None, None) => return Err(Error::invalid_style(id, "pixel-art requires a preset")),
    };

    let mut resolved = preset.params();
    if let Some(scale) = params.pixel_scale {
        resolved.scale = scale;
    }
    if let Some(colors) = params.palette_size {
        resolved.colors = colors;
    }
    resolved.validate()?;
    Ok(resolved)
}

// ============================================================================
// Caller parameters
// ============================================================================

/// Optional per-request overrides, as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleParams {
    /// Pixel art preset name (`8bit`, `16bit`, `modern`, `mosaic`).
    #[serde(alias = "style")]
    pub preset: Option<String>,
    /// Pixel art downscale override.
    pub pixel_scale: Option<f32>,
    /// Pixel art palette override.
    pub palette_size: Option<usize>,
    /// Pop art posterization levels.
    pub levels: Option<u16>,
    /// Comic art cluster count.
    pub clusters: Option<usize>,
    /// Comic art k-means seed.
    pub seed: Option<u64>,
    /// Neon glow hue mapping toggle.
    pub color_mapping: Option<bool>,
}

impl StyleParams {
    pub fn with_preset(preset: impl Into<String>) -> Self {
        Self {
            preset: Some(preset.into()),
            ..Default::default()
        }
    }
}

// ============================================================================
// Style spec
// ============================================================================

/// Any style the engine can apply.
#[derive(Debug, Clone, PartialEq)]
pub enum StyleSpec {
    Classical(ClassicalStyle),
    Neural(NeuralStyle),
    /// Background removal.
    Sticker,
}

impl StyleSpec {
    /// Resolve any identifier into its family.
    pub fn parse(id: &str, params: Option<&StyleParams>) -> Result<Self> {
        let (family, _) = split_id(id);
        match family.as_str() {
            "sticker" => Ok(StyleSpec::Sticker),
            "cartoon" | "style-transfer" => Ok(StyleSpec::Neural(NeuralStyle::parse(id)?)),
            _ => Ok(StyleSpec::Classical(ClassicalStyle::resolve(id, params)?)),
        }
    }

    pub fn is_neural(&self) -> bool {
        matches!(self, StyleSpec::Neural(_))
    }
}

/// Split `family[:variant]`, lowercasing the family.
fn split_id(id: &str) -> (String, Option<&str>) {
    match id.split_once(':') {
        Some((family, variant)) => (family.trim().to_ascii_lowercase(), Some(variant)),
        None => (id.trim().to_ascii_lowercase(), None),
    }
}

fn join_names<const N: usize>(names: [&str; N]) -> String {
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_pixel_art_presets() {
        let style = ClassicalStyle::resolve("pixel-art:8bit", None).unwrap();
        assert_eq!(style, ClassicalStyle::PixelArt(PixelArtParams { scale: 0.08, colors: 12 }));

        let params = StyleParams::with_preset("Mosaic");
        let style = ClassicalStyle::resolve("pixel-art", Some(&params)).unwrap();
        assert_eq!(style, ClassicalStyle::PixelArt(PixelArtParams { scale: 0.05, colors: 8 }));
    }

    #[test]
    fn test_pixel_art_unknown_preset_rejected() {
        let params = StyleParams::with_preset("unknown");
        let err = ClassicalStyle::resolve("pixel-art", Some(&params)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);

        let err = ClassicalStyle::resolve("pixel-art", None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);

        let err = ClassicalStyle::resolve("pixel-art:8bit", Some(&StyleParams::with_preset("16bit"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStyle);
    }

    #[test]
    fn test_pixel_art_overrides_validated() {
        let params = StyleParams {
            preset: Some("modern".into()),
            palette_size: Some(1),
            ..Default::default()
        };
        let err = ClassicalStyle::resolve("pixel-art", Some(&params)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);
    }

    #[test]
    fn test_style_params_accepts_style_alias() {
        let params: StyleParams = serde_json::from_str(r#"{"style": "16bit"}"#).unwrap();
        assert_eq!(params.preset.as_deref(), Some("16bit"));
    }

    #[test]
    fn test_classical_identifiers() {
        for id in ["gray-sketch", "Color-Sketch", "comic-art", "manga", "neon-glow", "pop-art"] {
            let style = ClassicalStyle::resolve(id, None).unwrap();
            assert_eq!(style.name(), id.to_ascii_lowercase());
        }
        assert!(ClassicalStyle::resolve("oil-paint", None).is_err());
        assert!(ClassicalStyle::resolve("manga:dark", None).is_err());
    }

    #[test]
    fn test_neural_identifiers() {
        assert_eq!(NeuralStyle::parse("cartoon").unwrap(), NeuralStyle::Cartoon);
        assert_eq!(
            NeuralStyle::parse("style-transfer:rain_princess").unwrap(),
            NeuralStyle::StyleTransfer(TransferStyle::RainPrincess)
        );
        assert_eq!(NeuralStyle::parse("style-transfer:udnie").unwrap().id(), "style-transfer:udnie");
        assert!(NeuralStyle::parse("style-transfer:starry").is_err());
        assert!(NeuralStyle::parse("style-transfer").is_err());
        assert_eq!(TransferStyle::Udnie.max_size(), 640);
        assert_eq!(TransferStyle::Candy.max_size(), 512);
    }

    #[test]
    fn test_checkpoint_paths() {
        let dir = Path::new("models");
        assert_eq!(
            NeuralStyle::Cartoon.checkpoint_path(dir),
            PathBuf::from("models/face_paint_512_v2.safetensors")
        );
        assert_eq!(
            NeuralStyle::StyleTransfer(TransferStyle::Candy).checkpoint_path(dir),
            PathBuf::from("models/instance_norm/candy.safetensors")
        );
    }

    #[test]
    fn test_style_spec_families() {
        assert_eq!(StyleSpec::parse("sticker", None).unwrap(), StyleSpec::Sticker);
        assert!(StyleSpec::parse("cartoon", None).unwrap().is_neural());
        assert!(matches!(
            StyleSpec::parse("pop-art", None).unwrap(),
            StyleSpec::Classical(ClassicalStyle::PopArt(_))
        ));
    }
}
