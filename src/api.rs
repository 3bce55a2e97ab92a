//! Public entry points: format detection, memory/file loaders and the
//! flatten wrappers.

use crate::ascii::{self, LoadState};
use crate::crate_reader::{self, CrateReaderConfig};
use crate::error::{Result, UsdError, Warnings};
use crate::layer::Layer;
use crate::reconstruct::{self, ReconstructOptions};
use crate::stage::Stage;
use crate::usdz::{self, SceneFormat};

/// Resource limits applied by every entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadOptions {
    pub max_memory_limit_mb: u32,
    /// `<= 0` selects the machine's available parallelism.
    pub num_threads: i32,
    pub max_allowed_asset_size_mb: u32,
    pub max_image_width: u32,
    pub max_image_height: u32,
    pub max_image_channels: u32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            max_memory_limit_mb: 16384,
            num_threads: -1,
            max_allowed_asset_size_mb: 1024,
            max_image_width: 16384,
            max_image_height: 16384,
            max_image_channels: 16,
        }
    }
}

impl LoadOptions {
    fn max_bytes(&self) -> u64 {
        u64::from(self.max_memory_limit_mb) * 1024 * 1024
    }

    fn max_asset_bytes(&self) -> u64 {
        u64::from(self.max_allowed_asset_size_mb) * 1024 * 1024
    }

    fn resolved_threads(&self) -> usize {
        if self.num_threads <= 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.num_threads as usize
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsdFormat {
    Usda,
    Usdc,
    Usdz,
}

impl UsdFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            UsdFormat::Usda => "usda",
            UsdFormat::Usdc => "usdc",
            UsdFormat::Usdz => "usdz",
        }
    }
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

pub fn is_usda(bytes: &[u8]) -> bool {
    bytes.len() >= 9 && &bytes[..9] == b"#usda 1.0"
}

pub fn is_usdc(bytes: &[u8]) -> bool {
    bytes.len() >= 88 && &bytes[..8] == b"PXR-USDC"
}

pub fn is_usdz(bytes: &[u8]) -> bool {
    usdz::parse_usdz_index(bytes).is_ok()
}

/// Detect the encoding, USDA and USDC by magic, USDZ by a full index walk.
pub fn detect_format(bytes: &[u8]) -> Option<UsdFormat> {
    if is_usda(bytes) {
        Some(UsdFormat::Usda)
    } else if is_usdc(bytes) {
        Some(UsdFormat::Usdc)
    } else if is_usdz(bytes) {
        Some(UsdFormat::Usdz)
    } else {
        None
    }
}

pub fn is_usd(bytes: &[u8]) -> bool {
    detect_format(bytes).is_some()
}

// ---------------------------------------------------------------------------
// Layer loading
// ---------------------------------------------------------------------------

fn check_size_limit(len: usize, what: &str, options: &LoadOptions) -> Result<()> {
    if len as u64 > options.max_bytes() {
        return Err(UsdError::Input(format!(
            "{what} is {len} byte(s), which exceeds the {} MB memory limit",
            options.max_memory_limit_mb
        )));
    }
    Ok(())
}

/// Parse USDA or USDC bytes into an uncomposed layer.
pub fn load_layer_from_memory(bytes: &[u8], state: LoadState) -> Result<(Layer, Warnings)> {
    load_layer_from_memory_with_options(bytes, state, &LoadOptions::default())
}

pub fn load_layer_from_memory_with_options(
    bytes: &[u8],
    state: LoadState,
    options: &LoadOptions,
) -> Result<(Layer, Warnings)> {
    check_size_limit(bytes.len(), "layer input", options)?;
    if is_usdc(bytes) {
        let config = CrateReaderConfig {
            num_threads: options.resolved_threads(),
        };
        crate_reader::read_usdc(bytes, &config)
    } else if is_usda(bytes) {
        ascii::parse_usda(bytes, state)
    } else {
        Err(UsdError::Format(
            "input is neither USDA nor USDC".to_string(),
        ))
    }
}

pub fn load_layer_from_file(path: &str) -> Result<(Layer, Warnings)> {
    load_layer_from_file_with_state(path, LoadState::Toplevel)
}

pub(crate) fn load_layer_from_file_with_state(
    path: &str,
    state: LoadState,
) -> Result<(Layer, Warnings)> {
    let options = LoadOptions::default();
    let bytes = read_file_bounded(path, &options)?;
    load_layer_from_memory_with_options(&bytes, state, &options)
}

fn read_file_bounded(path: &str, options: &LoadOptions) -> Result<Vec<u8>> {
    let meta = std::fs::metadata(path)
        .map_err(|e| UsdError::Input(format!("cannot stat `{path}`: {e}")))?;
    if meta.len() > options.max_bytes() {
        return Err(UsdError::Input(format!(
            "`{path}` is {} byte(s), which exceeds the {} MB memory limit",
            meta.len(),
            options.max_memory_limit_mb
        )));
    }
    std::fs::read(path).map_err(|e| UsdError::Input(format!("cannot read `{path}`: {e}")))
}

// ---------------------------------------------------------------------------
// Stage loading
// ---------------------------------------------------------------------------

fn stage_from_layer(layer: &Layer, mut warnings: Warnings) -> Result<(Stage, Warnings)> {
    let (stage, rec_warnings) =
        reconstruct::layer_to_stage(layer, ReconstructOptions::default())?;
    warnings.extend(rec_warnings);
    Ok((stage, warnings))
}

/// Parse USDA text and reconstruct a stage. Composition arcs are left
/// unresolved; use the flatten pipeline for those.
pub fn load_usda_from_memory(
    bytes: &[u8],
    base_dir: &str,
    options: &LoadOptions,
) -> Result<(Stage, Warnings)> {
    check_size_limit(bytes.len(), "USDA input", options)?;
    if !is_usda(bytes) {
        return Err(UsdError::Format("missing `#usda 1.0` magic".to_string()));
    }
    let (layer, mut warnings) = ascii::parse_usda(bytes, LoadState::Toplevel)?;
    if layer.has_unresolved_sublayers() {
        warnings.push(format!(
            "subLayers are not composed by the direct loader (base dir `{base_dir}`); flatten the layer instead"
        ));
    }
    stage_from_layer(&layer, warnings)
}

pub fn load_usdc_from_memory(
    bytes: &[u8],
    filename: &str,
    options: &LoadOptions,
) -> Result<(Stage, Warnings)> {
    check_size_limit(bytes.len(), "USDC input", options)?;
    let config = CrateReaderConfig {
        num_threads: options.resolved_threads(),
    };
    let (layer, warnings) = crate_reader::read_usdc(bytes, &config).map_err(|e| match e {
        UsdError::Format(msg) => UsdError::Format(format!("{filename}: {msg}")),
        other => other,
    })?;
    stage_from_layer(&layer, warnings)
}

pub fn load_usdz_from_memory(
    bytes: &[u8],
    filename: &str,
    options: &LoadOptions,
) -> Result<(Stage, Warnings)> {
    check_size_limit(bytes.len(), "USDZ input", options)?;
    let assets = usdz::parse_usdz_index(bytes)?;

    for asset in &assets {
        let size = (asset.byte_end - asset.byte_begin) as u64;
        if size > options.max_asset_bytes() {
            return Err(UsdError::Input(format!(
                "asset `{}` in `{filename}` is {size} byte(s), which exceeds the {} MB asset limit",
                asset.filename, options.max_allowed_asset_size_mb
            )));
        }
    }

    let mut warnings = Warnings::new();
    let (index, format) = usdz::select_primary_scene(&assets, &mut warnings)?;
    let scene = &assets[index];
    let scene_bytes = &bytes[scene.byte_begin..scene.byte_end];

    let (stage, scene_warnings) = match format {
        SceneFormat::Usdc => load_usdc_from_memory(scene_bytes, &scene.filename, options)?,
        SceneFormat::Usda => load_usda_from_memory(scene_bytes, "", options)?,
    };
    warnings.extend(scene_warnings);
    Ok((stage, warnings))
}

/// Auto-detecting loader: USDC and USDA by magic, USDZ as the fallback.
pub fn load_usd_from_memory(
    bytes: &[u8],
    base_dir: &str,
    options: &LoadOptions,
) -> Result<(Stage, Warnings)> {
    if is_usdc(bytes) {
        load_usdc_from_memory(bytes, base_dir, options)
    } else if is_usda(bytes) {
        load_usda_from_memory(bytes, base_dir, options)
    } else {
        load_usdz_from_memory(bytes, base_dir, options)
    }
}

pub fn load_usd_from_file(path: &str, options: &LoadOptions) -> Result<(Stage, Warnings)> {
    let bytes = read_file_bounded(path, options)?;
    let base_dir = crate::resolver::base_dir(path);
    load_usd_from_memory(&bytes, &base_dir, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detection() {
        assert!(is_usda(b"#usda 1.0\n"));
        assert!(!is_usda(b"#usda 2.0\n"));
        assert!(!is_usdc(b"PXR-USDC"));
        let mut usdc_header = vec![0u8; 88];
        usdc_header[..8].copy_from_slice(b"PXR-USDC");
        assert!(is_usdc(&usdc_header));
        assert_eq!(detect_format(b"#usda 1.0\n"), Some(UsdFormat::Usda));
        assert_eq!(detect_format(b"garbage"), None);
    }

    #[test]
    fn memory_limit_applies_before_parsing() {
        let options = LoadOptions {
            max_memory_limit_mb: 0,
            ..Default::default()
        };
        let err = load_usda_from_memory(b"#usda 1.0\n", "", &options).unwrap_err();
        assert!(matches!(err, UsdError::Input(_)));
    }

    #[test]
    fn usda_stage_loads_end_to_end() {
        let (stage, warnings) = load_usda_from_memory(
            b"#usda 1.0\ndef Sphere \"ball\"\n{\n    double radius = 3.0\n}\n",
            "",
            &LoadOptions::default(),
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(stage.root_prims.len(), 1);
        let prim = &stage.root_prims[0];
        assert_eq!(prim.name, "ball");
        match &prim.data {
            crate::stage::PrimData::Sphere(s) => assert_eq!(s.radius, 3.0),
            other => panic!("expected sphere, got {}", other.type_label()),
        }
    }
}
