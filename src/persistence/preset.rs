//! Preset files for single modules.
//!
//! A preset captures one module's panel values and its serialized state so
//! it can be saved to JSON and loaded back into a fresh instance.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::{DspModule, ModuleError};

/// Current preset format version.
/// Increment this when making breaking changes to the format.
pub const PRESET_VERSION: u32 = 1;

/// A saved module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    /// Human-readable name for the preset.
    pub name: String,
    /// Preset format version for future compatibility.
    pub version: u32,
    /// Module type identifier (e.g., "seq.phrase16").
    pub module_id: String,
    /// Panel values in parameter order.
    #[serde(default)]
    pub parameters: Vec<f32>,
    /// Module state as produced by [`DspModule::serialize_state`].
    #[serde(default)]
    pub state: serde_json::Value,
}

impl Preset {
    /// Creates an empty preset for `module_id`.
    pub fn new(name: impl Into<String>, module_id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: PRESET_VERSION,
            module_id: module_id.into(),
            parameters: Vec::new(),
            state: serde_json::Value::Null,
        }
    }

    /// Captures `module` and its current panel values.
    pub fn capture(
        name: impl Into<String>,
        module: &dyn DspModule,
        params: &[f32],
    ) -> Result<Self, PresetError> {
        let mut preset = Self::new(name, module.info().id);
        preset.parameters = params.to_vec();
        if let Some(bytes) = module.serialize_state() {
            preset.state = serde_json::from_slice(&bytes)?;
        }
        Ok(preset)
    }

    /// Restores the captured state into `module` and returns the panel
    /// values, padded with defaults to the module's parameter count.
    pub fn apply(&self, module: &mut dyn DspModule) -> Result<Vec<f32>, PresetError> {
        if self.module_id != module.info().id {
            return Err(PresetError::WrongModule {
                found: self.module_id.clone(),
                expected: module.info().id.to_string(),
            });
        }
        if !self.state.is_null() {
            let bytes = serde_json::to_vec(&self.state)?;
            module.deserialize_state(&bytes)?;
        }
        let params = module
            .parameters()
            .iter()
            .enumerate()
            .map(|(i, def)| {
                self.parameters
                    .get(i)
                    .map(|&v| def.clamp(v))
                    .unwrap_or(def.default)
            })
            .collect();
        Ok(params)
    }

    /// Check if this preset version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= PRESET_VERSION
    }
}

/// Error type for preset operations.
#[derive(Debug)]
pub enum PresetError {
    /// File I/O error.
    Io(std::io::Error),
    /// JSON serialization/deserialization error.
    Serialization(serde_json::Error),
    /// Incompatible preset version.
    IncompatibleVersion { found: u32, expected: u32 },
    /// The preset belongs to another module type.
    WrongModule { found: String, expected: String },
    /// The module refused the stored state.
    Module(ModuleError),
}

impl std::fmt::Display for PresetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "File error: {}", e),
            Self::Serialization(e) => write!(f, "Serialization error: {}", e),
            Self::IncompatibleVersion { found, expected } => {
                write!(f, "Incompatible preset version: found {}, expected <= {}", found, expected)
            }
            Self::WrongModule { found, expected } => {
                write!(f, "Preset is for module '{}', not '{}'", found, expected)
            }
            Self::Module(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for PresetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Serialization(e) => Some(e),
            Self::Module(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PresetError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for PresetError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err)
    }
}

impl From<ModuleError> for PresetError {
    fn from(err: ModuleError) -> Self {
        Self::Module(err)
    }
}

/// Save a preset to a JSON file.
pub fn save_to_file(preset: &Preset, path: &Path) -> Result<(), PresetError> {
    let json = serde_json::to_string_pretty(preset)?;
    std::fs::write(path, json)?;
    log::info!("saved preset '{}' to {}", preset.name, path.display());
    Ok(())
}

/// Load a preset from a JSON file.
pub fn load_from_file(path: &Path) -> Result<Preset, PresetError> {
    let json = std::fs::read_to_string(path)?;
    let preset: Preset = serde_json::from_str(&json)?;

    if !preset.is_compatible() {
        return Err(PresetError::IncompatibleVersion {
            found: preset.version,
            expected: PRESET_VERSION,
        });
    }

    log::info!("loaded preset '{}' from {}", preset.name, path.display());
    Ok(preset)
}
