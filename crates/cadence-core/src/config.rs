//! Engine configuration.
//!
//! Settings are loaded from a `cadence.toml` file. Every section and field is
//! optional; missing values fall back to the defaults below.
//!
//! ```toml
//! [window]
//! title = "My Game"
//! width = 1600
//! height = 900
//!
//! [graphics]
//! backend = "vulkan"
//! frames_in_flight = 3
//!
//! [timing]
//! fixed_time_slice = 0.01
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_FIXED_TIME_SLICE, DEFAULT_MAX_FIXED_STEPS, MAX_FRAMES_IN_FLIGHT, MIN_FRAMES_IN_FLIGHT,
};
use crate::error::{Error, Result};

/// Graphics backend selection. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Vulkan 1.3 via ash.
    Vulkan,
    /// Direct3D 12 (Windows only).
    D3d12,
    /// Simulated GPU without a device, for tests and CI.
    Headless,
}

impl Default for BackendKind {
    fn default() -> Self {
        if cfg!(target_os = "windows") {
            Self::D3d12
        } else {
            Self::Vulkan
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vulkan => "vulkan",
            Self::D3d12 => "d3d12",
            Self::Headless => "headless",
        };
        f.write_str(name)
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vulkan" | "vk" => Ok(Self::Vulkan),
            "d3d12" | "dx12" => Ok(Self::D3d12),
            "headless" | "null" => Ok(Self::Headless),
            other => Err(Error::InvalidConfig(format!("unknown backend '{other}'"))),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Window settings
    pub window: WindowSection,
    /// Graphics settings
    pub graphics: GraphicsSection,
    /// Loop timing settings
    pub timing: TimingSection,
}

/// `[window]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowSection {
    /// Window title.
    pub title: String,
    /// Initial client width in pixels.
    pub width: u32,
    /// Initial client height in pixels.
    pub height: u32,
    /// Present with vertical sync.
    pub vsync: bool,
    /// Show a blocking dialog on fatal errors (disable for unattended runs).
    pub fatal_dialog: bool,
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            title: "Cadence Engine".to_string(),
            width: 1280,
            height: 720,
            vsync: true,
            fatal_dialog: true,
        }
    }
}

/// `[graphics]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphicsSection {
    /// Which backend to construct.
    pub backend: BackendKind,
    /// Frames the CPU may record ahead of the GPU (2 or 3).
    pub frames_in_flight: usize,
    /// Prefer a software adapter (WARP, lavapipe).
    pub use_software_adapter: bool,
    /// Enable API validation layers.
    pub validation: bool,
    /// Back-buffer clear color (linear RGBA).
    pub clear_color: [f32; 4],
    /// Precompiled vertex shader for the mesh pipeline.
    pub vertex_shader: Option<PathBuf>,
    /// Precompiled fragment/pixel shader for the mesh pipeline.
    pub fragment_shader: Option<PathBuf>,
}

impl Default for GraphicsSection {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            frames_in_flight: 2,
            use_software_adapter: false,
            validation: cfg!(debug_assertions),
            clear_color: [0.05, 0.05, 0.08, 1.0],
            vertex_shader: None,
            fragment_shader: None,
        }
    }
}

/// `[timing]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSection {
    /// Fixed simulation step in seconds.
    pub fixed_time_slice: f64,
    /// Maximum fixed steps per frame; `0` disables the cap.
    pub max_fixed_steps: u32,
    /// Frame rate limit; `None` for unlimited.
    pub target_fps: Option<u32>,
}

impl Default for TimingSection {
    fn default() -> Self {
        Self {
            fixed_time_slice: DEFAULT_FIXED_TIME_SLICE,
            max_fixed_steps: DEFAULT_MAX_FIXED_STEPS,
            target_fps: None,
        }
    }
}

impl TimingSection {
    /// The step cap as used by [`crate::FixedStep`].
    #[must_use]
    pub const fn step_cap(&self) -> Option<u32> {
        if self.max_fixed_steps == 0 {
            None
        } else {
            Some(self.max_fixed_steps)
        }
    }
}

impl EngineConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&text)?;
        tracing::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        let frames = self.graphics.frames_in_flight;
        if !(MIN_FRAMES_IN_FLIGHT..=MAX_FRAMES_IN_FLIGHT).contains(&frames) {
            return Err(Error::InvalidConfig(format!(
                "frames_in_flight must be {MIN_FRAMES_IN_FLIGHT} or {MAX_FRAMES_IN_FLIGHT}, got {frames}"
            )));
        }

        let slice = self.timing.fixed_time_slice;
        if !slice.is_finite() || slice <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "fixed_time_slice must be positive, got {slice}"
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::InvalidConfig(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.timing.target_fps == Some(0) {
            return Err(Error::InvalidConfig("target_fps must be non-zero".into()));
        }

        if self.graphics.vertex_shader.is_some() != self.graphics.fragment_shader.is_some() {
            return Err(Error::InvalidConfig(
                "vertex_shader and fragment_shader must be set together".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            [graphics]
            backend = "headless"
            frames_in_flight = 3

            [timing]
            fixed_time_slice = 0.001
            max_fixed_steps = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.graphics.backend, BackendKind::Headless);
        assert_eq!(config.graphics.frames_in_flight, 3);
        assert_eq!(config.timing.step_cap(), None);
        assert_eq!(config.window.width, 1280);
    }

    #[test]
    fn rejects_unsupported_frame_counts() {
        for frames in [0, 1, 4] {
            let text = format!("[graphics]\nframes_in_flight = {frames}\n");
            assert!(matches!(
                EngineConfig::from_toml_str(&text),
                Err(Error::InvalidConfig(_))
            ));
        }
    }

    #[test]
    fn rejects_non_positive_time_slice() {
        let result = EngineConfig::from_toml_str("[timing]\nfixed_time_slice = 0.0\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn rejects_half_configured_shaders() {
        let result = EngineConfig::from_toml_str("[graphics]\nvertex_shader = \"mesh.vert.spv\"\n");
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn unknown_backend_is_a_parse_error() {
        let result = EngineConfig::from_toml_str("[graphics]\nbackend = \"metal\"\n");
        assert!(matches!(result, Err(Error::ConfigParse(_))));
    }

    #[test]
    fn backend_names_parse() {
        assert_eq!("Vulkan".parse::<BackendKind>().unwrap(), BackendKind::Vulkan);
        assert_eq!("dx12".parse::<BackendKind>().unwrap(), BackendKind::D3d12);
        assert_eq!("null".parse::<BackendKind>().unwrap(), BackendKind::Headless);
        assert!("gl".parse::<BackendKind>().is_err());
    }
}
