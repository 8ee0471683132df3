//! # Engine Configuration
//!
//! Serializable configuration for the application identity, the window and
//! the renderer. Every structure has sensible defaults, `with_*` builder
//! methods and a `validate()` pass that is run before any GPU object is
//! created from it.
//!
//! Files are loaded through the [`Config`] trait, which picks TOML or RON
//! from the file extension.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of frames the CPU may record ahead of the GPU
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Upper bound accepted for `frames_in_flight`
pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

/// Load/save support for configuration files
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from a `.toml` or `.ron` file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
            ConfigFormat::Ron => ron::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string())),
        }
    }

    /// Save configuration to a `.toml` or `.ron` file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but failed validation
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Application identity reported to the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name for Vulkan instance creation
    pub name: String,
    /// Application version (major, minor, patch)
    pub version: (u32, u32, u32),
}

impl ApplicationConfig {
    /// Create a new application configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: (1, 0, 0),
        }
    }

    /// Set application version
    pub fn with_version(mut self, major: u32, minor: u32, patch: u32) -> Self {
        self.version = (major, minor, patch);
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }
        if self.name.contains('\0') {
            return Err("Application name cannot contain NUL bytes".to_string());
        }
        Ok(())
    }
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self::new("Adore Application")
    }
}

/// Initial window parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Window title
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
    /// Whether the user may resize the window
    pub resizable: bool,
    /// Prefer FIFO presentation even when MAILBOX is available
    pub vsync: bool,
}

impl WindowConfig {
    /// Create a window configuration with the default size
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the initial size
    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Allow or forbid user resizing
    pub fn with_resizable(mut self, resizable: bool) -> Self {
        self.resizable = resizable;
        self
    }

    /// Enable or disable vsync
    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Window extent must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Adore".to_string(),
            width: 800,
            height: 600,
            resizable: true,
            vsync: true,
        }
    }
}

/// # Renderer Configuration
///
/// Frame pacing and debug settings for the Vulkan backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Number of frame slots the CPU may record ahead of the GPU
    pub frames_in_flight: usize,
    /// Whether to enable Vulkan validation layers (`None` follows the build type)
    pub enable_validation: Option<bool>,
    /// Clear color for the color attachment (RGBA)
    pub clear_color: [f32; 4],
}

impl RendererConfig {
    /// Set frames in flight
    pub fn with_frames_in_flight(mut self, frames: usize) -> Self {
        self.frames_in_flight = frames;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.frames_in_flight == 0 {
            return Err("Frames in flight must be at least 1".to_string());
        }
        if self.frames_in_flight > MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Frames in flight should not exceed {MAX_FRAMES_IN_FLIGHT}, got {}",
                self.frames_in_flight
            ));
        }
        if self.clear_color.iter().any(|c| !c.is_finite()) {
            return Err("Clear color components must be finite".to_string());
        }
        Ok(())
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            enable_validation: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// # Complete Engine Configuration
///
/// Top-level configuration that applications load from disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// Application identity
    pub application: ApplicationConfig,
    /// Window parameters
    pub window: WindowConfig,
    /// Renderer parameters
    pub renderer: RendererConfig,
}

impl EngineConfig {
    /// Create a configuration for the named application
    pub fn new(app_name: impl Into<String>) -> Self {
        let application = ApplicationConfig::new(app_name);
        Self {
            window: WindowConfig::new(application.name.clone()),
            application,
            renderer: RendererConfig::default(),
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), String> {
        self.application.validate()?;
        self.window.validate()?;
        self.renderer.validate()?;
        Ok(())
    }

    /// Load and validate a configuration file
    pub fn load_validated(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }
}

impl Config for EngineConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("adore_config_{}_{name}", std::process::id()))
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.renderer.frames_in_flight, DEFAULT_FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        let zero = RendererConfig::default().with_frames_in_flight(0);
        assert!(zero.validate().is_err());

        let too_many = RendererConfig::default().with_frames_in_flight(MAX_FRAMES_IN_FLIGHT + 1);
        assert!(too_many.validate().is_err());

        let max = RendererConfig::default().with_frames_in_flight(MAX_FRAMES_IN_FLIGHT);
        assert!(max.validate().is_ok());
    }

    #[test]
    fn test_window_extent_must_be_non_zero() {
        let config = WindowConfig::new("Test").with_size(0, 360);
        assert!(config.validate().is_err());
        assert!(WindowConfig::new("Test").with_size(640, 360).validate().is_ok());
    }

    #[test]
    fn test_application_name_rejects_nul() {
        assert!(ApplicationConfig::new("").validate().is_err());
        assert!(ApplicationConfig::new("bad\0name").validate().is_err());
    }

    #[test]
    fn test_explicit_validation_overrides_build_type() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
    }

    #[test]
    fn test_toml_file_round_trip() {
        let path = temp_path("engine.toml");
        let mut config = EngineConfig::new("TestApp");
        config.window = config.window.with_size(640, 360).with_vsync(false);
        config.renderer = config.renderer.with_frames_in_flight(3);

        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_validated(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ron_file_round_trip() {
        let path = temp_path("engine.ron");
        let config = EngineConfig::new("RonApp");

        config.save_to_file(&path).unwrap();
        let loaded = EngineConfig::load_from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.application.name, "RonApp");
    }

    #[test]
    fn test_unsupported_extension() {
        let config = EngineConfig::default();
        let result = config.save_to_file(temp_path("engine.json"));
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_invalid_file_is_rejected_after_parse() {
        let path = temp_path("invalid.toml");
        let mut config = EngineConfig::default();
        config.renderer.frames_in_flight = 0;
        config.save_to_file(&path).unwrap();

        let result = EngineConfig::load_validated(&path);
        std::fs::remove_file(&path).ok();

        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }
}
