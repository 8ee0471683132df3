//! Core engine services shared by every backend

pub mod config;
pub mod error;
pub mod logging;

pub use config::{
    ApplicationConfig, Config, ConfigError, EngineConfig, RendererConfig, WindowConfig,
    DEFAULT_FRAMES_IN_FLIGHT,
};
pub use error::{EngineError, EngineResult};
