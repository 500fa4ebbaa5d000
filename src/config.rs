//! Configuration for the renderlink client
//!
//! Loads configuration from a TOML file: where the render server lives,
//! what to render with, and how to log.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub logging: LoggingConfig,
}

/// Render server endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server host name or address
    pub host: String,
    /// Server TCP port
    pub port: u16,
}

/// Render parameters passed through to the server
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RenderConfig {
    /// Renderer selection string ("scivis" or "pathtracer")
    pub renderer: String,
    /// Framebuffer width in pixels
    pub width: u32,
    /// Framebuffer height in pixels
    pub height: u32,
    /// Sample budget per render
    pub samples: u32,
    /// Path tracer recursion depth
    pub max_depth: u32,
    /// Ambient occlusion samples (scivis renderer)
    pub ao_samples: u32,
    /// Ambient occlusion radius in world units
    pub ao_radius: f32,
    /// Whether the scivis renderer computes shadows
    pub shadows_enabled: bool,
    /// Stop refining below this variance; 0 disables the threshold
    pub variance_threshold: f32,
    /// Initial resolution reduction for interactive rendering
    ///
    /// The preview starts at width/factor x height/factor and refines;
    /// the factor only ever decreases across restarts.
    pub reduction_factor: u32,
    /// Send every Nth accumulated framebuffer during final renders
    pub update_rate: u32,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log output (stdout, stderr, or file path)
    pub output: String,
}

impl AppConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| Error::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Default configuration against a local server
    ///
    /// Suitable for testing and development. Production deployments
    /// should use a proper TOML configuration file.
    pub fn localhost_defaults() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 5909,
            },
            render: RenderConfig {
                renderer: "scivis".to_string(),
                width: 960,
                height: 540,
                samples: 16,
                max_depth: 4,
                ao_samples: 2,
                ao_radius: 1.0,
                shadows_enabled: true,
                variance_threshold: 0.0,
                reduction_factor: 4,
                update_rate: 1,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                output: "stdout".to_string(),
            },
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::localhost_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::localhost_defaults();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 5909);
        assert_eq!(config.render.renderer, "scivis");
        assert_eq!(config.render.samples, 16);
        assert_eq!(config.render.reduction_factor, 4);
    }

    #[test]
    fn test_toml_serialization() {
        let config = AppConfig::localhost_defaults();
        let toml_string = toml::to_string_pretty(&config).unwrap();

        // Should contain all sections
        assert!(toml_string.contains("[server]"));
        assert!(toml_string.contains("[render]"));
        assert!(toml_string.contains("[logging]"));

        // Should contain key values
        assert!(toml_string.contains("port = 5909"));
        assert!(toml_string.contains("renderer = \"scivis\""));
    }

    #[test]
    fn test_toml_deserialization() {
        let toml_content = r#"
[server]
host = "render-box.local"
port = 6000

[render]
renderer = "pathtracer"
width = 1920
height = 1080
samples = 64
max_depth = 8
ao_samples = 0
ao_radius = 1.0
shadows_enabled = false
variance_threshold = 0.01
reduction_factor = 2
update_rate = 4

[logging]
level = "debug"
output = "stdout"
"#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.server.host, "render-box.local");
        assert_eq!(config.render.renderer, "pathtracer");
        assert_eq!(config.render.samples, 64);
        assert_eq!(config.logging.level, "debug");
    }
}
