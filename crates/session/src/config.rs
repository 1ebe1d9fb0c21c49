//! Viewer configuration
//!
//! Loaded from a JSON file, from `ANNOTATOR_*` environment variables on top
//! of the defaults, or both. Always validated before use.

use std::path::{Path, PathBuf};
use thiserror::Error;
use viewer_core::{FitWidth, ZoomBounds, ZoomLevel};

pub const ENV_MIN_ZOOM: &str = "ANNOTATOR_MIN_ZOOM";
pub const ENV_MAX_ZOOM: &str = "ANNOTATOR_MAX_ZOOM";
pub const ENV_DEFAULT_ZOOM: &str = "ANNOTATOR_DEFAULT_ZOOM";
pub const ENV_FIT_WIDTH: &str = "ANNOTATOR_FIT_WIDTH";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid value {value:?} for {name}")]
    InvalidEnv { name: &'static str, value: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub default_zoom: f64,
    /// Fit the first loaded page to the container width
    pub fit_width_on_first_load: bool,
    pub fit_width_margin_px: f64,
    /// Multiplier applied by zoom-in/zoom-out steps
    pub zoom_step: f64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.25,
            max_zoom: 4.0,
            default_zoom: 1.0,
            fit_width_on_first_load: true,
            fit_width_margin_px: 16.0,
            zoom_step: 1.25,
        }
    }
}

impl ViewerConfig {
    /// Read and validate a JSON config file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io { path: path.to_path_buf(), message: e.to_string() })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;

        tracing::debug!(path = %path.display(), "viewer config loaded");
        Ok(config)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides looked up by variable name, then validate
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(v) = parse_var(&lookup, ENV_MIN_ZOOM)? {
            self.min_zoom = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_ZOOM)? {
            self.max_zoom = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_DEFAULT_ZOOM)? {
            self.default_zoom = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_FIT_WIDTH)? {
            self.fit_width_on_first_load = v;
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.min_zoom, self.max_zoom, self.default_zoom, self.zoom_step, self.fit_width_margin_px]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::Invalid("values must be finite".into()));
        }
        if self.min_zoom <= 0.0 {
            return Err(ConfigError::Invalid(format!("min_zoom must be > 0, got {}", self.min_zoom)));
        }
        if !(self.min_zoom <= self.default_zoom && self.default_zoom <= self.max_zoom) {
            return Err(ConfigError::Invalid(format!(
                "expected min_zoom <= default_zoom <= max_zoom, got {} / {} / {}",
                self.min_zoom, self.default_zoom, self.max_zoom
            )));
        }
        if self.zoom_step <= 1.0 {
            return Err(ConfigError::Invalid(format!("zoom_step must be > 1, got {}", self.zoom_step)));
        }
        if self.fit_width_margin_px < 0.0 {
            return Err(ConfigError::Invalid("fit_width_margin_px must not be negative".into()));
        }
        Ok(())
    }

    pub fn zoom_bounds(&self) -> Result<ZoomBounds, ConfigError> {
        ZoomBounds::new(self.min_zoom, self.max_zoom).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Shared zoom level starting at `default_zoom`
    pub fn zoom_level(&self) -> Result<ZoomLevel, ConfigError> {
        ZoomLevel::new(self.default_zoom, self.zoom_bounds()?).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// Fit-to-width request for a container, if enabled
    pub fn fit_width(&self, container_width_px: f64) -> Option<FitWidth> {
        self.fit_width_on_first_load
            .then_some(FitWidth { container_width_px, margin_px: self.fit_width_margin_px })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(name) {
        None => Ok(None),
        Some(value) => {
            let parsed = value.trim().parse::<T>();
            parsed.map(Some).map_err(|_| ConfigError::InvalidEnv { name, value })
        }
    }
}
