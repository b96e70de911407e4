//! Face location service configuration

use std::path::PathBuf;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "CROPPA_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub rate_limit: RateLimitConfig,
    pub upload: UploadConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub service_name: String,
    /// Header set by the reverse proxy carrying the real client address.
    /// `None` means only the transport peer address is trusted.
    pub trusted_ip_header: Option<String>,
    /// Allowed CORS origins; empty allows any origin
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub model_path: PathBuf,
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_face_size: u32,
    pub score_thresh: f64,
    pub neighbor_score: f64,
    pub window_step: u32,
    pub timeout_ms: u64,
    pub max_image_dimension: u32,
    pub max_decode_alloc_bytes: u64,
    /// Detections allowed in flight, timed-out workers included
    pub max_concurrent: usize,
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path))?;
        Self::parse(&content, path)
    }

    /// Load `path`, using defaults only when the file does not exist.
    /// A file that exists but cannot be read or parsed is an error.
    pub fn load_or_default(path: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse(&content, path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("failed to read config file {}", path)),
        }
    }

    fn parse(content: &str, path: &str) -> anyhow::Result<Self> {
        toml::from_str(content).with_context(|| format!("failed to parse config file {}", path))
    }

    pub fn default_path() -> String {
        std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config.toml".to_string())
    }

    /// Apply `CROPPA_*` environment overrides on top of the file values
    pub fn apply_env(&mut self) -> anyhow::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("CROPPA_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("CROPPA_PORT") {
            self.server.port = port
                .trim()
                .parse()
                .with_context(|| format!("invalid CROPPA_PORT: {}", port))?;
        }
        if let Some(origins) = lookup("CROPPA_CORS_ORIGINS") {
            self.server.cors_origins = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Reject values the limiter or the cascade cannot work with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.rate_limit.limit == 0 {
            bail!("rate_limit.limit must be at least 1");
        }
        if self.rate_limit.window_secs == 0 {
            bail!("rate_limit.window_secs must be at least 1");
        }
        if self.rate_limit.sweep_interval_secs == 0 {
            bail!("rate_limit.sweep_interval_secs must be at least 1");
        }
        if self.upload.max_bytes == 0 {
            bail!("upload.max_bytes must be positive");
        }
        let detection = &self.detection;
        if detection.scale_factor.is_nan() || detection.scale_factor <= 1.0 {
            bail!("detection.scale_factor must be greater than 1.0, got {}", detection.scale_factor);
        }
        if detection.min_face_size < 20 {
            bail!("detection.min_face_size must be at least 20, got {}", detection.min_face_size);
        }
        if detection.window_step == 0 {
            bail!("detection.window_step must be at least 1");
        }
        if detection.timeout_ms == 0 {
            bail!("detection.timeout_ms must be positive");
        }
        if detection.max_image_dimension == 0 {
            bail!("detection.max_image_dimension must be positive");
        }
        if detection.max_concurrent == 0 {
            bail!("detection.max_concurrent must be at least 1");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            upload: UploadConfig::default(),
            detection: DetectionConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            service_name: "croppa-api".to_string(),
            trusted_ip_header: Some("x-real-ip".to_string()),
            cors_origins: vec![
                "http://localhost:5173".to_string(),
                "http://localhost:3000".to_string(),
                "http://127.0.0.1:5173".to_string(),
                "http://127.0.0.1:3000".to_string(),
            ],
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 30,
            window_secs: 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 25 * 1024 * 1024,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("model/seeta_fd_frontal_v1.0.bin"),
            scale_factor: 1.1,
            min_neighbors: 5,
            min_face_size: 30,
            score_thresh: 2.0,
            neighbor_score: 1.0,
            window_step: 4,
            timeout_ms: 10_000,
            max_image_dimension: 12_000,
            max_decode_alloc_bytes: 512 * 1024 * 1024,
            max_concurrent: 8,
        }
    }
}
