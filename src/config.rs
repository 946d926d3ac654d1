//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione di un batch di compressione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di compressione
//! - Fornisce validazione dei parametri prima di avviare il batch
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Costruisce una `CompressionRequest` immutabile per ogni immagine
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità di compressione (1-100, default: 80)
//! - `output_dir`: Directory di output (default: "kompressor", creata se manca)
//! - `destination_suffix` / `source_suffix`: Suffissi per rinominare output e originali
//! - `convert`: Formato di destinazione opzionale (jpeg, png, webp)
//! - `dimensions`: Box massimo (larghezza, altezza); (0, 0) = nessun resize
//! - `workers`: Numero di worker paralleli (default: core disponibili)
//! - `tool_timeout_secs` / `image_timeout_secs`: Timeout opzionali
//! - `tools`: Nomi o path dei compressori esterni
//!
//! ## Esempio:
//! ```ignore
//! let config = Config {
//!     quality: 60,
//!     destination_suffix: "-SMALL".to_string(),
//!     ..Default::default()
//! };
//! config.validate()?;
//! let requests = config.requests(&sources);
//! ```

use crate::file_manager::ImageFormat;
use crate::optimizer::engine::CompressionRequest;
use crate::transform::ResizeFilter;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default compression quality
pub const DEFAULT_QUALITY: u8 = 80;

/// Default output directory, relative to the working directory
pub const DEFAULT_OUTPUT_DIR: &str = "kompressor";

/// External compressor for each format
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub jpeg: String,
    pub png: String,
    pub webp: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            jpeg: "jpegoptim".to_string(),
            png: "pngquant".to_string(),
            webp: "cwebp".to_string(),
        }
    }
}

impl ToolConfig {
    /// Program used for `format`
    pub fn for_format(&self, format: ImageFormat) -> &str {
        match format {
            ImageFormat::Jpeg => &self.jpeg,
            ImageFormat::Png => &self.png,
            ImageFormat::Webp => &self.webp,
        }
    }
}

/// Configuration for a compression batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Compression quality (1-100)
    pub quality: u8,
    /// Directory receiving the compressed images
    pub output_dir: PathBuf,
    /// Appended to the stem of compressed images
    pub destination_suffix: String,
    /// Appended to the stem of the original images (renamed in place)
    pub source_suffix: String,
    /// Convert to this format before compressing
    pub convert: Option<ImageFormat>,
    /// Maximum (width, height); (0, 0) disables resizing
    pub dimensions: (u32, u32),
    /// Number of parallel workers
    pub workers: usize,
    /// Kill an external tool after this many seconds
    pub tool_timeout_secs: Option<u64>,
    /// Give up on one image after this many seconds
    pub image_timeout_secs: Option<u64>,
    /// Resampling filter used when resizing
    pub resize_filter: ResizeFilter,
    /// Print results as JSON instead of a table
    pub json_output: bool,
    /// External compressor per format
    pub tools: ToolConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            destination_suffix: String::new(),
            source_suffix: String::new(),
            convert: None,
            dimensions: (0, 0),
            workers: default_workers(),
            tool_timeout_secs: None,
            image_timeout_secs: None,
            resize_filter: ResizeFilter::default(),
            json_output: false,
            tools: ToolConfig::default(),
        }
    }
}

/// One worker per available core
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(anyhow::anyhow!("Quality must be between 1 and 100"));
        }

        if self.workers == 0 {
            return Err(anyhow::anyhow!("Number of workers must be greater than 0"));
        }

        if self.tool_timeout_secs == Some(0) || self.image_timeout_secs == Some(0) {
            return Err(anyhow::anyhow!("Timeouts must be at least one second"));
        }

        for (label, suffix) in [
            ("Destination suffix", &self.destination_suffix),
            ("Source suffix", &self.source_suffix),
        ] {
            if suffix.contains('/') || suffix.contains(std::path::MAIN_SEPARATOR) {
                return Err(anyhow::anyhow!(
                    "{} must not contain a path separator: {:?}",
                    label,
                    suffix
                ));
            }
        }

        for tool in [&self.tools.jpeg, &self.tools.png, &self.tools.webp] {
            if tool.trim().is_empty() {
                return Err(anyhow::anyhow!("Tool names must not be empty"));
            }
        }

        Ok(())
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    pub fn image_timeout(&self) -> Option<Duration> {
        self.image_timeout_secs.map(Duration::from_secs)
    }

    /// Builds the immutable request for each source image
    pub fn requests(&self, sources: &[PathBuf]) -> Vec<CompressionRequest> {
        sources
            .iter()
            .map(|source| CompressionRequest {
                source_path: source.clone(),
                quality: self.quality,
                output_dir: self.output_dir.clone(),
                destination_suffix: self.destination_suffix.clone(),
                source_suffix: self.source_suffix.clone(),
                target_format: self.convert,
                target_dimensions: match self.dimensions {
                    (0, _) | (_, 0) => None,
                    dimensions => Some(dimensions),
                },
            })
            .collect()
    }

    /// `<config dir>/kompressor/config.json`, when the platform has a config dir
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("kompressor").join("config.json"))
    }

    /// Load configuration from file.
    ///
    /// Values are not validated here: CLI flags may still override them, so
    /// callers run [`Config::validate`] on the merged result.
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Invalid config file {}: {}", path.display(), e))?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
