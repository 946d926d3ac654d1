//! # File Management Module
//!
//! Questo modulo gestisce le operazioni sui file condivise dalla pipeline.
//!
//! ## Responsabilità:
//! - Tabella dei formati supportati (estensione → `ImageFormat`)
//! - Discovery delle immagini dentro una directory passata da CLI
//! - Creazione idempotente della directory di output (sicura sotto concorrenza)
//! - Formattazione human-readable delle dimensioni
//! - Calcolo percentuale di riduzione
//!
//! ## Formati supportati:
//! | Estensione        | Formato canonico |
//! |-------------------|------------------|
//! | `png`             | `png`            |
//! | `jpg`, `jpeg`     | `jpeg`           |
//! | `webp`            | `webp`           |
//!
//! Il confronto è case-insensitive. Qualsiasi altra estensione è un
//! `CompressError::UnsupportedType`.
//!
//! ## Esempio:
//! ```ignore
//! let format = ImageFormat::from_path(Path::new("photo.JPG"))?;
//! assert_eq!(format, ImageFormat::Jpeg);
//! assert_eq!(humanize(1_000_000), "977K");
//! ```

use crate::error::{CompressError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Canonical format tag resolved once from a file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Webp,
}

impl ImageFormat {
    /// Looks an extension up in the supported-format table (case-insensitive)
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpeg" | "jpg" => Some(Self::Jpeg),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }

    /// Resolves the format of a path from its extension
    pub fn from_path(path: &Path) -> Result<Self> {
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self::from_extension(&extension).ok_or_else(|| CompressError::UnsupportedType {
            path: path.to_path_buf(),
            extension,
        })
    }

    /// Extension written when converting to this format
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }

    /// Matching codec in the `image` crate
    pub fn codec(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::Webp => image::ImageFormat::WebP,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Manages file operations and discovery
pub struct FileManager;

impl FileManager {
    /// Size in bytes of a file
    pub async fn file_size(path: &Path) -> Result<u64> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| CompressError::io(path, e))?;
        Ok(metadata.len())
    }

    /// Creates `dir` and its parents if missing.
    ///
    /// Safe to call from many workers at once: losing the creation race is
    /// success. A non-directory already sitting at `dir`, or any other failure
    /// such as permission denied, is reported.
    pub async fn ensure_dir(dir: &Path) -> Result<()> {
        match fs::create_dir_all(dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => {
                debug!("Output directory created concurrently: {}", dir.display());
                Ok(())
            }
            Err(e) => Err(CompressError::io(dir, e)),
        }
    }

    /// Supported images directly inside `dir`, sorted by path
    pub fn find_images(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|path| Self::is_supported_format(path))
            .collect();
        files.sort();
        files
    }

    /// Directories expand to the supported images directly inside them,
    /// anything else is kept as given
    pub fn expand_sources(sources: &[PathBuf]) -> Vec<PathBuf> {
        sources
            .iter()
            .flat_map(|source| {
                if source.is_dir() {
                    let images = Self::find_images(source);
                    debug!("{}: {} images", source.display(), images.len());
                    images
                } else {
                    vec![source.clone()]
                }
            })
            .collect()
    }

    /// Check if a file extension is in the supported-format table
    pub fn is_supported_format(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(ImageFormat::from_extension)
            .is_some()
    }

    /// Calculate percentage reduction
    pub fn calculate_reduction(original_size: u64, new_size: u64) -> f64 {
        if original_size == 0 {
            0.0
        } else {
            ((original_size as f64 - new_size as f64) / original_size as f64) * 100.0
        }
    }
}

/// Human-readable size, scaling by 1024 through B, K, M and G.
///
/// G is the last unit even when the value exceeds 1024 of it. B, K and M are
/// rounded to whole numbers, G keeps one decimal.
pub fn humanize(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "K", "M", "G"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == UNITS.len() - 1 {
        format!("{:.1}{}", size, UNITS[unit_index])
    } else {
        format!("{:.0}{}", size, UNITS[unit_index])
    }
}
