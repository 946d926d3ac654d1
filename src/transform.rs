//! # Image Transform Module
//!
//! Ridimensionamento e conversione di formato eseguiti *prima* della
//! compressione, sulla copia già presente nella directory di output.
//!
//! ## Operazioni:
//! - `dimensions_of`: Legge solo l'header, nessuna modifica
//! - `resize_to_fit`: Riduce (mai ingrandisce) mantenendo l'aspect ratio
//! - `convert_format`: Ricodifica in un nuovo formato ed elimina il file vecchio
//!
//! ## Note:
//! - Decode/encode sono CPU-bound: girano su `spawn_blocking`
//! - Un massimo pari a 0 (larghezza o altezza) significa "nessun resize"
//! - JPEG non supporta l'alpha: l'immagine viene portata a RGB8 prima del salvataggio
//! - La qualità finale la decide il compressore esterno, qui si usa l'encoder di default

use crate::error::{CompressError, Result};
use crate::file_manager::ImageFormat;
use image::imageops::FilterType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Resampling filters available for resizing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    /// Nearest neighbour, fastest
    Nearest,
    Triangle,
    CatmullRom,
    Gaussian,
    /// Best quality for downscaling
    #[default]
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Optional resize/convert step applied to the staged destination copy
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTransformer {
    filter: ResizeFilter,
}

impl ImageTransformer {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    /// Width and height of the image at `path`
    pub async fn dimensions_of(&self, path: &Path) -> Result<(u32, u32)> {
        let path = path.to_path_buf();
        run_blocking(move || {
            image::image_dimensions(&path).map_err(|source| CompressError::DecodeFailed {
                path: path.clone(),
                source,
            })
        })
        .await
    }

    /// Shrinks the image in place so it fits within `max_width` x `max_height`.
    ///
    /// Returns `[original, new]`. When either maximum is 0 nothing is resized
    /// and only `[original]` is returned.
    pub async fn resize_to_fit(
        &self,
        path: &Path,
        max_width: u32,
        max_height: u32,
    ) -> Result<Vec<(u32, u32)>> {
        if max_width == 0 || max_height == 0 {
            return Ok(vec![self.dimensions_of(path).await?]);
        }

        let path = path.to_path_buf();
        let filter = FilterType::from(self.filter);
        run_blocking(move || {
            let format = ImageFormat::from_path(&path)?;
            let img = decode(&path)?;
            let original = (img.width(), img.height());
            let target = fit_within(original, (max_width, max_height));

            if target == original {
                debug!("{} already fits {}x{}", path.display(), max_width, max_height);
                return Ok(vec![original, original]);
            }

            let resized = img.resize_exact(target.0, target.1, filter);
            encode(resized, &path, format)?;
            debug!(
                "Resized {}: {}x{} -> {}x{}",
                path.display(),
                original.0,
                original.1,
                target.0,
                target.1
            );
            Ok(vec![original, target])
        })
        .await
    }

    /// Re-encodes the image as `format` next to the original and deletes the original.
    ///
    /// Fails with [`CompressError::RenameCollision`] when another file already
    /// sits at the converted path.
    pub async fn convert_format(&self, path: &Path, format: ImageFormat) -> Result<PathBuf> {
        let source = path.to_path_buf();
        let target = source.with_extension(format.extension());
        if target != source && tokio::fs::try_exists(&target).await.unwrap_or(true) {
            return Err(CompressError::RenameCollision { path: target });
        }
        run_blocking(move || {
            let img = decode(&source)?;
            encode(img, &target, format)?;
            if target != source {
                std::fs::remove_file(&source).map_err(|e| CompressError::io(&source, e))?;
            }
            debug!("Converted {} -> {}", source.display(), target.display());
            Ok(target)
        })
        .await
    }
}

/// Largest size with the same aspect ratio that fits in `max`, never upscaling
pub fn fit_within((width, height): (u32, u32), (max_width, max_height): (u32, u32)) -> (u32, u32) {
    if width == 0 || height == 0 || (width <= max_width && height <= max_height) {
        return (width, height);
    }

    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * scale).round() as u32).clamp(1, max_height);
    (new_width, new_height)
}

fn decode(path: &Path) -> Result<DynamicImage> {
    image::open(path).map_err(|source| CompressError::DecodeFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn encode(img: DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    let img = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::Webp if img.color().has_alpha() => DynamicImage::ImageRgba8(img.to_rgba8()),
        ImageFormat::Webp => DynamicImage::ImageRgb8(img.to_rgb8()),
        ImageFormat::Png => img,
    };

    img.save_with_format(path, format.codec())
        .map_err(|source| CompressError::EncodeFailed {
            path: path.to_path_buf(),
            source,
        })
}

async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| CompressError::Task(e.to_string()))?
}
