//! # Compression Engine Module
//!
//! Pipeline completa per una singola immagine. Un'istanza è condivisa da
//! tutti i worker: non ha stato mutabile, ogni chiamata riceve una
//! `CompressionRequest` immutabile.
//!
//! ## Stati (in ordine stretto):
//! 1. **Stat**: il sorgente esiste? formato supportato?
//! 2. **EnsureOutputDir**: crea la directory di output (idempotente)
//! 3. **Stage**: rinomina opzionale del sorgente, poi copia in output
//! 4. **Convert**: cambio formato opzionale sulla copia
//! 5. **Resize**: ridimensionamento opzionale sulla copia
//! 6. **Compress**: tool esterno sulla copia, in place
//! 7. **Finalize**: dimensione finale e `ImageResult`
//!
//! Un errore in qualsiasi stato interrompe solo questa immagine.
//! Il sorgente non viene mai spostato né passato a un tool: dopo un
//! fallimento esiste sempre l'originale oppure la sua versione rinominata.

use crate::config::Config;
use crate::error::{CompressError, Result};
use crate::file_manager::{FileManager, ImageFormat};
use crate::image_processor::ImageProcessor;
use crate::optimizer::naming::FileNamer;
use crate::tool_resolver::ToolPathResolver;
use crate::tool_runner::ToolRunner;
use crate::transform::ImageTransformer;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Everything needed to compress one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressionRequest {
    pub source_path: PathBuf,
    /// 1-100, checked by `Config::validate`
    pub quality: u8,
    pub output_dir: PathBuf,
    pub destination_suffix: String,
    pub source_suffix: String,
    pub target_format: Option<ImageFormat>,
    /// Maximum (width, height)
    pub target_dimensions: Option<(u32, u32)>,
}

impl CompressionRequest {
    /// Request with default settings for `source_path`
    pub fn new(source_path: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source_path: source_path.into(),
            quality: crate::config::DEFAULT_QUALITY,
            output_dir: output_dir.into(),
            destination_suffix: String::new(),
            source_suffix: String::new(),
            target_format: None,
            target_dimensions: None,
        }
    }
}

/// Outcome of a successful compression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageResult {
    pub compressed_path: PathBuf,
    /// The original, under its new name when it was renamed
    pub original_path: PathBuf,
    pub original_size: u64,
    pub compressed_size: u64,
    /// `[original]` or `[original, resized]`
    pub dimension_history: Vec<(u32, u32)>,
}

impl ImageResult {
    pub fn bytes_saved(&self) -> u64 {
        self.original_size.saturating_sub(self.compressed_size)
    }

    pub fn reduction_percent(&self) -> f64 {
        FileManager::calculate_reduction(self.original_size, self.compressed_size)
    }
}

/// Runs the per-image pipeline
#[derive(Debug, Clone)]
pub struct CompressionEngine {
    processor: ImageProcessor,
    transformer: ImageTransformer,
}

impl CompressionEngine {
    pub fn new(processor: ImageProcessor, transformer: ImageTransformer) -> Self {
        Self {
            processor,
            transformer,
        }
    }

    /// Engine using the tools, timeout and resize filter of `config`
    pub fn from_config(config: &Config) -> Self {
        let runner = ToolRunner::new(ToolPathResolver::new()).with_timeout(config.tool_timeout());
        Self::new(
            ImageProcessor::new(config.tools.clone(), runner),
            ImageTransformer::new(config.resize_filter),
        )
    }

    pub fn processor(&self) -> &ImageProcessor {
        &self.processor
    }

    /// Compresses one image into `request.output_dir`
    pub async fn compress(&self, request: &CompressionRequest) -> Result<ImageResult> {
        // Stat
        let (source, original_size) = self.stat(&request.source_path).await?;
        ImageFormat::from_path(&source)?;

        // EnsureOutputDir
        FileManager::ensure_dir(&request.output_dir).await?;
        let output_dir = fs::canonicalize(&request.output_dir)
            .await
            .map_err(|e| CompressError::io(&request.output_dir, e))?;

        // Stage
        let (original_path, mut destination) = self.stage(&source, &output_dir, request).await?;

        // Convert
        if let Some(target) = request.target_format {
            if ImageFormat::from_path(&destination)? != target {
                destination = self.transformer.convert_format(&destination, target).await?;
            }
        }

        // Resize
        let dimension_history = match request.target_dimensions {
            Some((width, height)) if width > 0 && height > 0 => {
                self.transformer
                    .resize_to_fit(&destination, width, height)
                    .await?
            }
            _ => vec![self.transformer.dimensions_of(&destination).await?],
        };

        // Compress
        let format = ImageFormat::from_path(&destination)?;
        let output = self
            .processor
            .compress(&destination, format, request.quality)
            .await?;
        if !output.combined().is_empty() {
            debug!("{} output: {}", output.tool, output.combined());
        }

        // Finalize
        let compressed_size = FileManager::file_size(&destination).await?;
        info!(
            "Compressed {} -> {} ({} -> {} bytes, {} took {:?})",
            original_path.display(),
            destination.display(),
            original_size,
            compressed_size,
            output.tool,
            output.elapsed
        );

        Ok(ImageResult {
            compressed_path: destination,
            original_path,
            original_size,
            compressed_size,
            dimension_history,
        })
    }

    /// Canonical source path and its size
    async fn stat(&self, path: &Path) -> Result<(PathBuf, u64)> {
        let metadata = fs::metadata(path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => CompressError::SourceNotFound(path.to_path_buf()),
            _ => CompressError::io(path, e),
        })?;
        if !metadata.is_file() {
            return Err(CompressError::io(
                path,
                std::io::Error::new(ErrorKind::InvalidInput, "not a regular file"),
            ));
        }

        let canonical = fs::canonicalize(path)
            .await
            .map_err(|e| CompressError::io(path, e))?;
        debug!("Stat {}: {} bytes", canonical.display(), metadata.len());
        Ok((canonical, metadata.len()))
    }

    /// Renames the source when asked, then copies it to the destination.
    ///
    /// Returns `(original, destination)` where `original` is the source
    /// under its current name.
    async fn stage(
        &self,
        source: &Path,
        output_dir: &Path,
        request: &CompressionRequest,
    ) -> Result<(PathBuf, PathBuf)> {
        let destination =
            FileNamer::destination_path(source, output_dir, &request.destination_suffix);
        let renamed = FileNamer::renamed_source_path(source, &request.source_suffix);

        if let Some(ref renamed) = renamed {
            if fs::try_exists(renamed).await.unwrap_or(true) {
                return Err(CompressError::RenameCollision {
                    path: renamed.clone(),
                });
            }
        }

        let original = renamed.unwrap_or_else(|| source.to_path_buf());
        if destination == original {
            return Err(CompressError::RenameCollision { path: destination });
        }
        // The source itself may sit at the destination when it gets renamed away
        if destination != source && fs::try_exists(&destination).await.unwrap_or(true) {
            return Err(CompressError::RenameCollision { path: destination });
        }

        if original != source {
            fs::rename(source, &original)
                .await
                .map_err(|e| CompressError::io(source, e))?;
            debug!("Renamed {} -> {}", source.display(), original.display());
        }

        fs::copy(&original, &destination)
            .await
            .map_err(|e| CompressError::CopyFailed {
                from: original.clone(),
                to: destination.clone(),
                source: e,
            })?;
        debug!("Staged {} -> {}", original.display(), destination.display());

        Ok((original, destination))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolConfig;
    use crate::test_support::{missing_tools, write_noisy_image, FakeTools};
    use tempfile::TempDir;

    fn engine(tools: ToolConfig) -> CompressionEngine {
        CompressionEngine::new(
            ImageProcessor::new(tools, ToolRunner::default()),
            ImageTransformer::default(),
        )
    }

    struct Workspace {
        _root: TempDir,
        input: PathBuf,
        output: PathBuf,
    }

    /// Canonical `input/` (created) and `output/` (not created) under a temp dir
    fn workspace() -> Workspace {
        let root = TempDir::new().unwrap();
        let base = root.path().canonicalize().unwrap();
        let input = base.join("input");
        std::fs::create_dir(&input).unwrap();
        Workspace {
            input,
            output: base.join("output"),
            _root: root,
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_jpeg_compressed_into_fresh_output_dir() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 400, 300);
        let original_size = std::fs::metadata(&source).unwrap().len();

        let request = CompressionRequest {
            quality: 10,
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(fakes.shrinking_config()).compress(&request).await.unwrap();

        assert_eq!(result.original_size, original_size);
        assert!(result.compressed_size < original_size);
        assert_eq!(result.compressed_path.parent().unwrap(), ws.output.as_path());
        assert_eq!(result.compressed_path, ws.output.join("photo.jpg"));
        assert_eq!(result.original_path, source);
        assert_eq!(result.dimension_history, vec![(400, 300)]);
        assert_eq!(result.bytes_saved(), original_size - 64);
        assert!(source.exists(), "the source is never modified");
        assert_eq!(std::fs::metadata(&source).unwrap().len(), original_size);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_source_and_destination_suffixes() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 64, 64);

        let request = CompressionRequest {
            source_suffix: "-ORIG".to_string(),
            destination_suffix: "-SMALL".to_string(),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(fakes.shrinking_config()).compress(&request).await.unwrap();

        let renamed = ws.input.join("photo-ORIG.jpg");
        assert!(!source.exists());
        assert!(renamed.exists());
        assert_eq!(result.original_path, renamed);
        assert_eq!(result.compressed_path, ws.output.join("photo-SMALL.jpg"));
        assert!(result.compressed_path.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resize_to_target_dimensions() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "wide.png", 800, 600);

        let tools = ToolConfig {
            png: fakes.noop("pngquant"),
            ..Default::default()
        };
        let request = CompressionRequest {
            target_dimensions: Some((200, 200)),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(tools).compress(&request).await.unwrap();

        assert_eq!(result.dimension_history, vec![(800, 600), (200, 150)]);
        let (width, height) = image::image_dimensions(&result.compressed_path).unwrap();
        assert!(width <= 200 && height <= 200);
        assert_eq!(image::image_dimensions(&source).unwrap(), (800, 600));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_convert_changes_extension_and_tool() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "pic.png", 32, 32);

        let tools = ToolConfig {
            webp: fakes.noop("cwebp"),
            ..missing_tools()
        };
        let request = CompressionRequest {
            target_format: Some(ImageFormat::Webp),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(tools).compress(&request).await.unwrap();

        assert_eq!(result.compressed_path, ws.output.join("pic.webp"));
        assert!(!ws.output.join("pic.png").exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_unsupported_type_fails_before_any_tool() {
        let ws = workspace();
        let source = ws.input.join("anim.gif");
        std::fs::write(&source, b"GIF89a").unwrap();

        // A tool invocation would surface as ToolNotFound
        let request = CompressionRequest::new(&source, &ws.output);
        match engine(missing_tools()).compress(&request).await {
            Err(CompressError::UnsupportedType { extension, .. }) => assert_eq!(extension, "gif"),
            other => panic!("expected UnsupportedType, got {:?}", other),
        }
        assert!(!ws.output.exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_missing_source() {
        let ws = workspace();
        let request = CompressionRequest::new(ws.input.join("gone.jpg"), &ws.output);
        let result = engine(missing_tools()).compress(&request).await;
        assert!(matches!(result, Err(CompressError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_existing_renamed_source_is_a_collision() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 16, 16);
        let taken = ws.input.join("photo-ORIG.jpg");
        std::fs::write(&taken, b"someone else's file").unwrap();

        let request = CompressionRequest {
            source_suffix: "-ORIG".to_string(),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(missing_tools()).compress(&request).await;

        assert!(matches!(result, Err(CompressError::RenameCollision { path }) if path == taken));
        assert!(source.exists());
        assert_eq!(std::fs::read(&taken).unwrap(), b"someone else's file");
    }

    #[tokio::test]
    async fn test_destination_equal_to_source_is_a_collision() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 16, 16);
        let before = std::fs::read(&source).unwrap();

        let request = CompressionRequest::new(&source, &ws.input);
        let result = engine(missing_tools()).compress(&request).await;

        assert!(matches!(result, Err(CompressError::RenameCollision { .. })));
        assert_eq!(std::fs::read(&source).unwrap(), before);
    }

    #[tokio::test]
    async fn test_existing_destination_is_not_overwritten() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "a.jpg", 16, 16);
        let taken = ws.input.join("a-S.jpg");
        std::fs::write(&taken, b"user's own file").unwrap();

        let request = CompressionRequest {
            destination_suffix: "-S".to_string(),
            ..CompressionRequest::new(&source, &ws.input)
        };
        let result = engine(missing_tools()).compress(&request).await;

        assert!(matches!(result, Err(CompressError::RenameCollision { path }) if path == taken));
        assert_eq!(std::fs::read(&taken).unwrap(), b"user's own file");
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_existing_converted_file_is_not_overwritten() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "pic.png", 16, 16);
        std::fs::create_dir(&ws.output).unwrap();
        let taken = ws.output.join("pic.webp");
        std::fs::write(&taken, b"user's own file").unwrap();

        let request = CompressionRequest {
            target_format: Some(ImageFormat::Webp),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(missing_tools()).compress(&request).await;

        assert!(matches!(result, Err(CompressError::RenameCollision { path }) if path == taken));
        assert_eq!(std::fs::read(&taken).unwrap(), b"user's own file");
        assert!(source.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_copy_keeps_renamed_source() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 16, 16);
        std::fs::create_dir(&ws.output).unwrap();
        // Dangling link into a directory that does not exist: the copy cannot create it
        let unreachable = ws.input.parent().unwrap().join("gone").join("photo.jpg");
        std::os::unix::fs::symlink(&unreachable, ws.output.join("photo.jpg")).unwrap();

        let request = CompressionRequest {
            source_suffix: "-ORIG".to_string(),
            ..CompressionRequest::new(&source, &ws.output)
        };
        let result = engine(missing_tools()).compress(&request).await;

        let renamed = ws.input.join("photo-ORIG.jpg");
        match result {
            Err(CompressError::CopyFailed { from, .. }) => assert_eq!(from, renamed),
            other => panic!("expected CopyFailed, got {:?}", other),
        }
        assert!(renamed.exists());
        assert!(!source.exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_in_place_with_source_suffix() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 64, 64);

        let request = CompressionRequest {
            source_suffix: "-ORIG".to_string(),
            ..CompressionRequest::new(&source, &ws.input)
        };
        let result = engine(fakes.shrinking_config()).compress(&request).await.unwrap();

        assert_eq!(result.compressed_path, source);
        assert_eq!(result.original_path, ws.input.join("photo-ORIG.jpg"));
        assert_eq!(result.compressed_size, 64);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_tool_failure_keeps_source_and_output() {
        let fakes = FakeTools::new();
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.jpg", 32, 32);

        let tools = ToolConfig {
            jpeg: fakes.failing("jpegoptim"),
            ..Default::default()
        };
        let request = CompressionRequest {
            source_suffix: "-ORIG".to_string(),
            ..CompressionRequest::new(&source, &ws.output)
        };
        match engine(tools).compress(&request).await {
            Err(CompressError::ToolExecutionFailed { output, .. }) => {
                assert!(output.contains("cannot read input"))
            }
            other => panic!("expected ToolExecutionFailed, got {:?}", other),
        }
        assert!(source.exists() || ws.input.join("photo-ORIG.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_tool_is_batch_fatal() {
        let ws = workspace();
        let source = write_noisy_image(&ws.input, "photo.png", 16, 16);

        let request = CompressionRequest::new(&source, &ws.output);
        let error = engine(missing_tools()).compress(&request).await.unwrap_err();
        assert!(error.is_batch_fatal());
        assert!(source.exists());
    }

    #[test]
    fn test_result_accessors_never_go_negative() {
        let result = ImageResult {
            compressed_path: PathBuf::from("/out/a.png"),
            original_path: PathBuf::from("/in/a.png"),
            original_size: 100,
            compressed_size: 150,
            dimension_history: vec![(1, 1)],
        };
        assert_eq!(result.bytes_saved(), 0);
        assert_eq!(result.reduction_percent(), -50.0);
    }
}
