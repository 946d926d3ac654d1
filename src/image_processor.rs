//! # Image Processing Module
//!
//! Questo modulo invoca il compressore esterno giusto per ogni formato.
//!
//! ## Formati Supportati
//!
//! | Formato | Tool      | Riga di comando                                             |
//! |---------|-----------|-------------------------------------------------------------|
//! | JPEG    | jpegoptim | `jpegoptim --quiet --overwrite --strip-exif --max <q> <f>`  |
//! | PNG     | pngquant  | `pngquant --force --quality 0-<q> --output <f> <f>`         |
//! | WebP    | cwebp     | `cwebp -q <q> -o <f> <f>`                                   |
//!
//! Tutti e tre comprimono **in place**: input e output sono lo stesso file,
//! cioè la copia già presente nella directory di output. L'originale non
//! viene mai passato a un tool.
//!
//! ## Error Handling
//!
//! - **Tool mancante**: `ToolNotFound`, fatale per tutto il batch
//! - **Exit status non zero**: `ToolExecutionFailed` con stdout/stderr catturati
//! - **File sparito dopo il tool**: `ToolExecutionFailed`
//!
//! Nessun fallback su altri tool: un tool che fallisce è un errore
//! dell'immagine, non un motivo per provare altro.
//!
//! ## Esempio
//!
//! ```ignore
//! let processor = ImageProcessor::new(config.tools.clone(), runner);
//! processor.check_dependencies([ImageFormat::Jpeg])?;
//! let output = processor.compress(&staged, ImageFormat::Jpeg, 80).await?;
//! ```

use crate::config::ToolConfig;
use crate::error::{CompressError, Result};
use crate::file_manager::ImageFormat;
use crate::tool_runner::{ToolOutput, ToolRunner};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dispatches compression of one file to the external tool of its format
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    tools: ToolConfig,
    runner: ToolRunner,
}

impl ImageProcessor {
    pub fn new(tools: ToolConfig, runner: ToolRunner) -> Self {
        Self { tools, runner }
    }

    /// Program configured for `format`
    pub fn tool_for(&self, format: ImageFormat) -> &str {
        self.tools.for_format(format)
    }

    /// Full command line compressing `path` in place
    pub fn command_for(&self, format: ImageFormat, path: &Path, quality: u8) -> Vec<OsString> {
        let tool = self.tool_for(format);
        let (options, file_args) = match format {
            ImageFormat::Jpeg => (
                crate::args![tool, "--quiet", "--overwrite", "--strip-exif", "--max", quality],
                1,
            ),
            ImageFormat::Png => (
                crate::args![tool, "--force", "--quality", format!("0-{}", quality), "--output"],
                2,
            ),
            ImageFormat::Webp => (crate::args![tool, "-q", quality, "-o"], 2),
        };

        // pngquant and cwebp name the file twice, as output and as input
        options
            .into_iter()
            .map(OsString::from)
            .chain(std::iter::repeat(path.as_os_str().to_os_string()).take(file_args))
            .collect()
    }

    /// Compresses `path` in place with the tool for `format`.
    ///
    /// The captured output is returned on success so callers can log it.
    pub async fn compress(&self, path: &Path, format: ImageFormat, quality: u8) -> Result<ToolOutput> {
        let command = self.command_for(format, path, quality);
        debug!("Compressing {} as {} (quality {})", path.display(), format, quality);

        let output = self.runner.run(&command).await?;
        if !output.success {
            return Err(CompressError::ToolExecutionFailed {
                tool: output.tool.clone(),
                path: path.to_path_buf(),
                reason: output.describe_status(),
                output: output.combined(),
            });
        }

        let produced = tokio::fs::try_exists(path).await.unwrap_or(false);
        if !produced {
            return Err(CompressError::ToolExecutionFailed {
                tool: output.tool.clone(),
                path: path.to_path_buf(),
                reason: "no output file was produced".to_string(),
                output: output.combined(),
            });
        }

        Ok(output)
    }

    /// Formats the batch will hand to a compressor, in table order.
    ///
    /// With `convert` set that is the only one; unsupported sources need none.
    pub fn required_formats(sources: &[PathBuf], convert: Option<ImageFormat>) -> Vec<ImageFormat> {
        if let Some(format) = convert {
            return if sources.is_empty() { Vec::new() } else { vec![format] };
        }
        [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Webp]
            .into_iter()
            .filter(|format| {
                sources
                    .iter()
                    .any(|source| ImageFormat::from_path(source).ok() == Some(*format))
            })
            .collect()
    }

    /// Fails with [`CompressError::ToolNotFound`] on the first missing tool among `formats`
    pub fn check_dependencies<I>(&self, formats: I) -> Result<()>
    where
        I: IntoIterator<Item = ImageFormat>,
    {
        let resolver = self.runner.resolver();
        for format in formats {
            let tool = self.tool_for(format);
            match resolver.resolve_tool(tool) {
                Some(path) => info!("✅ {} compressor: {} -> {}", format, tool, path.display()),
                None => {
                    return Err(CompressError::ToolNotFound {
                        tool: tool.to_string(),
                        hint: crate::tool_resolver::ToolPathResolver::install_hint(tool),
                    })
                }
            }
        }
        Ok(())
    }

    /// Availability of all three configured compressors
    pub fn available_tools_report(&self) -> String {
        self.runner
            .resolver()
            .tools_report(&[&self.tools.jpeg, &self.tools.png, &self.tools.webp])
    }
}
