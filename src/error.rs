//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della pipeline di compressione.
//!
//! ## Responsabilità:
//! - Definisce `CompressError` enum per categorizzare tutti gli errori possibili
//! - Distingue gli errori fatali per l'intero batch da quelli di una singola immagine
//! - Conserva l'output catturato dei tool esterni per la diagnostica
//! - Integra con `thiserror` per messaggi su una sola riga
//!
//! ## Categorie di errori:
//! - `SourceNotFound`: Immagine sorgente sparita prima dell'elaborazione
//! - `UnsupportedType`: Estensione non presente nella tabella dei formati
//! - `ToolNotFound`: Tool esterno mancante (fatale per tutto il batch)
//! - `ToolExecutionFailed`: Il tool è partito ma ha fallito
//! - `RenameCollision`: Il path calcolato esiste già
//! - `CopyFailed`: Copia di staging fallita
//! - `DecodeFailed` / `EncodeFailed`: Resize o conversione falliti
//! - `Timeout`, `Io`, `Task`: Errori ambientali
//!
//! ## Esempio:
//! ```ignore
//! if let Err(e) = engine.compress(&request).await {
//!     if e.is_batch_fatal() {
//!         // stop submitting new images
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;

/// Errors raised while compressing a single image or running a batch
#[derive(thiserror::Error, Debug)]
pub enum CompressError {
    #[error("source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("unsupported image type {extension:?}: {}", path.display())]
    UnsupportedType { path: PathBuf, extension: String },

    #[error("command not found: {tool} (install with: {hint})")]
    ToolNotFound { tool: String, hint: String },

    #[error("{tool} failed on {}: {reason}", path.display())]
    ToolExecutionFailed {
        tool: String,
        path: PathBuf,
        reason: String,
        /// Captured stdout followed by stderr
        output: String,
    },

    #[error("refusing to overwrite existing file: {}", path.display())]
    RenameCollision { path: PathBuf },

    #[error("failed to copy {} to {}: {source}", from.display(), to.display())]
    CopyFailed {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {}: {source}", path.display())]
    DecodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to encode {}: {source}", path.display())]
    EncodeFailed {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("worker task failed: {0}")]
    Task(String),
}

impl CompressError {
    /// Wraps an I/O error with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a configuration problem that must stop the whole batch.
    ///
    /// Only a missing external tool qualifies: every other error is tied to
    /// the data of a single image.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, Self::ToolNotFound { .. })
    }
}

pub type Result<T, E = CompressError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_tool_not_found_is_batch_fatal() {
        let fatal = CompressError::ToolNotFound {
            tool: "pngquant".to_string(),
            hint: "sudo apt-get install pngquant".to_string(),
        };
        assert!(fatal.is_batch_fatal());

        let per_image = [
            CompressError::SourceNotFound(PathBuf::from("a.jpg")),
            CompressError::UnsupportedType {
                path: PathBuf::from("a.gif"),
                extension: "gif".to_string(),
            },
            CompressError::RenameCollision {
                path: PathBuf::from("a-ORIG.jpg"),
            },
            CompressError::ToolExecutionFailed {
                tool: "cwebp".to_string(),
                path: PathBuf::from("a.webp"),
                reason: "exit status 1".to_string(),
                output: String::new(),
            },
            CompressError::Task("panicked".to_string()),
        ];
        for error in &per_image {
            assert!(!error.is_batch_fatal(), "{error} should not abort the batch");
        }
    }

    #[test]
    fn test_messages_are_single_line() {
        let error = CompressError::ToolExecutionFailed {
            tool: "jpegoptim".to_string(),
            path: PathBuf::from("/photos/a.jpg"),
            reason: "exit status 2".to_string(),
            output: "line one\nline two".to_string(),
        };
        let message = error.to_string();
        assert_eq!(message, "jpegoptim failed on /photos/a.jpg: exit status 2");
        assert!(!message.contains('\n'));
    }

    #[test]
    fn test_tool_not_found_mentions_hint() {
        let error = CompressError::ToolNotFound {
            tool: "cwebp".to_string(),
            hint: "sudo apt-get install webp".to_string(),
        };
        assert!(error.to_string().contains("sudo apt-get install webp"));
    }
}
