//! # File Naming Module
//!
//! Centralizza il calcolo dei nomi di destinazione e dei sorgenti rinominati.
//! Funzioni pure: nessun accesso al filesystem, le collisioni le rileva l'engine.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Computes destination and renamed-source paths
pub struct FileNamer;

impl FileNamer {
    /// `stem + suffix + extension`, in the same directory as `path`.
    ///
    /// An empty suffix returns `path` unchanged.
    pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
        if suffix.is_empty() {
            return path.to_path_buf();
        }
        path.with_file_name(Self::suffixed_name(path, suffix))
    }

    /// Where the compressed copy of `source` goes
    pub fn destination_path(source: &Path, output_dir: &Path, suffix: &str) -> PathBuf {
        output_dir.join(Self::suffixed_name(source, suffix))
    }

    /// New name of the original, `None` when no source suffix is set
    pub fn renamed_source_path(source: &Path, suffix: &str) -> Option<PathBuf> {
        (!suffix.is_empty()).then(|| Self::with_suffix(source, suffix))
    }

    fn suffixed_name(path: &Path, suffix: &str) -> OsString {
        let mut name = path.file_stem().map(OsString::from).unwrap_or_default();
        name.push(suffix);
        if let Some(extension) = path.extension() {
            name.push(".");
            name.push(extension);
        }
        name
    }
}
