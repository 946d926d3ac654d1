//! # Report Output Module
//!
//! Rendering dei risultati di un batch per l'utente.
//!
//! ## Formati:
//! - **Tabella**: una riga per immagine, ordinata per nome file
//!   (`nome   orig -> comp | byte -> byte | LxA [-> LxA]`)
//! - **JSON**: oggetto indicizzato dal nome del file compresso
//! - **Errori**: `path: causa`, una riga per immagine, su stderr

use crate::error::CompressError;
use crate::file_manager::humanize;
use crate::optimizer::engine::ImageResult;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Original and compressed value of one measure
#[derive(Debug, Serialize)]
pub struct SizePair<T> {
    pub original_size: T,
    pub compressed_size: T,
}

/// JSON entry for one compressed image
#[derive(Debug, Serialize)]
pub struct JsonEntry {
    pub bytes: SizePair<u64>,
    pub human: SizePair<String>,
    pub dimensions: Vec<(u32, u32)>,
}

impl From<&ImageResult> for JsonEntry {
    fn from(result: &ImageResult) -> Self {
        Self {
            bytes: SizePair {
                original_size: result.original_size,
                compressed_size: result.compressed_size,
            },
            human: SizePair {
                original_size: humanize(result.original_size),
                compressed_size: humanize(result.compressed_size),
            },
            dimensions: result.dimension_history.clone(),
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn sorted_by_name(results: &[ImageResult]) -> Vec<&ImageResult> {
    let mut sorted: Vec<&ImageResult> = results.iter().collect();
    sorted.sort_by_key(|result| file_name(&result.compressed_path));
    sorted
}

fn format_dimensions(history: &[(u32, u32)]) -> String {
    history
        .iter()
        .map(|(width, height)| format!("{}x{}", width, height))
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Human-readable table, one aligned row per image
pub fn render_table(results: &[ImageResult]) -> String {
    let rows: Vec<[String; 4]> = sorted_by_name(results)
        .into_iter()
        .map(|result| {
            [
                file_name(&result.compressed_path),
                format!(
                    "{} -> {}",
                    humanize(result.original_size),
                    humanize(result.compressed_size)
                ),
                format!("{} -> {}", result.original_size, result.compressed_size),
                format_dimensions(&result.dimension_history),
            ]
        })
        .collect();

    let mut widths = [0usize; 4];
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut table = String::new();
    for [name, human, bytes, dimensions] in &rows {
        table.push_str(&format!(
            "{:<w0$}   {:>w1$} | {:>w2$} | {:>w3$}\n",
            name,
            human,
            bytes,
            dimensions,
            w0 = widths[0],
            w1 = widths[1],
            w2 = widths[2],
            w3 = widths[3],
        ));
    }
    table
}

/// Pretty JSON object keyed by compressed file name
pub fn render_json(results: &[ImageResult]) -> serde_json::Result<String> {
    let entries: BTreeMap<String, JsonEntry> = results
        .iter()
        .map(|result| (file_name(&result.compressed_path), JsonEntry::from(result)))
        .collect();
    serde_json::to_string_pretty(&entries)
}

/// `path: cause` line for a failed image
pub fn failure_line(source: &Path, error: &CompressError) -> String {
    format!("{}: {}", source.display(), error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn result(name: &str, original: u64, compressed: u64, dims: Vec<(u32, u32)>) -> ImageResult {
        ImageResult {
            compressed_path: PathBuf::from("/out").join(name),
            original_path: PathBuf::from("/in").join(name),
            original_size: original,
            compressed_size: compressed,
            dimension_history: dims,
        }
    }

    #[test]
    fn test_table_is_sorted_and_aligned() {
        let results = vec![
            result("zebra.png", 2048, 1024, vec![(10, 10)]),
            result("a.jpg", 100_000, 20_000, vec![(800, 600), (200, 150)]),
        ];

        let table = render_table(&results);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(
            lines,
            vec![
                "a.jpg       98K -> 20K | 100000 -> 20000 | 800x600 -> 200x150",
                "zebra.png     2K -> 1K |    2048 -> 1024 |              10x10",
            ]
        );
        assert_eq!(lines[0].chars().count(), lines[1].chars().count());
        assert_eq!(lines[0].find('|'), lines[1].find('|'));
    }

    #[test]
    fn test_empty_table() {
        assert!(render_table(&[]).is_empty());
    }

    #[test]
    fn test_json_shape() {
        let results = vec![result("a-SMALL.jpg", 2048, 1024, vec![(800, 600), (200, 150)])];
        let json: serde_json::Value = serde_json::from_str(&render_json(&results).unwrap()).unwrap();

        let entry = &json["a-SMALL.jpg"];
        assert_eq!(entry["bytes"]["original_size"], 2048);
        assert_eq!(entry["bytes"]["compressed_size"], 1024);
        assert_eq!(entry["human"]["original_size"], "2K");
        assert_eq!(entry["human"]["compressed_size"], "1K");
        assert_eq!(entry["dimensions"], serde_json::json!([[800, 600], [200, 150]]));
    }

    #[test]
    fn test_failure_line() {
        let error = CompressError::SourceNotFound(PathBuf::from("/in/gone.jpg"));
        assert_eq!(
            failure_line(Path::new("/in/gone.jpg"), &error),
            "/in/gone.jpg: source image not found: /in/gone.jpg"
        );
    }
}
