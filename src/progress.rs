//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di compressione.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche del batch (immagini compresse, errori, byte)
//! - Calcolo percentuale di riduzione complessiva
//! - Riga di riepilogo finale
//!
//! ## Componenti principali:
//! - `ProgressManager`: Gestisce la progress bar (nascosta in modalità JSON)
//! - `BatchStats`: Traccia statistiche cumulative
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:04] [========================================] 12/12 (100%) ✅ photo.jpg: 45% saved
//! ```
//!
//! ## Esempio:
//! ```ignore
//! let progress = ProgressManager::new(total_images);
//! let mut stats = BatchStats::new();
//!
//! // Per ogni immagine:
//! stats.add_compressed(&result);
//! progress.update("photo.jpg");
//!
//! // Alla fine:
//! progress.finish(&stats.format_summary());
//! ```

use crate::file_manager::humanize;
use crate::optimizer::engine::ImageResult;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}";

/// Manages the batch progress bar
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total_images: u64) -> Self {
        let bar = ProgressBar::new(total_images);

        bar.set_style(
            ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Progress manager that draws nothing
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Remove the bar from the terminal
    pub fn clear(&self) {
        self.bar.finish_and_clear();
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

/// Statistics tracker for a batch
#[derive(Debug, Default, Clone, PartialEq)]
pub struct BatchStats {
    pub images_processed: usize,
    pub images_compressed: usize,
    pub errors: usize,
    pub not_started: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_compressed(&mut self, result: &ImageResult) {
        self.images_processed += 1;
        self.images_compressed += 1;
        self.total_original_size += result.original_size;
        self.total_compressed_size += result.compressed_size;
    }

    pub fn add_error(&mut self) {
        self.images_processed += 1;
        self.errors += 1;
    }

    pub fn add_not_started(&mut self, count: usize) {
        self.not_started += count;
    }

    pub fn total_bytes_saved(&self) -> u64 {
        self.total_original_size
            .saturating_sub(self.total_compressed_size)
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        if self.total_original_size > 0 {
            (self.total_bytes_saved() as f64 / self.total_original_size as f64) * 100.0
        } else {
            0.0
        }
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Processed: {} images | Compressed: {} | Errors: {} | {} -> {} | Total saved: {} ({:.2}%)",
            self.images_processed,
            self.images_compressed,
            self.errors,
            humanize(self.total_original_size),
            humanize(self.total_compressed_size),
            humanize(self.total_bytes_saved()),
            self.overall_reduction_percent()
        );
        if self.not_started > 0 {
            summary.push_str(&format!(" | Not started: {}", self.not_started));
        }
        summary
    }
}
