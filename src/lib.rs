//! # Kompressor Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Tipi di errore della pipeline
//! - `file_manager`: Tabella formati, discovery immagini, `humanize`
//! - `tool_resolver` / `tool_runner`: Ricerca ed esecuzione dei tool esterni
//! - `image_processor`: Dispatch per formato verso jpegoptim/pngquant/cwebp
//! - `transform`: Resize e conversione di formato
//! - `optimizer`: Pipeline per immagine e orchestratore del batch
//! - `progress` / `report`: Progress bar, statistiche e output
//!
//! ## Utilizzo:
//! ```ignore
//! use kompressor::{BatchOrchestrator, CompressionEngine, Config};
//!
//! let config = Config::default();
//! let engine = CompressionEngine::from_config(&config);
//! let report = BatchOrchestrator::new(engine, config.workers)
//!     .run(config.requests(&sources))
//!     .await;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod image_processor;
pub mod optimizer;
pub mod progress;
pub mod report;
pub mod tool_resolver;
pub mod tool_runner;
pub mod transform;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::CompressError;
pub use file_manager::{humanize, ImageFormat};
pub use optimizer::{
    BatchOrchestrator, BatchReport, CompressionEngine, CompressionRequest, ImageResult,
};
