//! # Optimizer Module
//!
//! Modulo che separa le responsabilità in sottomoduli:
//! - `naming`: Calcolo dei nomi di destinazione e dei sorgenti rinominati
//! - `engine`: Pipeline di compressione per singola immagine
//! - `batch`: Orchestratore concorrente del batch

pub mod batch;
pub mod engine;
pub mod naming;

pub use batch::{BatchOrchestrator, BatchReport, ImageOutcome};
pub use engine::{CompressionEngine, CompressionRequest, ImageResult};
pub use naming::FileNamer;
