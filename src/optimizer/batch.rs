//! # Batch Orchestrator Module
//!
//! Distribuisce le richieste su un pool limitato di worker.
//!
//! ## Concorrenza:
//! - Un task tokio per immagine, limitati da un `Semaphore` (`workers` permessi)
//! - I risultati arrivano su un canale `mpsc` a un unico consumer, in ordine di completamento
//! - Un `ToolNotFound` alza un flag di abort *prima* di rilasciare il permesso:
//!   nessuna nuova immagine viene avviata, quelle in corso terminano
//! - Un segnale di stop esterno (`broadcast`) ferma allo stesso modo la sottomissione
//! - Timeout opzionale per immagine
//!
//! Nessun ordinamento garantito: chi consuma il report ordina da sé.

use crate::error::CompressError;
use crate::optimizer::engine::{CompressionEngine, CompressionRequest, ImageResult};
use crate::progress::{BatchStats, ProgressManager};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Result for one submitted image
#[derive(Debug)]
pub struct ImageOutcome {
    pub source: PathBuf,
    pub result: Result<ImageResult, CompressError>,
}

/// Everything a batch produced
#[derive(Debug, Default)]
pub struct BatchReport {
    /// In completion order
    pub outcomes: Vec<ImageOutcome>,
    /// The batch-fatal error that stopped submission, if any
    pub fatal: Option<CompressError>,
    /// Requests never started because of a fatal error or a stop signal
    pub not_started: Vec<PathBuf>,
}

impl BatchReport {
    pub fn successes(&self) -> impl Iterator<Item = &ImageResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&PathBuf, &CompressError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (&o.source, e)))
    }

    /// No fatal error, nothing skipped, every image compressed
    pub fn is_success(&self) -> bool {
        self.fatal.is_none() && self.not_started.is_empty() && self.failures().next().is_none()
    }

    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats::new();
        for outcome in &self.outcomes {
            match &outcome.result {
                Ok(result) => stats.add_compressed(result),
                Err(_) => stats.add_error(),
            }
        }
        stats.add_not_started(self.not_started.len());
        stats
    }
}

/// Runs many [`CompressionRequest`]s with bounded concurrency
pub struct BatchOrchestrator {
    engine: Arc<CompressionEngine>,
    workers: usize,
    per_image_timeout: Option<Duration>,
    stop_receiver: Option<broadcast::Receiver<()>>,
    progress: Option<ProgressManager>,
}

impl BatchOrchestrator {
    pub fn new(engine: CompressionEngine, workers: usize) -> Self {
        Self {
            engine: Arc::new(engine),
            workers: workers.max(1),
            per_image_timeout: None,
            stop_receiver: None,
            progress: None,
        }
    }

    /// Fail an image with [`CompressError::Timeout`] once it runs longer than `timeout`
    pub fn with_per_image_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.per_image_timeout = timeout;
        self
    }

    /// Stop submitting new images once a signal arrives on `stop_receiver`
    pub fn with_cancellation(mut self, stop_receiver: broadcast::Receiver<()>) -> Self {
        self.stop_receiver = Some(stop_receiver);
        self
    }

    /// Tick `progress` once per completed image
    pub fn with_progress(mut self, progress: ProgressManager) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(mut self, requests: Vec<CompressionRequest>) -> BatchReport {
        let total = requests.len();
        info!("Starting batch of {} images with {} workers", total, self.workers);

        let semaphore = Arc::new(Semaphore::new(self.workers));
        let abort = Arc::new(AtomicBool::new(false));
        // Capacity covers every request so a worker never blocks on send
        let (tx, mut rx) = mpsc::channel::<ImageOutcome>(total.max(1));
        let mut stop_receiver = self.stop_receiver.take();

        let submit = {
            let engine = self.engine.clone();
            let abort = abort.clone();
            let per_image_timeout = self.per_image_timeout;
            async move {
                let mut handles: Vec<(PathBuf, JoinHandle<()>)> = Vec::new();
                let mut not_started = Vec::new();
                let mut pending = requests.into_iter();

                while let Some(request) = pending.next() {
                    let permit = match semaphore.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            not_started.push(request.source_path);
                            not_started.extend(pending.by_ref().map(|r| r.source_path));
                            break;
                        }
                    };

                    if abort.load(Ordering::SeqCst) || should_stop(&mut stop_receiver) {
                        warn!("Batch stopped, {} images not started", pending.len() + 1);
                        not_started.push(request.source_path);
                        not_started.extend(pending.by_ref().map(|r| r.source_path));
                        break;
                    }

                    let source = request.source_path.clone();
                    let engine = engine.clone();
                    let abort = abort.clone();
                    let tx = tx.clone();
                    let handle = tokio::spawn(async move {
                        let result = compress_one(&engine, &request, per_image_timeout).await;
                        if let Err(ref e) = result {
                            if e.is_batch_fatal() {
                                error!("Fatal error, stopping batch: {}", e);
                                abort.store(true, Ordering::SeqCst);
                            }
                        }
                        let outcome = ImageOutcome {
                            source: request.source_path,
                            result,
                        };
                        if tx.send(outcome).await.is_err() {
                            warn!("Result channel closed");
                        }
                        drop(permit);
                    });
                    handles.push((source, handle));
                }

                (handles, not_started)
            }
        };

        let progress = self.progress.clone();
        let consume = async move {
            let mut outcomes = Vec::with_capacity(total);
            while let Some(outcome) = rx.recv().await {
                if let Some(ref progress) = progress {
                    progress.update(&progress_message(&outcome));
                }
                outcomes.push(outcome);
            }
            outcomes
        };

        let ((handles, not_started), mut outcomes) = tokio::join!(submit, consume);

        // A panicked worker never sent its outcome
        for (source, handle) in handles {
            if let Err(e) = handle.await {
                error!("Worker for {} failed: {}", source.display(), e);
                outcomes.push(ImageOutcome {
                    source,
                    result: Err(CompressError::Task(e.to_string())),
                });
            }
        }

        let fatal = outcomes.iter().find_map(|o| match &o.result {
            Err(CompressError::ToolNotFound { tool, hint }) => Some(CompressError::ToolNotFound {
                tool: tool.clone(),
                hint: hint.clone(),
            }),
            _ => None,
        });

        let report = BatchReport {
            outcomes,
            fatal,
            not_started,
        };
        info!("Batch finished: {}", report.stats().format_summary());
        report
    }
}

async fn compress_one(
    engine: &CompressionEngine,
    request: &CompressionRequest,
    per_image_timeout: Option<Duration>,
) -> Result<ImageResult, CompressError> {
    debug!("Worker started on {}", request.source_path.display());
    match per_image_timeout {
        Some(limit) => tokio::time::timeout(limit, engine.compress(request))
            .await
            .unwrap_or_else(|_| {
                Err(CompressError::Timeout {
                    operation: format!("compressing {}", request.source_path.display()),
                    after: limit,
                })
            }),
        None => engine.compress(request).await,
    }
}

/// Checks if a stop signal has been received
fn should_stop(receiver: &mut Option<broadcast::Receiver<()>>) -> bool {
    match receiver {
        Some(receiver) => match receiver.try_recv() {
            Ok(_) | Err(broadcast::error::TryRecvError::Lagged(_)) => true,
            Err(broadcast::error::TryRecvError::Empty)
            | Err(broadcast::error::TryRecvError::Closed) => false,
        },
        None => false,
    }
}

fn progress_message(outcome: &ImageOutcome) -> String {
    let name = outcome
        .source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match &outcome.result {
        Ok(result) => format!("✅ {}: {:.0}% saved", name, result.reduction_percent()),
        Err(_) => format!("❌ {}", name),
    }
}
