//! Concurrent document pipeline.
//!
//! Each document runs as three stages on their own threads: a source that
//! pulls records from a leased rendering worker, the line classifier, and
//! the tree assembler. Stages are joined by bounded queues carrying
//! [`Flow`] values, so end of stream and failure travel downstream in band.
//! Every document has a cancellation token derived from the run token; a
//! failing stage cancels it so the source stops early, and the orchestrator
//! cancels the run token to abort every other document.

use crate::config::AppConfig;
use crate::core::assembler::{AssembledDocument, TreeAssembler};
use crate::core::classifier::LineClassifier;
use crate::core::layout::{DocumentMetadata, DocumentTree};
use crate::core::record::{ParagraphRecord, SourceEvent};
use crate::core::signal::StructuralSignal;
use crate::error::{ConfigError, PipelineError};
use crate::worker::WorkerPool;
use async_channel::{bounded, Receiver, Sender};
use log::{debug, error, info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::thread;
use tokio_util::sync::CancellationToken;

/// Value carried between stages.
#[derive(Debug)]
pub enum Flow<T> {
    Item(T),
    End,
    Failed(PipelineError),
}

/// Runs one document through source, classifier and assembler.
pub struct DocumentPipeline<'a> {
    index: usize,
    path: &'a Path,
    pool: &'a WorkerPool,
    config: &'a AppConfig,
    classifier: LineClassifier,
}

impl<'a> DocumentPipeline<'a> {
    pub fn new(
        index: usize,
        path: &'a Path,
        pool: &'a WorkerPool,
        config: &'a AppConfig,
        classifier: LineClassifier,
    ) -> Self {
        Self {
            index,
            path,
            pool,
            config,
            classifier,
        }
    }

    /// Blocks until the document is assembled, fails, or `token` is
    /// cancelled. All stage threads have exited when this returns.
    pub fn run(self, token: &CancellationToken) -> Result<AssembledDocument, PipelineError> {
        let (record_tx, record_rx) = bounded(self.config.pipeline.record_queue_capacity);
        let (signal_tx, signal_rx) = bounded(self.config.pipeline.signal_queue_capacity);
        let Self {
            index,
            path,
            pool,
            config,
            classifier,
        } = self;

        thread::scope(|scope| -> Result<AssembledDocument, PipelineError> {
            thread::Builder::new()
                .name(format!("source-{}", index))
                .spawn_scoped(scope, || source_stage(index, path, pool, record_tx, token))?;
            thread::Builder::new()
                .name(format!("classify-{}", index))
                .spawn_scoped(scope, || classifier_stage(classifier, record_rx, signal_tx, token))?;

            let mut assembler = TreeAssembler::new(&config.assembler);
            let result = assembler_stage(&mut assembler, signal_rx);
            if result.is_err() {
                token.cancel();
            }
            result.map(|()| assembler.finish())
        })
    }
}

fn source_stage(
    index: usize,
    path: &Path,
    pool: &WorkerPool,
    tx: Sender<Flow<ParagraphRecord>>,
    token: &CancellationToken,
) {
    let result = (|| -> Result<usize, PipelineError> {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        let mut lease = pool.acquire(index)?;
        let mut source = lease.open(path, token)?;
        let mut count = 0usize;
        loop {
            if token.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }
            match source.pull() {
                SourceEvent::Record(record) => {
                    count += 1;
                    tx.send_blocking(Flow::Item(record))
                        .map_err(|_| PipelineError::StageDisconnected("classifier"))?;
                }
                SourceEvent::End => {
                    tx.send_blocking(Flow::End)
                        .map_err(|_| PipelineError::StageDisconnected("classifier"))?;
                    return Ok(count);
                }
                SourceEvent::Error(e) => return Err(e.into()),
            }
        }
    })();

    match result {
        Ok(count) => debug!("source for {} finished after {} records", path.display(), count),
        Err(PipelineError::StageDisconnected(_)) => debug!("source for {} stopped, downstream gone", path.display()),
        // whatever the worker reported after the abort is a consequence of it
        Err(e) if token.is_cancelled() => {
            debug!("source for {} aborted: {}", path.display(), e);
            let _ = tx.send_blocking(Flow::Failed(PipelineError::Cancelled));
        }
        Err(e) => {
            let _ = tx.send_blocking(Flow::Failed(e));
        }
    }
}

fn classifier_stage(
    mut classifier: LineClassifier,
    rx: Receiver<Flow<ParagraphRecord>>,
    tx: Sender<Flow<StructuralSignal>>,
    token: &CancellationToken,
) {
    let forward = |signals: Vec<StructuralSignal>| -> Result<(), PipelineError> {
        for signal in signals {
            tx.send_blocking(Flow::Item(signal))
                .map_err(|_| PipelineError::StageDisconnected("assembler"))?;
        }
        Ok(())
    };

    let result = (|| -> Result<(), PipelineError> {
        loop {
            match rx.recv_blocking() {
                Ok(Flow::Item(record)) => forward(classifier.feed(record)?)?,
                Ok(Flow::End) => {
                    forward(classifier.finish())?;
                    return tx
                        .send_blocking(Flow::End)
                        .map_err(|_| PipelineError::StageDisconnected("assembler"));
                }
                Ok(Flow::Failed(e)) => return Err(e),
                Err(_) => return Err(PipelineError::StageDisconnected("source")),
            }
        }
    })();

    if let Err(e) = result {
        // stop the source before it renders the rest of the document
        token.cancel();
        drop(rx);
        if !matches!(e, PipelineError::StageDisconnected("assembler")) {
            let _ = tx.send_blocking(Flow::Failed(e));
        }
    }
}

/// Cancellation reaches this stage as `Flow::Failed` from upstream, so a
/// real failure is never masked by the token it triggered.
fn assembler_stage(
    assembler: &mut TreeAssembler,
    rx: Receiver<Flow<StructuralSignal>>,
) -> Result<(), PipelineError> {
    loop {
        match rx.recv_blocking() {
            Ok(Flow::Item(signal)) => assembler.push(signal)?,
            Ok(Flow::End) => return Ok(()),
            Ok(Flow::Failed(e)) => return Err(e),
            Err(_) => return Err(PipelineError::StageDisconnected("classifier")),
        }
    }
}

/// Runs many documents concurrently and aggregates their trees in input
/// order.
pub struct Orchestrator {
    config: AppConfig,
    pool: WorkerPool,
    classifier: LineClassifier,
    threads: rayon::ThreadPool,
}

impl Orchestrator {
    pub fn new(config: AppConfig, pool: WorkerPool) -> Result<Self, PipelineError> {
        config.validate()?;
        if pool.size() == 0 {
            return Err(ConfigError::Invalid("worker pool is empty".to_string()).into());
        }
        let classifier = LineClassifier::new(&config.classifier)
            .map_err(|e| ConfigError::Invalid(format!("classifier.level_keywords: {}", e)))?;
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(config.pipeline.max_concurrent_documents)
            .thread_name(|i| format!("document-{}", i))
            .build()
            .map_err(|e| PipelineError::ThreadPool(e.to_string()))?;
        Ok(Self {
            config,
            pool,
            classifier,
            threads,
        })
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Parses every input and returns one tree holding a child per
    /// document, in input order. Any document failure aborts the run.
    pub fn run(&self, inputs: &[PathBuf], run_token: &CancellationToken) -> Result<DocumentTree, PipelineError> {
        let run_id = uuid::Uuid::new_v4().to_string();
        info!(
            "run {}: {} documents, {} concurrent, {} workers",
            run_id,
            inputs.len(),
            self.config.pipeline.max_concurrent_documents,
            self.pool.size()
        );

        let results: Vec<Result<AssembledDocument, PipelineError>> = self.threads.install(|| {
            inputs
                .par_iter()
                .enumerate()
                .map(|(index, path)| {
                    let token = run_token.child_token();
                    let pipeline =
                        DocumentPipeline::new(index, path, &self.pool, &self.config, self.classifier.clone());
                    let result = pipeline.run(&token);
                    match &result {
                        Ok(doc) => debug!("{}: {} nodes", path.display(), doc.nodes_built),
                        Err(e) if e.is_cancellation() => debug!("{}: cancelled", path.display()),
                        Err(e) => {
                            error!("{} failed: {}", path.display(), e);
                            run_token.cancel();
                        }
                    }
                    result
                })
                .collect()
        });

        let mut tree = DocumentTree::new(DocumentMetadata {
            run_id,
            generated_at: Some(chrono::Utc::now().to_rfc3339()),
            sources: inputs.iter().map(|p| p.display().to_string()).collect(),
        });
        let mut cancelled = false;
        for (path, result) in inputs.iter().zip(results) {
            match result {
                Ok(AssembledDocument { root: Some(root), orphans, .. }) => {
                    if orphans > 0 {
                        warn!("{}: {} orphan nodes left out of the tree", path.display(), orphans);
                    }
                    tree.push_document(root);
                }
                Ok(AssembledDocument { root: None, .. }) => {
                    warn!("{}: no structural nodes, skipped", path.display());
                }
                Err(e) if e.is_cancellation() => cancelled = true,
                Err(e) => {
                    return Err(PipelineError::DocumentFailed {
                        path: path.clone(),
                        source: Box::new(e),
                    })
                }
            }
        }
        if cancelled {
            return Err(PipelineError::Cancelled);
        }

        info!("run {}: {} documents assembled", tree.metadata.run_id, tree.documents.len());
        Ok(tree)
    }
}
