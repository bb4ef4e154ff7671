//! Per-source ingestion queues.
//!
//! Every source gets its own bounded queue drained by one spawned task, so
//! a source's messages are ingested in arrival order while a source stuck
//! on a slow store read never holds up the others.

use std::collections::HashMap;
use std::sync::Arc;

use common::RawMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::{IngestStatus, RuleEngine};

/// Messages buffered per source before `route` waits for the worker.
pub const QUEUE_DEPTH: usize = 1024;

pub struct SourceRouter {
    engine: Arc<RuleEngine>,
    queues: HashMap<String, mpsc::Sender<RawMessage>>,
    workers: Vec<JoinHandle<()>>,
}

impl SourceRouter {
    pub fn new(engine: Arc<RuleEngine>) -> Self {
        Self {
            engine,
            queues: HashMap::new(),
            workers: Vec::new(),
        }
    }

    /// Sources with a running worker.
    pub fn sources(&self) -> usize {
        self.queues.len()
    }

    /// Queue `msg` on its source's worker, starting one if needed.
    pub async fn route(&mut self, msg: RawMessage) {
        let source_id = msg.source_id.clone();
        let msg = match self.sender(&source_id).send(msg).await {
            Ok(()) => return,
            Err(mpsc::error::SendError(msg)) => msg,
        };

        // Only reachable if the worker died; start a fresh one.
        warn!("{}: ingestion worker stopped, restarting", source_id);
        self.queues.remove(&source_id);
        if self.sender(&source_id).send(msg).await.is_err() {
            error!("{}: ingestion worker unavailable, message dropped", source_id);
        }
    }

    /// Close every queue and wait for the workers to drain them.
    pub async fn finish(mut self) {
        self.queues.clear();
        for worker in self.workers.drain(..) {
            if let Err(e) = worker.await {
                error!("ingestion worker failed: {}", e);
            }
        }
    }

    fn sender(&mut self, source_id: &str) -> mpsc::Sender<RawMessage> {
        if let Some(tx) = self.queues.get(source_id) {
            return tx.clone();
        }
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let engine = Arc::clone(&self.engine);
        let owner = source_id.to_string();
        self.workers.push(tokio::spawn(drain(engine, owner, rx)));
        debug!("{}: ingestion worker started", source_id);
        self.queues.insert(source_id.to_string(), tx.clone());
        tx
    }
}

async fn drain(engine: Arc<RuleEngine>, source_id: String, mut rx: mpsc::Receiver<RawMessage>) {
    while let Some(msg) = rx.recv().await {
        if let IngestStatus::Accepted { notifications } = engine.ingest(&msg).await {
            if notifications > 0 {
                info!("{}: {} notification(s) queued", source_id, notifications);
            }
        }
    }
    debug!("{}: ingestion queue closed", source_id);
}
