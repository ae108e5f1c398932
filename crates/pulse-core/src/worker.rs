//! Per-session chunk serialization.
//!
//! Session state is mutable and not safe for concurrent mutation, so each
//! session is owned by a dedicated worker thread fed through a bounded
//! channel: at most one chunk is in flight per session, while distinct
//! sessions run fully in parallel.

use crossbeam_channel::{bounded, Sender};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use tracing::debug;

use crate::domain::{ChunkOutput, EngineError, SessionId};
use crate::engine::Engine;

/// Commands sent to a session worker thread.
enum WorkerCmd {
    Process {
        samples: Vec<f32>,
        sample_rate: f32,
        reply: Sender<Result<ChunkOutput, EngineError>>,
    },
    Shutdown,
}

/// Handle to a thread that owns one session.
pub struct SessionWorker {
    id: SessionId,
    tx: Sender<WorkerCmd>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SessionWorker {
    /// Spawn a worker owning a fresh session.
    pub fn spawn(engine: Arc<Engine>, sample_rate: f32) -> Self {
        let mut session = engine.create_session(sample_rate);
        let id = session.id().clone();

        // Capacity 1: the caller blocks rather than queueing chunks, keeping
        // at most one in flight per session.
        let (tx, rx) = bounded::<WorkerCmd>(1);

        let handle = thread::spawn(move || {
            while let Ok(cmd) = rx.recv() {
                match cmd {
                    WorkerCmd::Process {
                        samples,
                        sample_rate,
                        reply,
                    } => {
                        let result = engine.process_chunk(&mut session, &samples, sample_rate);
                        let _ = reply.send(result);
                    }
                    WorkerCmd::Shutdown => break,
                }
            }
            debug!("session worker stopped");
        });

        Self {
            id,
            tx,
            handle: Some(handle),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Process one chunk, blocking until the session's turn completes.
    pub fn process(&self, samples: Vec<f32>, sample_rate: f32) -> Result<ChunkOutput, EngineError> {
        let (reply_tx, reply_rx) = bounded(1);
        self.tx
            .send(WorkerCmd::Process {
                samples,
                sample_rate,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::WorkerClosed)?;
        reply_rx.recv().map_err(|_| EngineError::WorkerClosed)?
    }

    /// Stop the worker and wait for the thread to finish.
    pub fn shutdown(mut self) {
        let _ = self.tx.send(WorkerCmd::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        let _ = self.tx.send(WorkerCmd::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Registry of live session workers, keyed by session id.
pub struct SessionRegistry {
    engine: Arc<Engine>,
    workers: Mutex<HashMap<SessionId, SessionWorker>>,
}

impl SessionRegistry {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            workers: Mutex::new(HashMap::new()),
        }
    }

    /// Start a session and return its id.
    pub fn start_session(&self, sample_rate: f32) -> SessionId {
        let worker = SessionWorker::spawn(Arc::clone(&self.engine), sample_rate);
        let id = worker.id().clone();
        self.workers.lock().insert(id.clone(), worker);
        id
    }

    /// Route a chunk to its session worker.
    pub fn process(
        &self,
        id: &SessionId,
        samples: Vec<f32>,
        sample_rate: f32,
    ) -> Result<ChunkOutput, EngineError> {
        // Clone the command sender so the map lock is not held while a chunk
        // is processed; sessions must not serialize each other.
        let tx = {
            let workers = self.workers.lock();
            let worker = workers.get(id).ok_or(EngineError::UnknownSession)?;
            worker.tx.clone()
        };

        let (reply_tx, reply_rx) = bounded(1);
        tx.send(WorkerCmd::Process {
            samples,
            sample_rate,
            reply: reply_tx,
        })
        .map_err(|_| EngineError::WorkerClosed)?;
        reply_rx.recv().map_err(|_| EngineError::WorkerClosed)?
    }

    /// Stop and remove a session.
    pub fn end_session(&self, id: &SessionId) {
        if let Some(worker) = self.workers.lock().remove(id) {
            worker.shutdown();
        }
    }

    pub fn live_sessions(&self) -> usize {
        self.workers.lock().len()
    }
}
