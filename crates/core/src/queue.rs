//! Admission queue and concurrency limiter
//!
//! Tasks enter one FIFO channel. `max_concurrent` worker loops pull from it,
//! so at most that many tasks are ever attempting. Each task's state machine
//! runs in its own spawned task: a panic is reported as
//! [`UploadEvent::Crashed`] and the worker moves on to the next task.

use crate::client::ImageHost;
use crate::config::MAX_CONCURRENT_RANGE;
use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryStore};
use crate::retry::{run_task, TaskOutcome, UploadEvent, UploadTask};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Default)]
struct Counters {
    active: AtomicUsize,
    pending: AtomicUsize,
}

struct Worker {
    id: usize,
    host: Arc<dyn ImageHost>,
    tasks: Arc<Mutex<UnboundedReceiver<UploadTask>>>,
    events: UnboundedSender<UploadEvent>,
    history: Arc<Mutex<HistoryStore>>,
    counters: Arc<Counters>,
}

impl Worker {
    async fn run(self) {
        loop {
            let next = { self.tasks.lock().await.recv().await };
            let Some(task) = next else {
                debug!(worker = self.id, "Upload queue closed, worker exiting");
                break;
            };

            self.counters.pending.fetch_sub(1, Ordering::SeqCst);
            self.counters.active.fetch_add(1, Ordering::SeqCst);

            let task_id = task.id;
            let file_name = task.file.name.clone();
            info!(worker = self.id, task = %task_id, file = %file_name, "Dispatching upload");

            let host = Arc::clone(&self.host);
            let events = self.events.clone();
            let joined =
                tokio::spawn(async move { run_task(host.as_ref(), task, &events).await }).await;

            let event = match joined {
                Ok(TaskOutcome::Succeeded(success)) => {
                    self.history
                        .lock()
                        .await
                        .insert(HistoryEntry::from_result(&success.result));
                    UploadEvent::Succeeded(success)
                }
                Ok(TaskOutcome::Failed(failure)) => UploadEvent::Failed(failure),
                Err(join_error) => {
                    error!(
                        task = %task_id,
                        file = %file_name,
                        "Upload task crashed: {}",
                        join_error
                    );
                    UploadEvent::Crashed {
                        task_id,
                        file_name,
                        reason: join_error.to_string(),
                    }
                }
            };

            self.counters.active.fetch_sub(1, Ordering::SeqCst);
            let _ = self.events.send(event);
        }
    }
}

/// FIFO admission with a bounded number of concurrently attempting tasks
pub struct UploadQueue {
    sender: UnboundedSender<UploadTask>,
    counters: Arc<Counters>,
    workers: Vec<JoinHandle<()>>,
    max_concurrent: usize,
}

impl UploadQueue {
    /// Start the worker pool. Events for every task arrive on the returned receiver.
    ///
    /// `max_concurrent` is clamped to 1..=6. Must be called inside a tokio runtime.
    pub fn new(
        host: Arc<dyn ImageHost>,
        max_concurrent: usize,
        history: Arc<Mutex<HistoryStore>>,
    ) -> (Self, UnboundedReceiver<UploadEvent>) {
        let max_concurrent = max_concurrent.clamp(MAX_CONCURRENT_RANGE.0, MAX_CONCURRENT_RANGE.1);
        let (sender, receiver) = mpsc::unbounded_channel();
        let (events, event_receiver) = mpsc::unbounded_channel();
        let tasks = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let workers = (0..max_concurrent)
            .map(|id| {
                let worker = Worker {
                    id,
                    host: Arc::clone(&host),
                    tasks: Arc::clone(&tasks),
                    events: events.clone(),
                    history: Arc::clone(&history),
                    counters: Arc::clone(&counters),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        debug!("Upload queue started with {} workers", max_concurrent);

        (
            Self {
                sender,
                counters,
                workers,
                max_concurrent,
            },
            event_receiver,
        )
    }

    /// Enqueue tasks in order without waiting for them to run
    pub fn submit(&self, tasks: impl IntoIterator<Item = UploadTask>) -> Result<usize> {
        let mut admitted = 0;
        for task in tasks {
            self.counters.pending.fetch_add(1, Ordering::SeqCst);
            if self.sender.send(task).is_err() {
                self.counters.pending.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::Other("Upload queue is closed".to_string()));
            }
            admitted += 1;
        }
        debug!("Admitted {} tasks", admitted);
        Ok(admitted)
    }

    /// Tasks currently between dispatch and a terminal state
    pub fn active(&self) -> usize {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Tasks admitted but not yet dispatched
    pub fn pending(&self) -> usize {
        self.counters.pending.load(Ordering::SeqCst)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Stop admission and wait until every queued task reached a terminal state
    pub async fn shutdown(self) {
        drop(self.sender);
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Upload worker failed: {}", e);
            }
        }
    }
}
