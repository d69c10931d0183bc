//! Scripted image host for engine tests

use crate::client::{ImageHost, UploadOutcome, UploadResult, UploadTarget};
use crate::error::{Error, Result};
use crate::file::UploadFile;
use crate::format::Links;
use crate::retry::{RetryPolicy, UploadTask};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// What the next upload attempt returns
#[derive(Debug, Clone, Copy)]
pub enum Reply {
    Ok,
    Status(u16),
    /// 2xx with `status: false`
    Rejected,
    /// Never answers
    Hang,
    /// Local file vanished (not retryable)
    Missing,
    Panic,
}

pub struct ScriptedHost {
    script: Mutex<VecDeque<Reply>>,
    calls: Mutex<Vec<Instant>>,
    hold: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    failing_deletes: Mutex<HashSet<String>>,
    deleted: Mutex<Vec<String>>,
}

impl ScriptedHost {
    /// Replies are consumed in order; once exhausted every attempt succeeds
    pub fn new(script: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            calls: Mutex::new(Vec::new()),
            hold: Duration::ZERO,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            failing_deletes: Mutex::new(HashSet::new()),
            deleted: Mutex::new(Vec::new()),
        }
    }

    /// Keep every attempt in flight for `hold` before replying
    pub fn holding(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn fail_delete(self, delete_url: &str) -> Self {
        self.failing_deletes.lock().unwrap().insert(delete_url.to_string());
        self
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ImageHost for ScriptedHost {
    async fn upload(&self, _target: &UploadTarget, file: &UploadFile) -> Result<UploadOutcome> {
        self.calls.lock().unwrap().push(Instant::now());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let reply = self.script.lock().unwrap().pop_front().unwrap_or(Reply::Ok);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }

        match reply {
            Reply::Ok => Ok(UploadOutcome {
                result: sample_result(&file.name),
                rate_limit: None,
            }),
            Reply::Status(status) => Err(Error::Http {
                status,
                message: format!("scripted {}", status),
            }),
            Reply::Rejected => Err(Error::Protocol("scripted rejection".to_string())),
            Reply::Hang => std::future::pending().await,
            Reply::Missing => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "scripted missing file",
            ))),
            Reply::Panic => panic!("scripted panic for {}", file.name),
        }
    }

    async fn delete(&self, delete_url: &str, _token: Option<&str>) -> Result<()> {
        if self.failing_deletes.lock().unwrap().contains(delete_url) {
            return Err(Error::Http {
                status: 500,
                message: "scripted delete failure".to_string(),
            });
        }
        self.deleted.lock().unwrap().push(delete_url.to_string());
        Ok(())
    }
}

pub fn sample_result(name: &str) -> UploadResult {
    UploadResult {
        origin_name: name.to_string(),
        links: Links {
            url: Some(format!("https://img.example.com/i/{}", name)),
            markdown: Some(format!("![{0}](https://img.example.com/i/{0})", name)),
            ..Links::default()
        },
        delete_url: Some(format!("https://img.example.com/api/v1/images/{}", name)),
    }
}

pub fn sample_task(name: &str, policy: RetryPolicy) -> UploadTask {
    let file = UploadFile {
        path: PathBuf::from("/nonexistent").join(name),
        name: name.to_string(),
        mime: "image/png".to_string(),
        size: 1024,
    };
    let target = UploadTarget {
        domain: "https://img.example.com".to_string(),
        token: "1|abcdefghijklmnop".to_string(),
        strategy_id: None,
    };
    UploadTask::new(file, target, policy)
}
