//! Per-file upload lifecycle: attempts, backoff and the terminal decision

use crate::client::{ImageHost, RateLimit, UploadResult, UploadTarget};
use crate::config::UploadSettings;
use crate::error::Error;
use crate::file::UploadFile;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Attempt budget and timing for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Automatic attempts per run. Zero still performs the first attempt.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Bound on a single attempt, not on the whole task
    pub attempt_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &UploadSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay,
            attempt_timeout: settings.request_timeout,
        }
    }

    /// Number of attempts a run may make
    pub fn attempt_budget(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay after failed attempt `attempt`: `base_delay * 2^(attempt - 1)`
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&UploadSettings::default())
    }
}

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Attempting,
    Retrying,
    Succeeded,
    TerminalFailure,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::TerminalFailure)
    }
}

/// One file's upload, owned by its state machine until terminal
#[derive(Debug, Clone)]
pub struct UploadTask {
    pub id: Uuid,
    pub file: UploadFile,
    pub target: UploadTarget,
    pub policy: RetryPolicy,
    attempt: u32,
    state: TaskState,
}

impl UploadTask {
    pub fn new(file: UploadFile, target: UploadTarget, policy: RetryPolicy) -> Self {
        Self {
            id: Uuid::new_v4(),
            file,
            target,
            policy,
            attempt: 1,
            state: TaskState::Pending,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn file_name(&self) -> &str {
        &self.file.name
    }
}

/// A task that reached `Succeeded`
#[derive(Debug, Clone)]
pub struct UploadSuccess {
    pub task_id: Uuid,
    pub result: UploadResult,
    pub rate_limit: Option<RateLimit>,
    pub attempts: u32,
}

/// A task that exhausted its attempts. Only a manual restart runs it again.
#[derive(Debug)]
pub struct TerminalFailure {
    pub task: UploadTask,
    pub error: Error,
    pub attempts: u32,
}

impl TerminalFailure {
    /// A brand-new run of the same file: attempt counter back to 1, `Pending`
    pub fn restart(self) -> UploadTask {
        let mut task = self.task;
        task.attempt = 1;
        task.state = TaskState::Pending;
        task
    }

    pub fn file_name(&self) -> &str {
        self.task.file_name()
    }
}

/// Terminal outcome of one run
#[derive(Debug)]
pub enum TaskOutcome {
    Succeeded(UploadSuccess),
    Failed(TerminalFailure),
}

/// Notifications for the result sink
#[derive(Debug)]
pub enum UploadEvent {
    /// An attempt is about to be issued
    Attempting {
        task_id: Uuid,
        file_name: String,
        attempt: u32,
        max_attempts: u32,
    },
    /// An attempt failed and another is scheduled after `delay`
    Retrying {
        task_id: Uuid,
        file_name: String,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
    },
    /// The task succeeded; emitted once per run
    Succeeded(UploadSuccess),
    /// The task exhausted its attempts; restart is available
    Failed(TerminalFailure),
    /// The task's state machine panicked; the queue kept running
    Crashed {
        task_id: Uuid,
        file_name: String,
        reason: String,
    },
}

/// Drive a task through attempts until it succeeds or fails terminally.
///
/// Emits `Attempting` and `Retrying`; the terminal event belongs to the caller.
pub async fn run_task(
    host: &dyn ImageHost,
    mut task: UploadTask,
    events: &UnboundedSender<UploadEvent>,
) -> TaskOutcome {
    let budget = task.policy.attempt_budget();

    loop {
        let attempt = task.attempt;
        task.state = TaskState::Attempting;
        debug!(task = %task.id, file = %task.file.name, attempt, budget, "Attempting upload");
        let _ = events.send(UploadEvent::Attempting {
            task_id: task.id,
            file_name: task.file.name.clone(),
            attempt,
            max_attempts: budget,
        });

        let result = match tokio::time::timeout(
            task.policy.attempt_timeout,
            host.upload(&task.target, &task.file),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout),
        };

        match result {
            Ok(outcome) => {
                task.state = TaskState::Succeeded;
                info!(task = %task.id, file = %task.file.name, attempt, "Upload succeeded");
                return TaskOutcome::Succeeded(UploadSuccess {
                    task_id: task.id,
                    result: outcome.result,
                    rate_limit: outcome.rate_limit,
                    attempts: attempt,
                });
            }
            Err(error) if error.is_retryable() && attempt < budget => {
                let delay = task.policy.backoff_delay(attempt);
                task.state = TaskState::Retrying;
                warn!(
                    task = %task.id,
                    file = %task.file.name,
                    attempt,
                    budget,
                    delay_ms = delay.as_millis() as u64,
                    %error,
                    "Upload attempt failed, retrying"
                );
                let _ = events.send(UploadEvent::Retrying {
                    task_id: task.id,
                    file_name: task.file.name.clone(),
                    attempt,
                    max_attempts: budget,
                    delay,
                    error: error.to_string(),
                });

                tokio::time::sleep(delay).await;
                task.attempt += 1;
            }
            Err(error) => {
                task.state = TaskState::TerminalFailure;
                warn!(task = %task.id, file = %task.file.name, attempt, %error, "Upload failed");
                return TaskOutcome::Failed(TerminalFailure {
                    task,
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}
