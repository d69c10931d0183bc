//! imgpilot-core - Core library for the imgpilot CLI
//!
//! This library provides the upload orchestration engine for image-hosting
//! services: the admission queue and concurrency limiter, the per-file retry
//! state machine, the bounded upload history, and the HTTP client they drive.

pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod format;
pub mod history;
pub mod queue;
pub mod retry;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use client::{
    ConnectionStatus, HostClient, ImageHost, RateLimit, UploadOutcome, UploadResult, UploadTarget,
};
pub use config::{
    config_exists, get_config_path, get_history_path, history_path_for, load_config,
    load_config_from, normalize_domain, save_config, save_config_to, validate_config,
};
pub use config::{
    Config, ConfigFile, HostConfig, LoggingConfig, OutputConfig, UploadConfig, UploadSettings,
};
pub use error::{Error, Result};
pub use file::UploadFile;
pub use format::{LinkFormat, Links};
pub use history::{HistoryEntry, HistoryStore, HISTORY_CAPACITY};
pub use queue::UploadQueue;
pub use retry::{
    run_task, RetryPolicy, TaskOutcome, TaskState, TerminalFailure, UploadEvent, UploadSuccess,
    UploadTask,
};
