//! `imgpilot upload`

use crate::handlers::{history_file_path, resolve_config};
use crate::UploadArgs;
use anyhow::Result;
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use imgpilot_core::file::guess_image_mime;
use imgpilot_core::{
    HistoryStore, HostClient, ImageHost, LinkFormat, RetryPolicy, UploadEvent, UploadFile,
    UploadQueue, UploadTarget, UploadTask,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Expand directories into the image files they contain, in name order.
///
/// Explicit file arguments are kept as given so validation can report them.
pub fn collect_paths(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if entry.file_type().is_file() && guess_image_mime(entry.path()).is_some() {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Counts for the closing summary line
#[derive(Debug, Default)]
struct BatchSummary {
    succeeded: usize,
    failed: usize,
}

/// Print a line on stdout without tearing the progress bar
fn report(pb: &ProgressBar, line: String) {
    pb.suspend(|| println!("{}", line));
}

/// Print a notice on stderr without tearing the progress bar
fn notice(pb: &ProgressBar, line: String) {
    pb.suspend(|| eprintln!("{}", line));
}

/// Ask whether a failed file should run again.
///
/// Never prompts without a terminal; a prompt error counts as "no".
fn confirm_restart(pb: &ProgressBar, file_name: &str, no_prompt: bool) -> bool {
    if no_prompt || !console::user_attended_stderr() {
        return false;
    }

    pb.suspend(|| {
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Restart {}?", file_name))
            .default(false)
            .interact()
    })
    .unwrap_or_else(|e| {
        warn!("Restart prompt failed: {}", e);
        false
    })
}

/// Handle `upload`
pub async fn handle_upload(args: UploadArgs, config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut settings = config.upload.settings();
    if let Some(concurrency) = args.concurrency {
        settings.max_concurrent = concurrency;
    }
    let format: LinkFormat = args.format.unwrap_or(config.output.default_format);

    let target = UploadTarget {
        domain: config.host.domain.clone(),
        token: config.host.api_token.clone(),
        strategy_id: non_empty(args.strategy.clone())
            .or_else(|| non_empty(config.host.strategy_id.clone())),
    };
    let policy = RetryPolicy::from_settings(&settings);

    let mut tasks = Vec::new();
    let mut rejected = 0usize;
    for path in collect_paths(&args.paths) {
        match UploadFile::open(&path, settings.max_file_size_bytes) {
            Ok(file) => tasks.push(UploadTask::new(file, target.clone(), policy)),
            Err(e) => {
                rejected += 1;
                eprintln!("{} {}: {}", style("✗").red(), path.display(), e);
            }
        }
    }

    if tasks.is_empty() {
        return Err(anyhow::anyhow!("No valid images to upload"));
    }

    let total = tasks.len();
    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}",
            )?
            .progress_chars("#>-"),
    );

    let history_path = history_file_path(config_path)?;
    let history = Arc::new(Mutex::new(HistoryStore::load(&history_path)?));
    let host: Arc<dyn ImageHost> = Arc::new(HostClient::new()?);
    let (queue, mut events) =
        UploadQueue::new(host, settings.max_concurrent, Arc::clone(&history));
    debug!("Uploading {} files with {} slots", total, queue.max_concurrent());

    let summary = match queue.submit(tasks) {
        Ok(_) => drain_events(&queue, &mut events, &pb, total, format, args.no_prompt).await,
        Err(e) => {
            notice(&pb, format!("{} {}", style("✗").red(), e));
            BatchSummary {
                succeeded: 0,
                failed: total,
            }
        }
    };

    pb.finish_and_clear();
    queue.shutdown().await;

    if args.no_history {
        debug!("History recording disabled for this batch");
    } else {
        history.lock().await.save()?;
    }

    println!();
    println!(
        "{} uploaded, {} failed, {} rejected",
        style(summary.succeeded).green(),
        style(summary.failed).red(),
        rejected
    );

    if summary.failed > 0 {
        Err(anyhow::anyhow!("{} upload(s) failed", summary.failed))
    } else {
        Ok(())
    }
}

/// Consume queue events until every submitted file reached a final outcome
async fn drain_events(
    queue: &UploadQueue,
    events: &mut UnboundedReceiver<UploadEvent>,
    pb: &ProgressBar,
    total: usize,
    format: LinkFormat,
    no_prompt: bool,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let mut outstanding = total;

    while outstanding > 0 {
        let Some(event) = events.recv().await else {
            warn!("Upload queue closed with {} tasks outstanding", outstanding);
            summary.failed += outstanding;
            break;
        };

        match event {
            UploadEvent::Attempting {
                file_name,
                attempt,
                max_attempts,
                ..
            } => {
                pb.set_message(format!("{} ({}/{})", file_name, attempt, max_attempts));
            }
            UploadEvent::Retrying {
                file_name,
                attempt,
                max_attempts,
                delay,
                error,
                ..
            } => {
                notice(
                    pb,
                    format!(
                        "{} {} attempt {}/{} failed: {}, retrying in {}ms",
                        style("↻").yellow(),
                        file_name,
                        attempt,
                        max_attempts,
                        error,
                        delay.as_millis()
                    ),
                );
            }
            UploadEvent::Succeeded(success) => {
                outstanding -= 1;
                summary.succeeded += 1;
                pb.inc(1);
                report(
                    pb,
                    format!(
                        "{} {}  {}",
                        style("✓").green(),
                        success.result.origin_name,
                        success.result.links.get(format)
                    ),
                );
                if let Some(rate_limit) = success.rate_limit {
                    debug!(
                        "Rate limit: {}/{} requests remaining",
                        rate_limit.remaining, rate_limit.limit
                    );
                    if rate_limit.remaining == 0 {
                        notice(
                            pb,
                            format!(
                                "{} Rate limit reached ({} requests)",
                                style("⚠️").yellow(),
                                rate_limit.limit
                            ),
                        );
                    }
                }
            }
            UploadEvent::Failed(failure) => {
                notice(
                    pb,
                    format!(
                        "{} {} failed after {} attempt(s): {}",
                        style("✗").red(),
                        failure.file_name(),
                        failure.attempts,
                        failure.error
                    ),
                );

                if confirm_restart(pb, failure.file_name(), no_prompt) {
                    if let Err(e) = queue.submit([failure.restart()]) {
                        warn!("Could not resubmit task: {}", e);
                        outstanding -= 1;
                        summary.failed += 1;
                        pb.inc(1);
                    }
                } else {
                    outstanding -= 1;
                    summary.failed += 1;
                    pb.inc(1);
                }
            }
            UploadEvent::Crashed {
                file_name, reason, ..
            } => {
                outstanding -= 1;
                summary.failed += 1;
                pb.inc(1);
                notice(
                    pb,
                    format!("{} {} crashed: {}", style("✗").red(), file_name, reason),
                );
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_collect_paths_expands_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.png"), b"png").unwrap();
        fs::write(dir.path().join("a.jpg"), b"jpg").unwrap();
        fs::write(dir.path().join("notes.txt"), b"txt").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.gif"), b"gif").unwrap();

        let files = collect_paths(&[dir.path().to_path_buf()]);
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.jpg", "b.png", "c.gif"]);
    }

    #[test]
    fn test_collect_paths_keeps_explicit_files() {
        let files = collect_paths(&[PathBuf::from("notes.txt")]);
        assert_eq!(files, vec![PathBuf::from("notes.txt")]);
    }

    #[test]
    fn test_blank_strategy_is_ignored() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(non_empty(Some("2".to_string())), Some("2".to_string()));
    }
}
