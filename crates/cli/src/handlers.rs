//! Command handlers for imgpilot CLI

use anyhow::Result;
use clap::Command;
use clap_complete::{generate, Shell as ClapShell};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use imgpilot_core::{
    get_config_path, get_history_path, history_path_for, load_config, load_config_from,
    validate_config, ConfigFile, HistoryEntry, HistoryStore, HostClient, LinkFormat,
};
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};

/// Load the configuration from `--config` or the default location
pub fn resolve_config(path: Option<&Path>) -> imgpilot_core::Result<ConfigFile> {
    match path {
        Some(path) => load_config_from(path),
        None => load_config(),
    }
}

/// Path of the configuration file in use
pub fn config_file_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(get_config_path()?),
    }
}

/// Path of the history file in use
pub fn history_file_path(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(path) => Ok(history_path_for(path)),
        None => Ok(get_history_path()?),
    }
}

/// Show only the first characters of a secret
pub fn mask_token(token: &str) -> String {
    let visible: String = token.chars().take(4).collect();
    if token.chars().count() > 4 {
        format!("{}…", visible)
    } else {
        "****".to_string()
    }
}

/// Handle config commands
pub async fn handle_config(action: &str, path: Option<&Path>) -> Result<()> {
    match action {
        "show" => {
            println!("Current configuration:");
            println!();

            let config = resolve_config(path)?;
            let settings = config.upload.settings();

            println!("Host:");
            println!("  Domain: {}", config.host.domain);
            println!("  API token: {}", mask_token(&config.host.api_token));
            println!(
                "  Strategy: {}",
                config.host.strategy_id.as_deref().unwrap_or("(server default)")
            );
            println!();
            println!("Upload:");
            println!("  Attempts: {}", settings.max_attempts);
            println!("  Base retry delay: {}ms", settings.base_delay.as_millis());
            println!("  Max file size: {}MB", settings.max_file_size_bytes / (1024 * 1024));
            println!("  Max concurrent: {}", settings.max_concurrent);
            println!("  Request timeout: {}ms", settings.request_timeout.as_millis());
            println!();
            println!("Output:");
            println!("  Default format: {}", config.output.default_format);

            Ok(())
        }
        "validate" => {
            println!("Validating configuration...");

            let config = resolve_config(path)?;
            validate_config(&config)?;
            println!("  ✅ Valid configuration format");

            println!("  Testing connection to {}...", config.host.domain);
            let client = HostClient::new()?;
            let status = client
                .test_connection(&config.host.domain, &config.host.api_token)
                .await;

            if status.is_ok() {
                println!("  ✅ {}", status);
                Ok(())
            } else {
                Err(anyhow::anyhow!("{}", status))
            }
        }
        "edit" => {
            let config_path = config_file_path(path)?;
            println!("Opening editor...");
            println!("  File: {}", config_path.display());
            println!();

            let editor = std::env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

            let status = std::process::Command::new(editor)
                .arg(&config_path)
                .status()?;

            if status.success() {
                println!("  ✅ Configuration edited");

                let config = load_config_from(&config_path)?;
                validate_config(&config)?;
                println!("  ✅ Configuration valid");
            } else {
                println!("  ⚠️  Editor exited with error");
            }

            Ok(())
        }
        _ => {
            println!("Unknown action: {}", action);
            println!("Available actions: show, edit, validate");
            Ok(())
        }
    }
}

#[derive(Tabled)]
struct HistoryRow {
    #[tabled(rename = "#")]
    index: usize,
    name: String,
    date: String,
    link: String,
}

/// Handle `history list`
pub fn handle_history_list(
    path: Option<&Path>,
    search: Option<&str>,
    format: Option<LinkFormat>,
    json: bool,
) -> Result<()> {
    let format = format.unwrap_or_else(|| {
        resolve_config(path)
            .map(|c| c.output.default_format)
            .unwrap_or_default()
    });
    let store = HistoryStore::load(&history_file_path(path)?)?;
    let entries: Vec<&HistoryEntry> = match search {
        Some(query) => store.search(query).collect(),
        None => store.iter().collect(),
    };

    if json {
        for entry in entries {
            println!(
                "{}",
                serde_json::json!({
                    "name": entry.origin_name,
                    "link": entry.links.get(format),
                    "delete_url": entry.delete_url,
                    "date": entry.created_at,
                })
            );
        }
        return Ok(());
    }

    if entries.is_empty() {
        println!("  No history entries");
        return Ok(());
    }

    let rows: Vec<HistoryRow> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| HistoryRow {
            index: i + 1,
            name: e.origin_name.clone(),
            date: e.created_at.format("%Y-%m-%d %H:%M").to_string(),
            link: e.links.get(format).to_string(),
        })
        .collect();

    println!("{}", Table::new(rows));
    println!();
    println!("{} of {} entries ({})", entries.len(), store.len(), format);

    Ok(())
}

/// Handle `history delete <DELETE_URL>`
pub async fn handle_history_delete(path: Option<&Path>, delete_url: &str) -> Result<()> {
    let config = resolve_config(path)?;
    let history_path = history_file_path(path)?;
    let mut store = HistoryStore::load(&history_path)?;
    let client = HostClient::new()?;

    println!("Deleting {}...", delete_url);
    let removed = store
        .delete_by_reference(&client, delete_url, Some(&config.host.api_token))
        .await?;
    store.save()?;

    println!("  ✅ Deleted {}", removed.origin_name);
    Ok(())
}

/// Handle `history delete-matching <QUERY>`
pub async fn handle_history_delete_matching(path: Option<&Path>, query: &str) -> Result<()> {
    let config = resolve_config(path)?;
    let mut store = HistoryStore::load(&history_file_path(path)?)?;

    let candidates = store
        .search(query)
        .filter(|e| e.delete_url.is_some())
        .count();
    if candidates == 0 {
        println!("  No deletable entries match '{}'", query);
        return Ok(());
    }

    println!("⚠️  Warning: you are about to delete {} image(s) from the host", candidates);
    println!("  This action is IRREVERSIBLE!");
    let confirm = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Continue?")
        .default(false)
        .interact()?;
    if !confirm {
        println!("❌ Cancelled");
        return Ok(());
    }

    let client = HostClient::new()?;
    let removed = store
        .delete_matching(&client, query, Some(&config.host.api_token))
        .await;
    store.save()?;

    if removed == candidates {
        println!("  ✅ Deleted {} image(s)", removed);
    } else {
        println!(
            "  {} Deleted {} of {} image(s), failed entries were kept",
            style("⚠️").yellow(),
            removed,
            candidates
        );
    }
    Ok(())
}

/// Handle `history clear`
pub fn handle_history_clear(path: Option<&Path>, yes: bool) -> Result<()> {
    let mut store = HistoryStore::load(&history_file_path(path)?)?;
    if store.is_empty() {
        println!("  History is already empty");
        return Ok(());
    }

    if !yes {
        let confirm = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!(
                "Clear all {} history entries? Images stay on the host.",
                store.len()
            ))
            .default(false)
            .interact()?;
        if !confirm {
            println!("❌ Cancelled");
            return Ok(());
        }
    }

    store.clear();
    store.save()?;
    println!("  ✅ History cleared");
    Ok(())
}

/// Handle doctor commands
pub async fn handle_doctor(action: &str, path: Option<&Path>) -> Result<()> {
    match action {
        "check" => {
            println!("Checking imgpilot installation...");

            println!("  ✅ imgpilot is installed");
            println!("  Version: {}", env!("CARGO_PKG_VERSION"));

            let config_path = config_file_path(path)?;
            if config_path.exists() {
                println!("  ✅ Configuration found");

                let config = load_config_from(&config_path)?;
                validate_config(&config)?;
                println!("  ✅ Configuration valid");
            } else {
                println!("  ⚠️  Configuration not found (run 'imgpilot init')");
            }

            let history = HistoryStore::load(&history_file_path(path)?)?;
            println!("  History entries: {}", history.len());

            Ok(())
        }
        "test-connection" => {
            let config = resolve_config(path)?;
            validate_config(&config)?;

            println!("Testing connection to {}...", config.host.domain);
            let client = HostClient::new()?;
            let status = client
                .test_connection(&config.host.domain, &config.host.api_token)
                .await;

            if status.is_ok() {
                println!("  ✅ {}", status);
                Ok(())
            } else {
                Err(anyhow::anyhow!("{}", status))
            }
        }
        _ => {
            println!("Unknown action: {}", action);
            println!("Available actions: check, test-connection");
            Ok(())
        }
    }
}

/// Handle shell completion generation
pub async fn handle_completion(shell: &str, cmd: &mut Command) -> Result<()> {
    use std::io;

    let clap_shell = match shell {
        "bash" => ClapShell::Bash,
        "zsh" => ClapShell::Zsh,
        "fish" => ClapShell::Fish,
        "elvish" => ClapShell::Elvish,
        "powershell" | "pwsh" => ClapShell::PowerShell,
        _ => {
            return Err(anyhow::anyhow!(
                "Unsupported shell: {}\nSupported shells: bash, zsh, fish, elvish, powershell",
                shell
            ));
        }
    };

    generate(clap_shell, cmd, "imgpilot", &mut io::stdout());

    Ok(())
}
