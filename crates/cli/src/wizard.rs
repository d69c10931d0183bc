//! Interactive setup wizard for imgpilot configuration

use crate::handlers::config_file_path;
use anyhow::Result;
use dialoguer::{theme::ColorfulTheme, Confirm, Input, Password, Select};
use imgpilot_core::config::is_valid_token;
use imgpilot_core::{
    normalize_domain, save_config_to, validate_config, ConfigFile, HostClient, HostConfig,
    LinkFormat, OutputConfig, UploadConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Run the interactive setup wizard
pub async fn run_init_wizard(path: Option<&Path>) -> Result<()> {
    println!("🚀 Welcome to imgpilot setup!\n");

    println!("This wizard will guide you through the configuration process.");
    println!("You will need:");
    println!("  1. The domain of your image host");
    println!("  2. An API token issued by that host\n");

    let config_path = config_file_path(path)?;
    if config_path.exists() {
        let overwrite = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("{} already exists. Overwrite?", config_path.display()))
            .default(false)
            .interact()?;
        if !overwrite {
            println!("❌ Configuration cancelled");
            return Ok(());
        }
    }

    // Step 1: Host
    let domain = prompt_domain()?;

    // Step 2: Token
    let api_token = prompt_token()?;

    // Step 3: Optional storage strategy
    let strategy_id = prompt_strategy()?;

    // Step 4: Link format printed after uploads
    let default_format = prompt_format()?;

    println!("\n📋 Configuration summary:");
    println!("  Domain: {}", domain);
    println!(
        "  Strategy: {}",
        strategy_id.as_deref().unwrap_or("(server default)")
    );
    println!("  Link format: {}", default_format);

    let config = ConfigFile {
        host: HostConfig {
            domain,
            api_token,
            strategy_id,
        },
        upload: UploadConfig::default(),
        output: OutputConfig { default_format },
        logging: None,
    };
    validate_config(&config)?;

    let test = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Test the connection now?")
        .default(true)
        .interact()?;
    if test {
        let status = HostClient::new()?
            .test_connection(&config.host.domain, &config.host.api_token)
            .await;
        if status.is_ok() {
            println!("  ✅ {}", status);
        } else {
            println!("  ⚠️  {}", status);
        }
    }

    let confirm = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Save this configuration?")
        .default(true)
        .interact()?;

    if !confirm {
        println!("❌ Configuration cancelled");
        return Ok(());
    }

    let pb = ProgressBar::new(1);
    pb.set_style(
        ProgressStyle::default_bar().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message("Saving configuration...");

    save_config_to(&config, &config_path)?;

    pb.inc(1);
    pb.finish_with_message("✅ Configuration saved!");

    println!("\n🎉 Setup complete!");
    println!("\nConfiguration saved to: {}", config_path.display());
    println!("\nYou can now use imgpilot:");
    println!("  $ imgpilot upload photo.png");
    println!("  $ imgpilot history list");
    println!("  $ imgpilot config show");

    Ok(())
}

/// Prompt for the image host domain
fn prompt_domain() -> Result<String> {
    let raw: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Image host domain (e.g. img.example.com)")
        .validate_with(|input: &String| -> Result<(), String> {
            let domain = normalize_domain(input);
            if domain.is_empty() {
                return Err("Domain cannot be empty".to_string());
            }
            if looks_like_http_url(&domain) {
                Ok(())
            } else {
                Err(format!("'{}' is not a valid http(s) address", domain))
            }
        })
        .interact_text()
        .map_err(|e| anyhow::anyhow!("Failed to get domain: {}", e))?;

    Ok(normalize_domain(&raw))
}

/// Loose shape check before the full validation on save
fn looks_like_http_url(domain: &str) -> bool {
    let rest = domain
        .strip_prefix("https://")
        .or_else(|| domain.strip_prefix("http://"))
        .unwrap_or("");
    !rest.is_empty() && !rest.contains(char::is_whitespace)
}

/// Prompt for the API token
fn prompt_token() -> Result<String> {
    Password::with_theme(&ColorfulTheme::default())
        .with_prompt("API token")
        .validate_with(|input: &String| -> Result<(), &str> {
            if input.is_empty() {
                Err("API token cannot be empty")
            } else if !is_valid_token(input) {
                Err("Invalid token format (10-200 characters of A-Z a-z 0-9 . _ | : -)")
            } else {
                Ok(())
            }
        })
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to get API token: {}", e))
}

/// Prompt for an optional storage strategy id
fn prompt_strategy() -> Result<Option<String>> {
    let strategy: String = Input::with_theme(&ColorfulTheme::default())
        .with_prompt("Storage strategy id (leave empty for the server default)")
        .allow_empty(true)
        .interact_text()
        .map_err(|e| anyhow::anyhow!("Failed to get strategy: {}", e))?;

    let strategy = strategy.trim();
    Ok((!strategy.is_empty()).then(|| strategy.to_string()))
}

/// Prompt for the default link format
fn prompt_format() -> Result<LinkFormat> {
    let labels: Vec<&str> = LinkFormat::ALL.iter().map(|f| f.as_str()).collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Default link format")
        .items(&labels)
        .default(0)
        .interact()
        .map_err(|e| anyhow::anyhow!("Failed to select link format: {}", e))?;

    Ok(LinkFormat::ALL[selection])
}
