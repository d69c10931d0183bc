use anyhow::Result;
use clap::{CommandFactory, Parser};
use color_eyre::config::HookBuilder;
use imgpilot_core::LinkFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod handlers;
mod upload;
mod wizard;

/// imgpilot - upload images to a self-hosted image host
#[derive(Parser, Debug)]
#[command(name = "imgpilot")]
#[command(version)]
#[command(about = "Upload images to an image-hosting service and manage the resulting links", long_about = None)]
struct Cli {
    /// Configuration file (default: ~/.config/imgpilot/config.toml)
    #[arg(long, global = true, env = "IMGPILOT_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Sub-command to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Initial setup (interactive wizard)
    Init,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Upload image files or directories of images
    Upload(UploadArgs),

    /// Upload history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Shell completion
    Completion {
        /// Shell type (bash, zsh, fish, elvish, powershell)
        shell: String,
    },

    /// Diagnostics
    Doctor {
        #[command(subcommand)]
        action: DoctorAction,
    },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigAction {
    /// Show the current configuration
    Show,
    /// Edit the configuration in $EDITOR
    Edit,
    /// Validate the configuration and test the connection
    Validate,
}

#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Files or directories to upload
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Link format to print (url, markdown, html, bbcode, thumbnail)
    #[arg(short, long, value_parser = parse_format)]
    pub format: Option<LinkFormat>,

    /// Storage strategy id (overrides the configured one)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Maximum concurrent uploads (1-6)
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// Do not record successful uploads in the history
    #[arg(long)]
    pub no_history: bool,

    /// Never ask to restart failed uploads
    #[arg(long)]
    pub no_prompt: bool,
}

#[derive(clap::Subcommand, Debug)]
enum HistoryAction {
    /// List recorded uploads, newest first
    List {
        /// Only entries whose name or links contain this text
        #[arg(short, long)]
        search: Option<String>,
        /// Link format to show (defaults to the configured format)
        #[arg(short, long, value_parser = parse_format)]
        format: Option<LinkFormat>,
        /// Print one JSON object per line
        #[arg(long)]
        json: bool,
    },
    /// Delete an image on the host and remove it from the history
    Delete {
        /// Delete URL issued by the host
        delete_url: String,
    },
    /// Delete every matching image that has a delete URL
    DeleteMatching {
        /// Text matched against names and links
        query: String,
    },
    /// Clear the local history (images stay on the host)
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(clap::Subcommand, Debug)]
enum DoctorAction {
    /// Check the installation
    Check,
    /// Test the connection to the image host
    TestConnection,
}

fn parse_format(value: &str) -> std::result::Result<LinkFormat, String> {
    value.parse().map_err(|e: imgpilot_core::Error| e.to_string())
}

fn init_tracing(cli: &Cli) {
    let filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        let level = handlers::resolve_config(cli.config.as_deref())
            .ok()
            .and_then(|c| c.logging.map(|l| l.level))
            .unwrap_or_else(|| "warn".to_string());
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup error handling
    if let Err(e) = HookBuilder::default().install() {
        eprintln!("Warning: Failed to install error handler: {}", e);
    }

    let cli = Cli::parse();
    init_tracing(&cli);
    let config_path = cli.config.clone();

    match cli.command {
        Commands::Init => wizard::run_init_wizard(config_path.as_deref()).await,
        Commands::Config { action } => {
            let action_str = match action {
                ConfigAction::Show => "show",
                ConfigAction::Edit => "edit",
                ConfigAction::Validate => "validate",
            };
            handlers::handle_config(action_str, config_path.as_deref()).await
        }
        Commands::Upload(args) => upload::handle_upload(args, config_path.as_deref()).await,
        Commands::History { action } => match action {
            HistoryAction::List { search, format, json } => handlers::handle_history_list(
                config_path.as_deref(),
                search.as_deref(),
                format,
                json,
            ),
            HistoryAction::Delete { delete_url } => {
                handlers::handle_history_delete(config_path.as_deref(), &delete_url).await
            }
            HistoryAction::DeleteMatching { query } => {
                handlers::handle_history_delete_matching(config_path.as_deref(), &query).await
            }
            HistoryAction::Clear { yes } => {
                handlers::handle_history_clear(config_path.as_deref(), yes)
            }
        },
        Commands::Completion { shell } => {
            handlers::handle_completion(&shell, &mut Cli::command()).await
        }
        Commands::Doctor { action } => {
            let action_str = match action {
                DoctorAction::Check => "check",
                DoctorAction::TestConnection => "test-connection",
            };
            handlers::handle_doctor(action_str, config_path.as_deref()).await
        }
    }
}
