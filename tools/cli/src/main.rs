//! CloudBox CLI - Upload files to a fixed Google Drive folder.
//!
//! The `shell` subcommand mirrors a small desktop window: authenticate,
//! pick a file, upload it, and check the destination folder, in any order.
//! The remaining subcommands run one workflow step sequence and exit.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cloudbox_app::{AppConfig, FilePicker, Outcome, PresetPicker, UploadWorkflow};
use cloudbox_common::FolderId;
use cloudbox_storage::gdrive::{DriveConnector, GoogleAuthorizer, LoginOptions, UrlAnnouncer};
use cloudbox_storage::{Authorizer, CredentialStore, FileCredentialStore};

#[derive(Parser)]
#[command(name = "cloudbox")]
#[command(about = "CloudBox - Upload files to a Google Drive folder")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config dir>/cloudbox/config.json).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Destination folder id.
    #[arg(long, global = true)]
    folder_id: Option<String>,

    /// Persisted credential file.
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// OAuth client secrets file.
    #[arg(long, global = true)]
    client_secrets: Option<PathBuf>,

    /// Skip re-checking that the selected file exists before uploading.
    #[arg(long, global = true)]
    no_check_exists: bool,

    /// Print the consent URL instead of launching a browser.
    #[arg(long, global = true)]
    no_browser: bool,

    /// Loopback port for the login redirect.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive session.
    Shell,

    /// Authenticate and persist the credential.
    Login,

    /// Authenticate and upload a file.
    Upload {
        /// File to upload.
        file: PathBuf,
    },

    /// Authenticate and list the destination folder.
    Verify,

    /// Print shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "cloudbox", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    debug!("Effective configuration: {:?}", config);

    let mut workflow = build_workflow(&config);

    let success = match cli.command {
        Commands::Shell => cmd_shell(&mut workflow).await?,
        Commands::Login => cmd_login(&mut workflow).await,
        Commands::Upload { file } => cmd_upload(&mut workflow, file).await,
        Commands::Verify => cmd_verify(&mut workflow).await,
        Commands::Completions { .. } => true,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Install the global subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) -> Result<()> {
    let builder = FmtSubscriber::builder()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = builder.with_env_filter(EnvFilter::from_default_env()).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let level = if verbose { Level::DEBUG } else { Level::WARN };
        let subscriber = builder.with_max_level(level).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}

/// Defaults, then the config file, then command-line flags.
fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    if let Some(id) = &cli.folder_id {
        config.folder_id = FolderId::new(id.as_str()).context("Invalid folder id")?;
    }
    if let Some(path) = &cli.token_file {
        config.token_file = path.clone();
    }
    if let Some(path) = &cli.client_secrets {
        config.client_secrets_file = path.clone();
    }
    if cli.no_check_exists {
        config.check_file_exists = false;
    }
    if cli.no_browser {
        config.open_browser = false;
    }
    if let Some(port) = cli.port {
        config.redirect_port = port;
    }

    Ok(config)
}

fn build_workflow(config: &AppConfig) -> UploadWorkflow {
    let store: Arc<dyn CredentialStore> = Arc::new(FileCredentialStore::new(&config.token_file));

    let announcer: UrlAnnouncer = Arc::new(|url: &str| {
        println!("Authorize CloudBox by visiting:\n  {}", url);
    });
    let options = LoginOptions {
        redirect_port: config.redirect_port,
        open_browser: config.open_browser,
    };
    let authorizer: Arc<dyn Authorizer> = Arc::new(
        GoogleAuthorizer::new(&config.client_secrets_file, options).with_announcer(announcer),
    );

    let connector = Arc::new(DriveConnector::new(authorizer.clone()).with_store(store.clone()));

    UploadWorkflow::new(config.workflow_settings(), store, authorizer, connector)
}

fn print_outcome(outcome: &Outcome) {
    if let Some(notice) = &outcome.notice {
        println!("[{}] {}: {}", notice.severity, notice.title, notice.message);
    }
    if let Some(text) = outcome.status_text() {
        println!("status: {}", text);
    }
}

/// Authenticate only.
async fn cmd_login(workflow: &mut UploadWorkflow) -> bool {
    let outcome = workflow.authenticate().await;
    print_outcome(&outcome);
    outcome.success
}

/// Authenticate, select `file`, upload it.
async fn cmd_upload(workflow: &mut UploadWorkflow, file: PathBuf) -> bool {
    if !cmd_login(workflow).await {
        return false;
    }

    let selected = workflow.select_file(&PresetPicker::new(Some(file)));
    print_outcome(&selected);
    if !selected.success {
        return false;
    }

    let outcome = workflow.upload().await;
    print_outcome(&outcome);
    outcome.success
}

/// Authenticate, then list the destination folder.
async fn cmd_verify(workflow: &mut UploadWorkflow) -> bool {
    if !cmd_login(workflow).await {
        return false;
    }

    let outcome = workflow.verify_folder_access().await;
    print_outcome(&outcome);
    outcome.success
}

/// Picker asking for a path on standard input.
struct ConsolePicker;

impl FilePicker for ConsolePicker {
    fn pick_file(&self) -> Option<PathBuf> {
        print!("File to upload (empty to cancel): ");
        io::stdout().flush().ok()?;

        let mut line = String::new();
        io::stdin().lock().read_line(&mut line).ok()?;

        let answer = line.trim();
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ShellCommand {
    Auth,
    Select(Option<PathBuf>),
    Upload,
    Verify,
    Status,
    Help,
    Quit,
    Empty,
    Unknown(String),
}

impl ShellCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        match word.to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "auth" | "login" => Self::Auth,
            "select" => Self::Select((!rest.is_empty()).then(|| PathBuf::from(rest))),
            "upload" => Self::Upload,
            "verify" => Self::Verify,
            "status" => Self::Status,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            _ => Self::Unknown(word.to_string()),
        }
    }
}

const SHELL_HELP: &str = "\
Commands:
  auth            Authenticate with Google Drive
  select [PATH]   Choose the file to upload (prompts when PATH is omitted)
  upload          Upload the selected file
  verify          List the destination folder
  status          Show the session state
  help            Show this help
  quit            Leave the shell";

/// Interactive loop over the workflow operations.
async fn cmd_shell(workflow: &mut UploadWorkflow) -> Result<bool> {
    println!("CloudBox - uploading to folder {}", workflow.settings().folder_id);
    println!("Type 'help' for commands.");

    let stdin = io::stdin();
    loop {
        print!("cloudbox> ");
        io::stdout().flush().context("Failed to write prompt")?;

        let mut line = String::new();
        let read = stdin
            .lock()
            .read_line(&mut line)
            .context("Failed to read command")?;
        if read == 0 {
            println!();
            break;
        }

        match ShellCommand::parse(&line) {
            ShellCommand::Empty => {}
            ShellCommand::Auth => print_outcome(&workflow.authenticate().await),
            ShellCommand::Select(Some(path)) => {
                print_outcome(&workflow.select_file(&PresetPicker::new(Some(path))))
            }
            ShellCommand::Select(None) => print_outcome(&workflow.select_file(&ConsolePicker)),
            ShellCommand::Upload => print_outcome(&workflow.upload().await),
            ShellCommand::Verify => print_outcome(&workflow.verify_folder_access().await),
            ShellCommand::Status => print_status(workflow),
            ShellCommand::Help => println!("{}", SHELL_HELP),
            ShellCommand::Quit => break,
            ShellCommand::Unknown(word) => {
                println!("Unknown command '{}'. Type 'help' for commands.", word)
            }
        }
    }

    Ok(true)
}

fn print_status(workflow: &UploadWorkflow) {
    let state = workflow.state();

    println!("Session:");
    println!("  Provider: {}", workflow.provider_name());
    println!(
        "  Authenticated: {}",
        if state.is_authenticated() { "yes" } else { "no" }
    );
    match state.selected_path() {
        Some(path) => println!("  Selected: {}", path.display()),
        None => println!("  Selected: (none)"),
    }
    println!("  Folder: {}", workflow.settings().folder_id);
}
