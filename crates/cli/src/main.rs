mod config;
mod error;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use mcp::Server;
use policy::{ConfirmationDetails, ConfirmationOutcome, TrustGate};
use runtime::{
    Confirmer, DisplayContent, ImageStore, InvocationContext, InvocationEvent, ToolRegistry,
    ToolResult,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use config::{Config, server_filter};
use error::Result;

const CONFIG_FILE: &str = "mcp-tools.toml";

#[derive(Parser)]
#[command(name = "mcp-tools")]
#[command(about = "Call MCP server tools from the command line", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the tools every configured server exposes
    Tools,
    /// Call one tool
    Call {
        /// Tool name as listed by `tools`
        tool: String,
        /// Arguments as a JSON object
        #[arg(short, long)]
        args: Option<String>,
        /// Answer every confirmation prompt with "proceed once"
        #[arg(short, long)]
        yes: bool,
        /// Print the normalized result as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;
    debug!(path = %cli.config.display(), servers = config.servers.len(), "loaded config");

    let servers = connect(&config).await;
    let registry = build_registry(&config, &servers).await;

    let code = match cli.command {
        Commands::Tools => {
            cmd_tools(&registry);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Call {
            tool,
            args,
            yes,
            json,
        } => cmd_call(&config, &registry, &tool, args.as_deref(), yes, json).await,
    };

    for server in &servers {
        server.shutdown().await;
    }
    code
}

/// Start and initialize every configured server. Servers that fail are
/// skipped.
async fn connect(config: &Config) -> Vec<Arc<Server>> {
    let mut servers = Vec::new();
    for (name, server_config) in &config.servers {
        let server = match Server::spawn(server_config.clone()).await {
            Ok(server) => server,
            Err(e) => {
                warn!(server = %name, "failed to start: {e}");
                continue;
            }
        };
        if let Err(e) = server.initialize().await {
            warn!(server = %name, "failed to initialize: {e}");
            server.shutdown().await;
            continue;
        }
        servers.push(Arc::new(server));
    }
    servers
}

async fn build_registry(config: &Config, servers: &[Arc<Server>]) -> ToolRegistry<Server> {
    let mut registry = ToolRegistry::new().with_filter(config.tools.clone());
    for server in servers {
        let tools = server.tools().await;
        registry.register_server(
            Arc::clone(server),
            server.name(),
            &tools,
            server.config().trust,
            &server_filter(server.config()),
        );
    }
    registry
}

fn cmd_tools(registry: &ToolRegistry<Server>) {
    if registry.is_empty() {
        println!("No tools available.");
        return;
    }
    for tool in registry.list() {
        println!("{:<40}  {}", tool.name(), tool.display_description());
    }
}

async fn cmd_call(
    config: &Config,
    registry: &ToolRegistry<Server>,
    tool: &str,
    args: Option<&str>,
    yes: bool,
    json: bool,
) -> Result<ExitCode> {
    let params: Value = match args {
        Some(args) => serde_json::from_str(args)?,
        None => Value::Null,
    };

    let (events_tx, mut events_rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            log_event(&event);
        }
    });

    let context = InvocationContext {
        gate: TrustGate::default(),
        folder_trusted: config.folder_trusted,
        images: config
            .image_dir
            .clone()
            .map(ImageStore::new)
            .unwrap_or_default(),
        events: Some(events_tx),
    };

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let outcome = registry
        .invoke(tool, params, &context, &StdinConfirmer { yes }, &cancel)
        .await;

    match ToolResult::from_outcome(outcome)? {
        ToolResult::Success(result) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_display(&result.display_content);
            }
            Ok(ExitCode::SUCCESS)
        }
        ToolResult::Cancelled => {
            eprintln!("Tool call cancelled.");
            Ok(ExitCode::from(130))
        }
        ToolResult::Failure { message, error } => {
            debug!("{error:?}");
            eprintln!("{message}");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_display(display: &DisplayContent) {
    match display {
        DisplayContent::Text(text) => println!("{text}"),
        DisplayContent::Images(result) => {
            for image in &result.images {
                match &image.alt {
                    Some(alt) => println!("[{}] {} {alt}", image.mime_type, image.file_path),
                    None => println!("[{}] {}", image.mime_type, image.file_path),
                }
            }
        }
    }
}

fn log_event(event: &InvocationEvent) {
    match event {
        InvocationEvent::Started { id, tool } => info!(%id, %tool, "tool call started"),
        InvocationEvent::Completed { id } => info!(%id, "tool call completed"),
        InvocationEvent::Cancelled { id } => info!(%id, "tool call cancelled"),
        InvocationEvent::Failed { id, message } => info!(%id, "tool call failed: {message}"),
    }
}

/// Asks on stderr and reads the answer from stdin.
struct StdinConfirmer {
    yes: bool,
}

impl Confirmer for StdinConfirmer {
    async fn confirm(&self, details: &ConfirmationDetails) -> ConfirmationOutcome {
        if self.yes {
            return ConfirmationOutcome::ProceedOnce;
        }

        let prompt = format!(
            "{}\n  server: {}\n  tool:   {} ({})\n\
             [y] once  [s] always allow server  [t] always allow tool  [N] cancel: ",
            details.title, details.server_name, details.tool_name, details.display_name
        );
        let mut stderr = tokio::io::stderr();
        if stderr.write_all(prompt.as_bytes()).await.is_err() || stderr.flush().await.is_err() {
            return ConfirmationOutcome::Cancel;
        }

        let mut line = String::new();
        let mut stdin = BufReader::new(tokio::io::stdin());
        match stdin.read_line(&mut line).await {
            Ok(_) => parse_answer(&line),
            Err(e) => {
                warn!("failed to read confirmation: {e}");
                ConfirmationOutcome::Cancel
            }
        }
    }
}

fn parse_answer(answer: &str) -> ConfirmationOutcome {
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => ConfirmationOutcome::ProceedOnce,
        "s" | "server" => ConfirmationOutcome::ProceedAlwaysServer,
        "t" | "tool" => ConfirmationOutcome::ProceedAlwaysTool,
        _ => ConfirmationOutcome::Cancel,
    }
}
