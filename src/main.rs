//! `agentctl` binary: thin CLI over the library crates this workspace
//! ships. Illustrative rather than the core of the workspace — the bundled
//! [`agentsdk::EchoModel`] stands in for a concrete vendor adapter.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;

use agentsdk::cli::{self, Cli, Command, ConfigCommand};
use agentsdk::config::Config;
use agentsdk_domain::event::EventType;
use agentsdk_domain::message::Message;
use agentsdk_events::{ChannelSink, EventBus, EventBusOptions};
use agentsdk_model::EchoModel;
use agentsdk_sessions::{Filter, MemorySession, Session};
use agentsdk_tools::ToolRegistry;

#[tokio::main]
async fn main() {
    agentsdk::telemetry::init();

    let cli = Cli::parse();
    let exit_code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            let canceled = e
                .downcast_ref::<agentsdk_domain::error::Error>()
                .map(|inner| matches!(inner, agentsdk_domain::error::Error::Canceled))
                .unwrap_or(false);
            if !canceled {
                eprintln!("error: {e}");
            }
            1
        }
    };
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Run { task, session, model: _, stream, tools } => {
            run_once(task, session, stream, tools).await
        }
        Command::Serve { host, port } => serve(host, port).await,
        Command::Config(cmd) => config_command(cmd),
    }
}

async fn run_once(task: String, session: Option<String>, stream: bool, tools: Option<String>) -> anyhow::Result<()> {
    let session_id = session.unwrap_or_else(|| "cli:run".to_string());
    let session_store = MemorySession::new(&session_id);
    session_store.append(Message::user(task))?;
    let transcript = session_store.list(&Filter::new())?;

    let model = Arc::new(EchoModel);
    let registry = Arc::new(ToolRegistry::new());
    let mut options = agentsdk::RunOptions::default();
    options.tool_whitelist = cli::parse_tool_whitelist(tools);

    let mut orchestrator = agentsdk::Orchestrator::new(model, registry);

    let mut print_task = None;
    if stream {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let sink: Arc<dyn agentsdk_events::EventSink> = Arc::new(ChannelSink(tx));
        let bus = Arc::new(EventBus::new(
            Some(sink.clone()),
            Some(sink.clone()),
            Some(sink),
            EventBusOptions::default(),
        ));
        orchestrator = orchestrator.with_event_bus(bus);
        print_task = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                print_stream_event(&event);
            }
        }));
    }

    let result = orchestrator.run(&session_id, transcript, &options).await?;
    session_store.append(Message::assistant(result.output.clone()))?;

    if let Some(handle) = print_task {
        let _ = handle.await;
    }

    println!("{}", result.output);
    Ok(())
}

fn print_stream_event(event: &agentsdk_domain::event::Event) {
    match event.event_type {
        EventType::Thinking => {
            eprint!("\x1b[2m[thinking]\x1b[0m ");
            std::io::stderr().flush().ok();
        }
        EventType::ToolCall => eprintln!("\x1b[2m[tool call]\x1b[0m"),
        EventType::ToolResult => eprintln!("\x1b[2m[tool result]\x1b[0m"),
        EventType::Error => eprintln!("\x1b[31m[error]\x1b[0m"),
        _ => {}
    }
}

async fn serve(host: String, port: u16) -> anyhow::Result<()> {
    tracing::info!(%host, port, "agentctl serve starting");

    let model = Arc::new(EchoModel);
    let registry = Arc::new(ToolRegistry::new());
    let state = agentsdk::AppState::new(model, registry, agentsdk::RunOptions::default());
    let app = agentsdk::router(state);

    let addr: std::net::SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

fn config_command(cmd: ConfigCommand) -> anyhow::Result<()> {
    let path = Config::default_path()?;
    match cmd {
        ConfigCommand::Init => {
            if path.exists() {
                println!("config already exists at {}", path.display());
            } else {
                Config::default().save(&path)?;
                println!("wrote default config to {}", path.display());
            }
        }
        ConfigCommand::Set { key, value } => {
            let mut config = Config::load(&path)?;
            config.set(&key, &value)?;
            config.save(&path)?;
            println!("{key} = {value}");
        }
        ConfigCommand::Get { key } => {
            let config = Config::load(&path)?;
            println!("{}", config.get(&key)?);
        }
        ConfigCommand::List => {
            let config = Config::load(&path)?;
            for (key, value) in config.list() {
                println!("{key} = {value}");
            }
        }
    }
    Ok(())
}
