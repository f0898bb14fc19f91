//! Tool agent terminal client
//!
//! One-shot with `--ask`, otherwise an interactive loop over stdin.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::{EmptyToolSession, Orchestrator, OrchestratorConfig, ToolSession};
use agent_runtime::{McpConfig, McpSession, RuntimeAdapterFactory};

/// Chat with a tool-augmented model
#[derive(Parser, Debug)]
#[command(name = "agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Model to start with (hosted models are routed by prefix)
    #[arg(long, env = "AGENT_MODEL")]
    model: Option<String>,

    /// Tool server script (.py or .js)
    #[arg(long, env = "MCP_SERVER_SCRIPT", value_name = "PATH")]
    server_script: Option<PathBuf>,

    /// Ask a single question and exit
    #[arg(long, value_name = "QUERY")]
    ask: Option<String>,

    /// Disable conversation memory
    #[arg(long)]
    no_memory: bool,
}

/// One line of interactive input
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Exit,
    Models,
    Tools,
    SetModel(String),
    Query(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" => Input::Exit,
        _ if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") => Input::Exit,
        "/models" => Input::Models,
        "/tools" => Input::Tools,
        _ => match line.strip_prefix("/model ") {
            Some(model) if !model.trim().is_empty() => Input::SetModel(model.trim().to_string()),
            _ => Input::Query(line.to_string()),
        },
    }
}

async fn repl(orchestrator: &Orchestrator) -> anyhow::Result<()> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("Tool agent started ({}).", orchestrator.model().await);
    println!("Type your queries, /model <name>, /models, /tools, or 'exit' to quit.");

    loop {
        stdout.write_all(b"\nQuery: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_input(&line) {
            Input::Exit => break,
            Input::Models => {
                for model in orchestrator.list_models().await {
                    println!("  {model}");
                }
            }
            Input::Tools => {
                for tool in orchestrator.tool_details(None).await? {
                    println!("  {} - {}", tool.name, tool.description);
                }
            }
            Input::SetModel(model) => match orchestrator.set_model(&model).await {
                Ok(status) => println!("{status}"),
                Err(e) => println!("Error: {}", e.user_message()),
            },
            Input::Query(query) => println!("\n{}", orchestrator.handle(&query).await),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = OrchestratorConfig::from_env()?;
    if let Some(model) = cli.model {
        config = config.with_model(model);
    }
    if cli.no_memory {
        config.memory_enabled = false;
    }

    let mcp = match cli.server_script {
        Some(script) => {
            let mut mcp_config = McpConfig::from_env().unwrap_or_else(|| McpConfig::new(script.clone()));
            mcp_config.script = script;
            Some(Arc::new(McpSession::spawn(&mcp_config).await?))
        }
        None => None,
    };
    let session: Arc<dyn ToolSession> = match &mcp {
        Some(mcp) => mcp.clone(),
        None => Arc::new(EmptyToolSession),
    };

    let factory = Arc::new(RuntimeAdapterFactory::from_env(&config)?);
    let orchestrator = Orchestrator::connect(config, factory, session).await?;
    if let Some(name) = mcp.as_ref().and_then(|m| m.server_name()) {
        tracing::info!(server = name, "Connected to tool server");
    }

    let result = match cli.ask {
        Some(query) => {
            println!("{}", orchestrator.handle(&query).await);
            Ok(())
        }
        None => repl(&orchestrator).await,
    };

    if let Some(mcp) = mcp {
        mcp.shutdown().await;
    }
    result
}
