//! Operational entry point, per SPEC_FULL §10.6: thin by design, but present because the
//! engine must be runnable outside of its test suite. `serve` boots the HTTP/SSE surface;
//! `query` runs one query to completion against in-memory mock collaborators and prints
//! the resulting event stream, for local smoke-testing without a real Okta org or mirror.

use clap::{Parser, Subcommand};
use console::style;

use crate::collaborators::mock::{
    FixedPlanner, FixedRowsSqlClient, PagedOktaClient, PermissiveValidator,
};
use crate::collaborators::Collaborators;
use crate::config::{load_settings, Settings};
use crate::models::ExecutionEvent;
use crate::orchestrator::Orchestrator;

#[derive(Parser)]
#[command(name = "query-engine")]
#[command(about = "Execution orchestrator for the Okta administration assistant's query engine")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup, before `Cli::parse` runs).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP/SSE server exposing StartProcess/Subscribe/Cancel
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: 127.0.0.1:8080)
        #[arg(default_value = "127.0.0.1:8080")]
        bind: String,
    },

    /// Run a single query against in-memory mock collaborators and print its event stream
    Query {
        /// The natural-language query to execute
        query: String,
        /// Owner identity to attribute the process to
        #[arg(short, long, default_value = "local")]
        owner: String,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings().await;

    match cli.command {
        Commands::Serve { bind } => cmd_serve(&settings, &bind).await,
        Commands::Query { query, owner } => cmd_query(&settings, &query, &owner).await,
    }
}

fn demo_collaborators() -> Collaborators {
    Collaborators {
        planner: Box::new(FixedPlanner::single_sql("users")),
        sql: Box::new(FixedRowsSqlClient::new(37)),
        okta: Box::new(PagedOktaClient::new(250, 50)),
        validator: Box::new(PermissiveValidator),
    }
}

async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    println!(
        "{} Starting query engine server at http://{}",
        style("\u{2192}").cyan(),
        bind
    );
    println!("  Press Ctrl+C to stop");

    let orchestrator = std::sync::Arc::new(Orchestrator::new(
        demo_collaborators(),
        settings.engine.clone(),
    ));
    let _reaper = orchestrator.spawn_reaper(std::time::Duration::from_secs(30));

    crate::server::serve(orchestrator, bind).await
}

async fn cmd_query(settings: &Settings, query: &str, owner: &str) -> anyhow::Result<()> {
    let orchestrator = Orchestrator::new(demo_collaborators(), settings.engine.clone());

    let process_id = orchestrator.start_process(query, owner).await?;
    println!("{} process {}", style("\u{2192}").cyan(), process_id);

    let mut sub = orchestrator.subscribe(&process_id, owner).await?;
    while let Some(event) = sub.recv().await {
        print_event(&event);
        if matches!(event, ExecutionEvent::Done) {
            break;
        }
    }

    Ok(())
}

fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::StepStart { step_number, step_type, .. } => {
            println!("  {} step {} ({:?}) started", style("\u{25b8}").cyan(), step_number, step_type);
        }
        ExecutionEvent::StepEnd { step_number, success, record_count, .. } => {
            let mark = if *success { style("\u{2713}").green() } else { style("\u{2717}").red() };
            println!("  {} step {} finished, {} records", mark, step_number, record_count);
        }
        ExecutionEvent::StepProgress { step_number, message, .. } => {
            println!("    {} step {}: {}", style("\u{2026}").dim(), step_number, message);
        }
        ExecutionEvent::Complete { display_type, count, .. } => {
            println!(
                "{} complete ({}{})",
                style("\u{2713}").green(),
                display_type,
                count.map(|c| format!(", {} rows", c)).unwrap_or_default()
            );
        }
        ExecutionEvent::Error { message, .. } => {
            println!("{} error: {}", style("\u{2717}").red(), message);
        }
        ExecutionEvent::Done => {}
        _ => {}
    }
}
