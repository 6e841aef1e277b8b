// SPDX-License-Identifier: MIT

use std::sync::Arc;

use ai_mail::{config::MailConfig, identity, mcp, storage::Storage, MailContext};
use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Retention window for `--cleanup`: archived messages and idle agent
/// registrations older than this are deleted.
const CLEANUP_RETENTION_DAYS: u32 = 30;

#[derive(Parser)]
#[command(
    name = "ai-mail",
    about = "Local inter-agent mailbox — MCP tool server over stdio",
    version
)]
struct Args {
    /// Data directory for the mailbox database
    #[arg(long, env = "AI_MAIL_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log filter (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "AI_MAIL_LOG")]
    log: String,

    /// List registered agents and exit
    #[arg(long)]
    list_agents: bool,

    /// Print mailbox statistics for the detected agent and exit
    #[arg(long)]
    stats: bool,

    /// Prune old archived messages and stale agents, then exit
    #[arg(long)]
    cleanup: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the tool protocol; all logging goes to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let config = Arc::new(MailConfig::new(args.data_dir, args.log.clone()));
    let storage = Arc::new(Storage::new(&config.data_dir).await?);

    if args.list_agents {
        return cmd_list_agents(&storage).await;
    }
    if args.stats {
        return cmd_stats(&storage).await;
    }
    if args.cleanup {
        return cmd_cleanup(&storage).await;
    }

    run_server(config, storage).await
}

async fn run_server(config: Arc<MailConfig>, storage: Arc<Storage>) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "ai-mail starting");
    info!(data_dir = %config.data_dir.display(), "data directory");

    let machine_id = identity::machine_id();
    let base = identity::detect_agent_name();
    let agent_name = identity::ensure_unique_name(&storage, &base, &machine_id).await?;
    storage
        .upsert_agent(&agent_name, &machine_id, &identity::process_info())
        .await?;

    let repaired = storage.normalize_stale_presence().await.unwrap_or(0);
    if repaired > 0 {
        info!(count = repaired, "repaired stale presence rows from previous run");
    }

    info!(agent = %agent_name, "agent identity ready");

    mcp::run(MailContext {
        config,
        storage,
        agent_name,
        machine_id,
    })
    .await
}

// ─── One-shot commands ────────────────────────────────────────────────────────

async fn cmd_list_agents(storage: &Storage) -> Result<()> {
    let agents = storage.list_agents(None).await?;
    if agents.is_empty() {
        println!("No agents registered.");
    }
    for agent in agents {
        println!("{:<32} {:<8} last seen {}", agent.name, agent.status, agent.last_seen);
    }
    storage.close().await;
    Ok(())
}

async fn cmd_stats(storage: &Storage) -> Result<()> {
    // Stats are for the detected base name; a one-shot does not register or
    // allocate a fresh suffix.
    let name = identity::detect_agent_name();
    let stats = storage.stats(&name).await?;
    println!("Agent: {name}");
    println!("  inbox total:    {}", stats.total_inbox);
    println!("  unread:         {}", stats.unread_inbox);
    println!("  unread urgent:  {}", stats.unread_urgent);
    println!("  agents on host: {}", stats.agents_total);
    println!("  threads:        {}", stats.distinct_threads_for_agent);
    storage.close().await;
    Ok(())
}

async fn cmd_cleanup(storage: &Storage) -> Result<()> {
    let messages = storage.prune_archived(CLEANUP_RETENTION_DAYS).await?;
    let agents = storage.prune_stale_agents(CLEANUP_RETENTION_DAYS).await?;
    println!("Pruned {messages} archived message(s) and {agents} stale agent(s).");
    storage.close().await;
    Ok(())
}
