// ============================================================================
// memchat - Memory-grounded chat over Qdrant and Gemini
// ============================================================================
// Usage:
//   memchat [chat]                 Interactive chat (default)
//   memchat stats                  Show collection statistics
//   memchat list [--limit N]       List the user's stored memories
//   memchat forget --yes           Delete every memory of the user
// ============================================================================

use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use memchat_core::generation::gemini_strategies;
use memchat_core::memory::{create_embedding_service, Embedder};
use memchat_core::{
    Config, ConversationTurnController, GenerationInvoker, MemoryLookup, MemoryStore,
    QdrantBackend, TurnDisplay,
};

/// Chat assistant with self-healing vector memory
#[derive(Parser)]
#[command(name = "memchat", version, about = "Chat with an assistant that remembers you")]
struct Cli {
    /// Qdrant gRPC endpoint (default: $QDRANT_URL or http://localhost:6334)
    #[arg(long, global = true)]
    qdrant_url: Option<String>,

    /// Memory collection name (default: $QDRANT_COLLECTION)
    #[arg(long, global = true)]
    collection: Option<String>,

    /// User whose memories are read and written (default: $MEM_USER_ID)
    #[arg(long, global = true)]
    user_id: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive chat loop
    Chat,

    /// Show collection name, dimension and point count
    Stats,

    /// List stored memories for the user
    List {
        #[arg(long, default_value = "20")]
        limit: u64,
    },

    /// Delete every memory of the user
    Forget {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
}

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
    }

    // Logs go to stderr so they stay out of the chat transcript
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("memchat=info,memchat_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    if matches!(cli.command, Some(Commands::Forget { yes: false })) {
        anyhow::bail!("Refusing to delete memories without --yes");
    }

    let store = match open_store(&config).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Memory store could not be provisioned: {}", e);
            return Err(e);
        }
    };

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => cmd_chat(&config, store).await,
        Commands::Stats => cmd_stats(&store).await,
        Commands::List { limit } => cmd_list(&store, &config.user_id, limit).await,
        Commands::Forget { .. } => cmd_forget(&store, &config.user_id).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = Config::from_env()?;
    if let Some(url) = &cli.qdrant_url {
        config.qdrant_url = url.clone();
    }
    if let Some(collection) = &cli.collection {
        config.collection = collection.clone();
    }
    if let Some(user_id) = &cli.user_id {
        config.user_id = user_id.clone();
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(config: &Config) -> Result<MemoryStore> {
    let backend = Arc::new(QdrantBackend::connect(&config.qdrant_url)?);
    let embedder: Arc<dyn Embedder> = Arc::from(create_embedding_service(
        config.gemini_api_key.clone(),
        config.openai_api_key.clone(),
        &config.embedding_model,
        config.embedding_dimension,
    )?);

    Ok(MemoryStore::open(config, backend, embedder).await?)
}

/// Prints turns to stdout
struct ConsoleDisplay;

impl TurnDisplay for ConsoleDisplay {
    fn show_memories(&mut self, memories: &[String]) {
        if memories.is_empty() {
            println!("\n[Found Memories] None");
        } else {
            println!("\n[Found Memories]");
            for memory in memories {
                println!("{}", memory);
            }
        }
    }

    fn show_response(&mut self, response: &str) {
        println!("\nAI: {}", response);
    }

    fn show_saved(&mut self, saved: bool) {
        if saved {
            println!("[mem] Memory saved.\n");
        }
    }
}

async fn cmd_chat(config: &Config, store: Arc<MemoryStore>) -> Result<()> {
    let strategies = match config.gemini_api_key.as_deref() {
        Some(key) => gemini_strategies(key, &config.generation_model),
        None => {
            warn!("GEMINI_API_KEY not set, responses will be placeholders");
            Vec::new()
        }
    };
    let invoker = GenerationInvoker::new(strategies);
    info!(strategies = ?invoker.strategy_names(), "Generation ready");

    let controller = ConversationTurnController::new(store, invoker);
    let mut display = ConsoleDisplay;

    println!("Memory agent ready. Type 'exit' to quit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"\nYou: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();

        if query.is_empty() {
            continue;
        }
        if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
            break;
        }

        let outcome = controller
            .run_turn(query, &config.user_id, &mut display)
            .await?;

        if outcome.memory_lookup == MemoryLookup::Unavailable {
            println!("[mem] Memory search unavailable for this turn.");
        }
        if !outcome.saved {
            println!("[mem] Memory not saved.\n");
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn cmd_stats(store: &MemoryStore) -> Result<()> {
    let stats = store.stats().await?;
    let healthy = store.health_check().await;

    println!("=== Memory Collection Stats ===");
    println!("Collection: {}", stats.name);
    println!(
        "Dimension:  {}",
        stats
            .dimension
            .map(|d| d.to_string())
            .unwrap_or_else(|| "unknown".into())
    );
    println!("Memories:   {}", stats.points_count);
    println!("Healthy:    {}", healthy);

    Ok(())
}

async fn cmd_list(store: &MemoryStore, user_id: &str, limit: u64) -> Result<()> {
    let memories = store.list(user_id, limit).await?;

    if memories.is_empty() {
        println!("No memories found.");
        return Ok(());
    }

    println!("{:<36}  {:<22}  {}", "MEMORY ID", "CREATED AT", "CONTENT");
    println!("{}", "-".repeat(90));

    for memory in &memories {
        let content = memory
            .content
            .replace('\n', " ")
            .chars()
            .take(40)
            .collect::<String>();
        println!(
            "{:<36}  {:<22}  {}",
            memory.id,
            format_timestamp(memory.created_at),
            content
        );
    }

    println!("\nTotal: {} memories", memories.len());
    Ok(())
}

async fn cmd_forget(store: &MemoryStore, user_id: &str) -> Result<()> {
    store.forget_user(user_id).await?;
    println!("Deleted all memories for user '{}'", user_id);
    Ok(())
}

fn format_timestamp(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| format!("(invalid: {})", ts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_chat() {
        let cli = Cli::parse_from(["memchat", "--user-id", "akhil"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.user_id.as_deref(), Some("akhil"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["memchat", "list", "--limit", "3", "--collection", "notes"]);
        assert!(matches!(cli.command, Some(Commands::List { limit: 3 })));
        assert_eq!(cli.collection.as_deref(), Some("notes"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    }
}
