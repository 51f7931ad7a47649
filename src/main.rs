use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};

use chat_relay::chat::ChatService;
use chat_relay::config::ChatConfig;
use chat_relay::llm::create_backend;
use chat_relay::store::JsonFileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = ChatConfig::from_env().context("loading configuration")?;
    let owner = std::env::var("CHAT_RELAY_OWNER").unwrap_or_else(|_| "local-user".to_string());

    eprintln!("💬 Chat Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.ollama_url);
    eprintln!("   Model: {}", config.model);
    eprintln!("   Timeout: {}ms", config.timeout.as_millis());
    eprintln!("   Queue capacity: {}", config.max_pending);
    eprintln!("   Memory: {}", config.memory_dir().display());
    eprintln!("   Owner: {}", owner);
    eprintln!("   Type a message and press Enter. /status for queue state, /quit to exit.\n");

    let service = open_service(&config, &owner)
        .await
        .with_context(|| format!("starting relay with data in {}", config.data_dir.display()))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprint!("> ");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line.trim().to_string(),
            Ok(None) => break, // EOF
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };

        match line.as_str() {
            "" => {}
            "/quit" | "/exit" => break,
            "/status" => match service.status(&owner).await {
                Ok(status) => println!("{}", serde_json::to_string_pretty(&status)?),
                Err(e) => eprintln!("❌ {}", e),
            },
            content => match service.send_message(&owner, content).await {
                Ok(reply) => {
                    println!("\n{}\n", reply.assistant.content);
                    if !reply.persisted {
                        eprintln!("⚠️  Reply was not saved to disk");
                    }
                }
                Err(e) if e.is_retryable() => eprintln!("⏳ {} (try again)", e),
                Err(e) => eprintln!("❌ {}", e),
            },
        }
        eprint!("> ");
    }

    service.shutdown().await;
    Ok(())
}

/// Wire the file store, backend and queue together.
async fn open_service(config: &ChatConfig, owner: &str) -> chat_relay::error::Result<ChatService> {
    // ── Store ───────────────────────────────────────────────────────────
    let store = Arc::new(JsonFileStore::new(
        config.memory_dir(),
        config.max_recent_messages,
    ));
    store.ensure_dirs().await?;
    store.ensure_owner_file(owner).await?;

    // ── Backend + service ───────────────────────────────────────────────
    let backend = create_backend(config)?;
    Ok(ChatService::new(config, store, backend))
}
