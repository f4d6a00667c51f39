mod boot;
mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tengwar_core::{ContentClassifier, MemoryStore, TemporalContext, TengwarConfig, TimeBuckets};
use tengwar_limbic::EmotionEngine;
use tengwar_memory::SqliteMemory;
use tengwar_os::SelfEditor;
use tengwar_reasoning::{build_backend, DialogueHandler, ThoughtDaemon};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "tengwar", author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "TENGWAR_CONFIG", default_value = "tengwar.toml")]
    config: String,

    /// Override the memory database path
    #[arg(long)]
    db: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Think continuously and serve the HTTP/WebSocket gateway (default)
    Serve,
    /// Talk from the terminal while the daemon keeps thinking
    Chat {
        /// Do not run the thought daemon during the session
        #[arg(long)]
        no_daemon: bool,
    },
    /// Print the latest thoughts, oldest first
    Thoughts {
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
}

/// The wired-up mind.
struct Mind {
    store: Arc<SqliteMemory>,
    emotions: Arc<EmotionEngine>,
    daemon: Arc<ThoughtDaemon>,
    dialogue: Arc<DialogueHandler>,
    buckets: TimeBuckets,
}

impl Mind {
    async fn assemble(config: &TengwarConfig) -> anyhow::Result<Self> {
        info!("Opening memory at {}...", config.storage.db_path);
        let store = Arc::new(
            SqliteMemory::new(&config.storage.db_path)
                .await
                .context("Failed to open memory store")?,
        );
        let dyn_store: Arc<dyn MemoryStore> = store.clone();

        let emotions = Arc::new(
            EmotionEngine::restore(config.emotion.clone(), config.time.clone(), dyn_store.clone())
                .await
                .context("Failed to restore emotional state")?,
        );
        let classifier = Arc::new(ContentClassifier::new(config.classifier.clone()));

        let thought_backend = build_backend(&config.thought_backend)
            .context("Failed to configure thought backend")?;
        let dialogue_backend = build_backend(&config.dialogue_backend)
            .context("Failed to configure dialogue backend")?;
        info!(
            "Backends: thinking with {}, talking with {}",
            thought_backend.name(),
            dialogue_backend.name()
        );

        let editor = Arc::new(SelfEditor::from_config(&config.editor));
        let roots = editor.guard().roots();
        info!(
            "Self-editor roots: {} and {}",
            roots[0].display(),
            roots[1].display()
        );

        let daemon = Arc::new(ThoughtDaemon::new(
            dyn_store.clone(),
            emotions.clone(),
            thought_backend,
            classifier.clone(),
            config,
        ));
        let dialogue = Arc::new(DialogueHandler::new(
            dyn_store,
            emotions.clone(),
            dialogue_backend,
            editor,
            classifier,
            config,
        ));

        Ok(Self {
            store,
            emotions,
            daemon,
            dialogue,
            buckets: config.time.clone(),
        })
    }

    async fn awaken(&self) -> anyhow::Result<()> {
        boot::awaken(self.store.as_ref(), &self.emotions)
            .await
            .context("Failed to record boot")?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = TengwarConfig::load_or_default(&args.config);
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }
    let _log_guard = logging::init(&config.logging);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Chat { no_daemon } => chat(config, no_daemon).await,
        Command::Thoughts { limit } => thoughts(config, limit).await,
    }
}

async fn serve(config: TengwarConfig) -> anyhow::Result<()> {
    let mind = Mind::assemble(&config).await?;
    mind.awaken().await?;

    let token = CancellationToken::new();
    let daemon_handle = mind.daemon.spawn(token.clone());

    #[cfg(feature = "gateway")]
    let gateway_handle = {
        let state = tengwar_gateway::AppState::new(
            mind.store.clone(),
            mind.emotions.clone(),
            mind.daemon.clone(),
            mind.dialogue.clone(),
            mind.buckets.clone(),
        );
        tengwar_gateway::GatewayServer::new(state, &config.gateway.host, config.gateway.port)
            .start(token.clone())
    };

    info!("Tengwar AI is awake. Ctrl-C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Shutting down...");
    token.cancel();

    if let Err(e) = daemon_handle.await {
        error!("Thought daemon task failed: {}", e);
    }
    #[cfg(feature = "gateway")]
    if let Err(e) = gateway_handle.await {
        error!("Gateway task failed: {}", e);
    }
    mind.store.close().await;
    Ok(())
}

async fn chat(config: TengwarConfig, no_daemon: bool) -> anyhow::Result<()> {
    let mind = Mind::assemble(&config).await?;
    mind.awaken().await?;

    let token = CancellationToken::new();
    let daemon_handle = (!no_daemon).then(|| mind.daemon.spawn(token.clone()));

    // rustyline blocks; read lines on their own thread.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(8);
    std::thread::spawn(move || read_lines(line_tx));

    println!("Tengwar AI is listening. /new, /status, /pause, /resume, /quit");
    while let Some(line) = line_rx.recv().await {
        let input = line.trim();
        match input {
            "" => continue,
            "/quit" | "/exit" => break,
            "/new" => {
                mind.dialogue.new_conversation();
                println!("(new conversation)");
            }
            "/pause" => mind.daemon.pause(),
            "/resume" => mind.daemon.resume(),
            "/status" => print_status(&mind).await?,
            message => {
                if let Err(e) = stream_reply(&mind, message).await {
                    error!("Dialogue failed: {}", e);
                    println!("\n[System Error]: {}\n", e);
                }
            }
        }
    }

    token.cancel();
    if let Some(handle) = daemon_handle {
        if let Err(e) = handle.await {
            error!("Thought daemon task failed: {}", e);
        }
    }
    mind.store.close().await;
    Ok(())
}

/// Print the reply as it is produced.
async fn stream_reply(mind: &Mind, message: &str) -> Result<(), tengwar_reasoning::DialogueError> {
    use std::io::Write;

    let (tx, mut rx) = mpsc::channel::<String>(64);
    let printer = async {
        print!("\nTengwar: ");
        while let Some(token) = rx.recv().await {
            print!("{}", token);
            let _ = std::io::stdout().flush();
        }
    };
    let (reply, ()) = tokio::join!(mind.dialogue.handle_stream(message, tx), printer);
    reply?;
    println!("\n");
    Ok(())
}

fn read_lines(tx: mpsc::Sender<String>) {
    let mut editor = match rustyline::DefaultEditor::new() {
        Ok(e) => e,
        Err(e) => {
            eprintln!("Failed to start line editor: {}", e);
            return;
        }
    };
    loop {
        match editor.readline("> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(line.as_str());
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            // Ctrl-C / Ctrl-D end the session.
            Err(_) => {
                let _ = tx.blocking_send("/quit".to_string());
                break;
            }
        }
    }
}

async fn print_status(mind: &Mind) -> anyhow::Result<()> {
    let temporal = TemporalContext::derive(
        chrono::Utc::now(),
        mind.store.first_thought_at().await?,
        mind.store.last_interaction_at().await?,
        &mind.buckets,
    );
    println!("{}", temporal.describe());
    println!("Feeling: {}", mind.emotions.summary().await);
    println!(
        "Thoughts: {} (records: {}), daemon {:?}{}",
        mind.store.thought_count().await?,
        mind.store.record_count().await?,
        mind.daemon.phase(),
        if mind.daemon.is_paused() { ", paused" } else { "" }
    );
    Ok(())
}

async fn thoughts(config: TengwarConfig, limit: usize) -> anyhow::Result<()> {
    let store = SqliteMemory::new(&config.storage.db_path)
        .await
        .context("Failed to open memory store")?;
    let mut thoughts = store.recent_thoughts(limit).await?;
    thoughts.reverse();
    if thoughts.is_empty() {
        println!("(no thoughts yet)");
    }
    for t in thoughts {
        println!(
            "[{}] #{} ({}) {}",
            t.timestamp.format("%Y-%m-%d %H:%M:%S"),
            t.id,
            t.source.as_str(),
            t.content
        );
    }
    store.close().await;
    Ok(())
}
