//! MURMUR CLI
//!
//! Multicast Unordered Relay-free Messaging over UDP with Rebroadcast

mod config;

use clap::{Parser, Subcommand};
use console::style;
use murmur_core::{ChatEvent, Engine, EngineConfig, Username};
use murmur_crypto::GroupCrypto;
use murmur_crypto::aead::AeadKey;
use murmur_transport::{MulticastTransport, TransportConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

use config::Config;

/// MURMUR - Serverless encrypted group chat over UDP multicast
#[derive(Parser)]
#[command(name = "murmur")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a chat group and start messaging
    Chat {
        /// Multicast group address
        #[arg(short, long)]
        group: Option<String>,

        /// UDP port shared by the group
        #[arg(short, long)]
        port: Option<u16>,

        /// Username to chat under (prompted for when omitted)
        #[arg(short, long)]
        username: Option<String>,

        /// Pre-shared group key, hex encoded
        #[arg(short, long)]
        key: Option<String>,

        /// Inbound datagram buffer size in bytes
        #[arg(long)]
        recv_buffer_size: Option<usize>,
    },

    /// Generate a new pre-shared group key
    Keygen {
        /// Output file for the key
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(if cli.verbose {
            "debug".to_string()
        } else {
            config.logging.level.clone()
        })
        .init();

    match cli.command {
        Commands::Chat {
            group,
            port,
            username,
            key,
            recv_buffer_size,
        } => {
            // Command-line flags override the config file
            if let Some(group) = group {
                config.chat.multicast_addr = group;
            }
            if let Some(port) = port {
                config.chat.port = port;
            }
            if let Some(username) = username {
                config.chat.username = Some(username);
            }
            if let Some(size) = recv_buffer_size {
                config.engine.recv_buffer_size = size;
            }
            config.validate()?;

            let group_key = resolve_group_key(key.as_deref(), &config)?;
            run_chat(&config, group_key).await?;
        }
        Commands::Keygen { output } => {
            generate_group_key(output)?;
        }
    }

    Ok(())
}

/// Resolve the pre-shared group key: flag, then config, then key file.
fn resolve_group_key(key_flag: Option<&str>, config: &Config) -> anyhow::Result<AeadKey> {
    let encoded = if let Some(key) = key_flag {
        key.trim().to_owned()
    } else if let Some(key) = &config.group.key {
        key.trim().to_owned()
    } else if config.group.key_file.exists() {
        std::fs::read_to_string(&config.group.key_file)?
            .trim()
            .to_owned()
    } else {
        anyhow::bail!(
            "No group key found. Pass --key, set [group].key in the config, \
             or generate one with: murmur keygen --output {}",
            config.group.key_file.display()
        );
    };

    Ok(AeadKey::from_hex(&encoded)?)
}

/// Join the group and run the interactive chat session
async fn run_chat(config: &Config, group_key: AeadKey) -> anyhow::Result<()> {
    let username = match &config.chat.username {
        Some(name) => Username::parse(name)?,
        None => prompt_username()?,
    };

    let group = config.parse_multicast_addr()?;
    let transport = MulticastTransport::join(group, config.chat.port, &TransportConfig::default())?;
    tracing::info!(%group, port = config.chat.port, "joined multicast group");

    // Fresh signing keypair per session; trust is established via discovery
    let crypto = GroupCrypto::with_fresh_identity(group_key);

    let engine_config = EngineConfig {
        announce_interval: Duration::from_secs(config.engine.announce_interval_secs),
        recv_buffer_size: config.engine.recv_buffer_size,
        ..EngineConfig::default()
    };
    let (engine, mut events) = Engine::new(
        Arc::new(transport),
        Arc::new(crypto),
        username.clone(),
        engine_config,
    );
    engine.start().await?;

    println!(
        "{}",
        style(format!(
            "Connected to {}:{} as {}",
            group, config.chat.port, username
        ))
        .dim()
    );
    println!(
        "{}",
        style("Type a message and press Enter. Type 'exit' to leave.").dim()
    );

    let renderer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render_event(&event);
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                break;
            }
            line = lines.next_line() => match line? {
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if text.eq_ignore_ascii_case("exit") {
                        break;
                    }
                    engine.send_chat(text).await?;
                }
                None => break,
            }
        }
    }

    println!("{}", style("Leaving the chat...").dim());
    engine.shutdown().await?;
    renderer.abort();
    Ok(())
}

fn render_event(event: &ChatEvent) {
    match event {
        ChatEvent::Message { sender, text } => {
            println!("{} {}", style(format!("{sender}:")).cyan().bold(), text);
        }
        ChatEvent::PeerJoined(name) => {
            println!(
                "{} Welcome {} to the chat!",
                style("*").green(),
                style(name).bold()
            );
        }
        ChatEvent::PeerLeft(name) => {
            println!(
                "{} {} has left the chat.",
                style("*").yellow(),
                style(name).bold()
            );
        }
    }
}

/// Prompt on stdin until a valid username is entered
fn prompt_username() -> anyhow::Result<Username> {
    use std::io::Write;

    loop {
        print!("Choose a username: ");
        std::io::stdout().flush()?;

        let mut raw = String::new();
        if std::io::stdin().read_line(&mut raw)? == 0 {
            anyhow::bail!("stdin closed before a username was entered");
        }
        match Username::parse(&raw) {
            Ok(name) => return Ok(name),
            Err(e) => eprintln!("{e}"),
        }
    }
}

/// Generate a new pre-shared group key
fn generate_group_key(output: Option<String>) -> anyhow::Result<()> {
    println!("Generating new 256-bit group key...");

    let key = AeadKey::generate(&mut rand_core::OsRng);
    let encoded = hex::encode(key.as_bytes());

    println!("Group key: {encoded}");

    if let Some(path) = output {
        let output_path = PathBuf::from(path);

        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&output_path, format!("{encoded}\n"))?;

        println!("Group key saved to: {}", output_path.display());
        println!("\n⚠️  Share this file only with people you want in the chat.");
    } else {
        println!("\n⚠️  Key not saved (use --output to save)");
    }

    Ok(())
}
