// mixnode-cli — operator and client front-end
//
// Wires configuration, key files and the directory file into the core codec:
// key generation, chain selection, packet encoding and single-hop decoding.

mod config;
mod keyfile;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use mixnode_core::{
    encode, parse_hops, ChainSelector, Decoded, Decoder, DeliveryMethod, FinalInfo, Keyring,
    NodeKeys, Packet, RemailerStats, BODY_BYTES,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mixnode")]
#[command(about = "Mixnode — layered fixed-size remailer packets", long_about = None)]
#[command(version)]
struct Cli {
    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a node key pair and print its directory record
    Keygen {
        /// Delivery address advertised for this node
        #[arg(short, long)]
        address: String,
        /// Short name (defaults to the address local part)
        #[arg(short, long)]
        name: Option<String>,
        /// Advertise exit capability
        #[arg(long)]
        exit: bool,
        /// Secret key file (defaults to the configured key path)
        #[arg(short, long)]
        out: Option<PathBuf>,
        /// Add the record to the configured directory file
        #[arg(long)]
        publish: bool,
        /// Measured average latency (minutes)
        #[arg(long, default_value = "0")]
        latency: u32,
        /// Measured uptime (per-mille, 0-1000)
        #[arg(long, default_value = "0", value_parser = clap::value_parser!(u16).range(0..=1000))]
        uptime: u16,
    },
    /// Import measured latency/uptime into the directory file
    Stats {
        /// JSON object mapping addresses to {"latency", "uptime"}
        file: PathBuf,
    },
    /// Select a chain, e.g. `mixnode chain '*' alpha '*'`
    Chain {
        #[arg(required = true)]
        hops: Vec<String>,
        #[arg(short, long, default_value = "1")]
        copies: usize,
    },
    /// Encode a message into packets
    Encode {
        #[arg(required = true)]
        hops: Vec<String>,
        /// Message file (omit with --dummy)
        #[arg(short, long, required_unless_present = "dummy")]
        input: Option<PathBuf>,
        /// Output prefix; packets are written to <prefix>.<n>
        #[arg(short, long)]
        out: String,
        #[arg(short, long)]
        copies: Option<usize>,
        /// Encode a cover packet the exit will discard
        #[arg(long)]
        dummy: bool,
    },
    /// Strip one layer from a received packet using this node's key
    Decode {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Configure settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    Set { key: String, value: String },
    Get { key: String },
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Commands::Keygen {
            address,
            name,
            exit,
            out,
            publish,
            latency,
            uptime,
        } => {
            let stats = RemailerStats { latency, uptime };
            cmd_keygen(address, name, exit, out, publish, stats).await
        }
        Commands::Stats { file } => cmd_stats(file).await,
        Commands::Chain { hops, copies } => cmd_chain(hops, copies).await,
        Commands::Encode {
            hops,
            input,
            out,
            copies,
            dummy,
        } => cmd_encode(hops, input, out, copies, dummy).await,
        Commands::Decode { input, out } => cmd_decode(input, out).await,
        Commands::Config { action } => cmd_config(action).await,
    }
}

fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let name = path.file_name().context("Log file path has no file name")?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            Ok(None)
        }
    }
}

async fn cmd_keygen(
    address: String,
    name: Option<String>,
    exit: bool,
    out: Option<PathBuf>,
    publish: bool,
    stats: RemailerStats,
) -> Result<()> {
    let config = config::Config::load()?;
    let key_file = match out {
        Some(path) => path,
        None => config.key_file()?,
    };
    let shortname = name.unwrap_or_else(|| {
        address
            .split('@')
            .next()
            .unwrap_or(address.as_str())
            .to_string()
    });

    let keys = NodeKeys::generate(&mut rand::thread_rng());
    keyfile::write_secret_key(&key_file, &keys)?;
    println!("{} Secret key written to {}", "✓".green(), key_file.display());
    println!("  Key ID: {}", keys.key_id().to_string().bright_yellow());

    let record = keyfile::record_for(
        &keys,
        &address,
        &shortname,
        exit,
        stats,
        chrono::Utc::now().date_naive(),
    );

    if publish {
        let directory_file = config.directory_file()?;
        keyfile::publish_record(&directory_file, record.clone())?;
        println!(
            "{} Record added to {}",
            "✓".green(),
            directory_file.display()
        );
    }

    println!();
    println!("{}", "Directory record:".bold());
    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("Failed to serialize record")?
    );

    Ok(())
}

async fn cmd_stats(file: PathBuf) -> Result<()> {
    let config = config::Config::load()?;
    let directory_file = config.directory_file()?;
    let stats = keyfile::read_stats(&file)?;

    let updated = keyfile::import_stats(&directory_file, &stats)?;
    println!(
        "{} Updated {} of {} remailer(s) in {}",
        "✓".green(),
        updated,
        stats.len(),
        directory_file.display()
    );

    Ok(())
}

async fn cmd_chain(hops: Vec<String>, copies: usize) -> Result<()> {
    let config = config::Config::load()?;
    let directory = keyfile::load_directory(&config.directory_file()?)?;
    let requested = parse_hops(&hops.join(","))?;

    let selector = ChainSelector::new(&directory, config.chain.clone())?;
    let chains = selector.build_copies(&requested, copies.max(1), &mut rand::thread_rng())?;

    for (i, chain) in chains.iter().enumerate() {
        println!("  {}. {}", i + 1, chain.to_string().bright_cyan());
    }

    Ok(())
}

async fn cmd_encode(
    hops: Vec<String>,
    input: Option<PathBuf>,
    out: String,
    copies: Option<usize>,
    dummy: bool,
) -> Result<()> {
    let config = config::Config::load()?;
    let copies = copies.unwrap_or(config.default_copies);
    if copies == 0 {
        anyhow::bail!("--copies must be at least 1");
    }

    let message = match &input {
        Some(path) if !dummy => std::fs::read(path)
            .with_context(|| format!("Failed to read message file {}", path.display()))?,
        _ => Vec::new(),
    };
    let chunks: Vec<Vec<u8>> = if message.is_empty() {
        vec![Vec::new()]
    } else {
        message.chunks(BODY_BYTES).map(<[u8]>::to_vec).collect()
    };
    let chunk_count = u8::try_from(chunks.len())
        .map_err(|_| anyhow::anyhow!("Message too large: {} chunks (max 255)", chunks.len()))?;

    let directory = Arc::new(keyfile::load_directory(&config.directory_file()?)?);
    let requested = parse_hops(&hops.join(","))?;

    // Every packet of every copy ends at the same exit so the chunks can be
    // reassembled there
    let chains = {
        let selector = ChainSelector::new(directory.as_ref(), config.chain.clone())?;
        selector.build_copies(&requested, copies * chunks.len(), &mut rand::thread_rng())?
    };

    let message_id = *uuid::Uuid::new_v4().as_bytes();
    let mut tasks = Vec::with_capacity(chains.len());
    for (i, chain) in chains.into_iter().enumerate() {
        let chunk_index = i % chunks.len();
        let fragment = chunks[chunk_index].clone();
        let final_info = if dummy {
            FinalInfo::dummy(message_id)
        } else {
            FinalInfo::new(message_id, chunk_index as u8 + 1, chunk_count)?
        };
        let directory = Arc::clone(&directory);

        tasks.push(tokio::task::spawn_blocking(move || {
            let packet_id = rand::random();
            encode(
                &fragment,
                packet_id,
                &chain,
                final_info,
                directory.as_ref(),
                &mut rand::thread_rng(),
            )
            .map(|encoded| (chain, encoded))
        }));
    }

    println!(
        "{} Message {} ({} chunk(s) × {} cop(ies))",
        "✓".green(),
        hex::encode(message_id).bright_yellow(),
        chunks.len(),
        copies
    );
    for (i, task) in tasks.into_iter().enumerate() {
        let (chain, encoded) = task.await.context("Encoding task failed")??;
        let path = format!("{}.{}", out, i + 1);
        std::fs::write(&path, encoded.packet.as_bytes())
            .with_context(|| format!("Failed to write {}", path))?;
        println!(
            "  {} → {}  via {}",
            path,
            encoded.first_hop.bright_cyan(),
            chain.to_string().dimmed()
        );
    }

    Ok(())
}

async fn cmd_decode(input: PathBuf, out: PathBuf) -> Result<()> {
    let config = config::Config::load()?;
    let keys = keyfile::read_secret_key(&config.key_file()?)?;
    let decoder = Decoder::new(Keyring::from(&keys), config.decoder.clone());

    let bytes = std::fs::read(&input)
        .with_context(|| format!("Failed to read packet {}", input.display()))?;
    let packet = Packet::from_bytes(bytes)?;

    match decoder.decode(packet)? {
        Decoded::Forward {
            packet, next_hop, ..
        } => {
            std::fs::write(&out, packet.as_bytes())
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "{} Forward to {} ({})",
                "✓".green(),
                next_hop.bright_cyan(),
                out.display()
            );
        }
        Decoded::Exit {
            delivery: DeliveryMethod::Dummy,
            ..
        } => {
            println!("{} Dummy packet discarded", "✓".green());
        }
        Decoded::Exit {
            fragment,
            message_id,
            chunk_num,
            chunk_count,
            ..
        } => {
            std::fs::write(&out, &fragment)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            println!(
                "{} Exit: message {} chunk {}/{} ({} bytes) → {}",
                "✓".green(),
                hex::encode(message_id).bright_yellow(),
                chunk_num,
                chunk_count,
                fragment.len(),
                out.display()
            );
        }
    }

    Ok(())
}

async fn cmd_config(action: ConfigAction) -> Result<()> {
    let mut config = config::Config::load()?;

    match action {
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config.save()?;
            println!("{} Set {} = {}", "✓".green(), key.bright_cyan(), value);
        }

        ConfigAction::Get { key } => {
            if let Some(value) = config.get(&key) {
                println!("{} = {}", key.bright_cyan(), value);
            } else {
                anyhow::bail!("Unknown or unset config key: {}", key);
            }
        }

        ConfigAction::List => {
            println!("{}", "Configuration".bold());
            println!();

            for (key, value) in config.list() {
                println!("  {:<22} {}", key.bright_cyan(), value);
            }
        }
    }

    Ok(())
}
