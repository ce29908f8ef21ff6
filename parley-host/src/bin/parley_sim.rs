//! Interactive scene: you stand among a few bots and talk to them through a
//! live backend. Lines starting with `/yell ` or `/general ` use those
//! channels; `/quit` leaves.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use parley_core::config::ConfigSnapshot;
use parley_core::scheduler::SessionId;
use parley_core::types::{Location, Participant};
use parley_host::{ChatOutbox, ChatService, hooks};
use parley_llm::OllamaClient;

#[derive(Debug, Parser)]
#[command(name = "parley-sim")]
#[command(about = "Chat with a scripted group of bots through a live backend")]
struct Args {
    /// TOML file with an `[OllamaChat]` table. Defaults apply when omitted.
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Seed for reply decisions
    #[arg(long)]
    seed: Option<u64>,

    /// Ambient chatter tick period in milliseconds
    #[arg(long, default_value_t = 1000)]
    tick_ms: u64,
}

/// You at the origin; bots at say range, near say range, yell range and
/// general range.
fn scene() -> (Participant, Vec<Participant>) {
    let you = Participant::player(1, "You", Location::default());
    let bots = vec![
        Participant::bot(10, "Thrall", Location::new(8.0, 0.0, 0.0)),
        Participant::bot(11, "Jaina", Location::new(0.0, 22.0, 0.0)),
        Participant::bot(12, "Grom", Location::new(45.0, 0.0, 0.0)),
        Participant::bot(13, "Sylvanas", Location::new(0.0, 250.0, 0.0)),
    ];
    (you, bots)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ConfigSnapshot::from_file(path)
            .with_context(|| format!("failed to read config {}", path.display()))?,
        None => ConfigSnapshot::default(),
    };

    let backend = Arc::new(OllamaClient::new(config.session_cookie.clone()));
    let (sink, mut outbox) = ChatOutbox::channel();
    let rng = args.seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
    let service = ChatService::start_with_rng(config, backend, sink, rng).await;

    let (you, bots) = scene();
    let everyone: Vec<Participant> = bots.iter().cloned().chain([you.clone()]).collect();
    for bot in &bots {
        println!(
            "  {} is {:.0} yards away",
            bot.name,
            bot.position.distance(&you.position)
        );
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_millis(args.tick_ms.max(1)));

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read stdin")? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "/quit" {
                    break;
                }
                let event = if let Some(rest) = line.strip_prefix("/yell ") {
                    hooks::on_yell(&you, rest)
                } else if let Some(rest) = line.strip_prefix("/general ") {
                    hooks::on_general(&you, rest)
                } else {
                    hooks::on_say(&you, line)
                };
                if service.on_chat(&event, &everyone).is_empty() {
                    println!("  (nobody answers)");
                }
            }
            Some(chat) = outbox.recv() => {
                println!("[{}] {}: {}", chat.channel, chat.speaker_name, chat.text);
            }
            _ = ticker.tick() => {
                service.on_chatter_tick(SessionId(1), &everyone, Instant::now());
            }
        }
    }

    service.stop().await;
    let stats = service.stats();
    println!(
        "{} queries: {} answered, {} failed, {} timed out, {} abandoned",
        stats.submitted, stats.completed, stats.failed, stats.timed_out, stats.abandoned
    );
    Ok(())
}
