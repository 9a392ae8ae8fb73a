//! mintwatch CLI — watch a Solana program for newly created token mints.
//!
//! # Commands
//! ```
//! mintwatch watch   --subscriber <ID> [--ws-url <URL>] [--http-url <URL>] [--webhook <URL>]
//! mintwatch check   --http-url <URL>
//! mintwatch replay  --file <frames.jsonl> [--subscriber <ID>]
//! mintwatch info
//! mintwatch version
//! ```

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use mintwatch_core::{MINT_INIT_SIGNAL, PUMP_FUN_PROGRAM};
use mintwatch_engine::{check_rpc, EngineConfig};
use mintwatch_ws::StreamConfig;

mod cmd_replay;
mod cmd_watch;
mod settings;

use settings::{Overrides, Settings, MAINNET_HTTP_URL, MAINNET_WS_URL};

#[derive(Parser)]
#[command(
    name = "mintwatch",
    about = "Watch a Solana program for new token mints",
    long_about = "
mintwatch follows a program's transaction stream over WebSocket, detects the
next newly initialized token mint and emits one notice per subscriber.

ENVIRONMENT VARIABLES:
  SOLANA_WS_URL          WebSocket RPC endpoint
  SOLANA_HTTP_URL        HTTP RPC endpoint (health check, token metadata)
  BIRDEYE_API_KEY        Price API key (price, liquidity, market cap)
  MINTWATCH_PROGRAM      Program id to watch
  MINTWATCH_WEBHOOK_URL  POST notices here instead of printing them
  MINTWATCH_LOG          Log level or filter directives
",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch for the next new token mint and emit its notice
    Watch(WatchArgs),

    /// Check an HTTP RPC endpoint with getSlot
    Check {
        /// HTTP JSON-RPC endpoint
        #[arg(long, env = "SOLANA_HTTP_URL", default_value = MAINNET_HTTP_URL)]
        http_url: String,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Run recorded frames (one JSON document per line) through the pipeline
    Replay {
        /// Frames file
        #[arg(short, long)]
        file: PathBuf,
        /// Subscriber id used for the replayed watch
        #[arg(long, default_value = "replay")]
        subscriber: String,
        /// Program id (defaults to the pump.fun program)
        #[arg(long)]
        program: Option<String>,
        /// Emit JSON logs
        #[arg(long)]
        json_logs: bool,
    },

    /// Show defaults and capabilities
    Info,

    /// Print version
    Version,
}

#[derive(Args)]
struct WatchArgs {
    /// Who the notice is for
    #[arg(short, long)]
    subscriber: String,
    /// WebSocket RPC endpoint
    #[arg(long, env = "SOLANA_WS_URL")]
    ws_url: Option<String>,
    /// HTTP RPC endpoint
    #[arg(long, env = "SOLANA_HTTP_URL")]
    http_url: Option<String>,
    /// Program id to watch
    #[arg(long, env = "MINTWATCH_PROGRAM")]
    program: Option<String>,
    /// POST notices to this URL instead of printing them
    #[arg(long, env = "MINTWATCH_WEBHOOK_URL")]
    webhook: Option<String>,
    /// Price API key
    #[arg(long, env = "BIRDEYE_API_KEY", hide_env_values = true)]
    price_api_key: Option<String>,
    /// Log level or filter directives
    #[arg(long, env = "MINTWATCH_LOG")]
    log: Option<String>,
    /// Skip metadata and price lookups
    #[arg(long)]
    no_enrich: bool,
    /// Skip the getSlot health check
    #[arg(long)]
    skip_check: bool,
    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
    /// JSON settings file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl WatchArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            ws_url: self.ws_url.clone(),
            http_url: self.http_url.clone(),
            program: self.program.clone(),
            webhook_url: self.webhook.clone(),
            price_api_key: self.price_api_key.clone(),
            log_level: self.log.clone(),
            json_logs: self.json_logs,
            no_enrich: self.no_enrich,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch(args) => {
            let settings = Settings::resolve(args.config.as_deref(), &args.overrides())?;
            cmd_watch::run(&args.subscriber, settings, args.skip_check).await
        }

        Commands::Check { http_url, timeout } => cmd_check(&http_url, timeout).await,

        Commands::Replay { file, subscriber, program, json_logs } => {
            cmd_replay::run(&file, &subscriber, program.as_deref(), json_logs).await
        }

        Commands::Info => cmd_info(),

        Commands::Version => {
            println!("mintwatch {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn cmd_check(url: &str, timeout_secs: u64) -> Result<()> {
    println!("Checking {url}...");
    let health = check_rpc(url, Duration::from_secs(timeout_secs)).await?;
    println!("  Status:  OK");
    println!("  Slot:    {}", health.slot);
    println!("  Latency: {}ms", health.latency.as_millis());
    Ok(())
}

fn cmd_info() -> Result<()> {
    let stream = StreamConfig::for_url(MAINNET_WS_URL);
    let engine = EngineConfig::default();

    println!("mintwatch v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("Defaults:");
    println!("  Program:            {PUMP_FUN_PROGRAM}");
    println!("  Signal:             {MINT_INIT_SIGNAL}");
    println!("  Mint account index: {}", stream.extractor.mint_account_index);
    println!("  Commitment:         {}", stream.commitment);
    println!("  WebSocket:          {MAINNET_WS_URL}");
    println!("  HTTP RPC:           {MAINNET_HTTP_URL}");
    println!("  Heartbeat:          {}ms", stream.heartbeat_interval_ms);
    println!("  Reconnect delay:    {}ms (fixed, unlimited attempts)", stream.reconnect_delay_ms);
    println!("  Connect timeout:    {}ms", stream.connect_timeout_ms);
    println!("  Dedup window:       {}s", engine.dedup_ttl_secs);
    println!("  Enrichment timeout: {}ms", engine.enrich_timeout_ms);
    println!();
    println!("Delivery:");
    println!("  stdout   one JSON notice per line (default)");
    println!("  webhook  POST JSON to --webhook / MINTWATCH_WEBHOOK_URL");
    Ok(())
}
