//! Sightline CLI binary.
//!
//! Drives a detection session from the command line.
//!
//! # Commands
//!
//! - `replay` - Stream recorded frames (JSON lines) through a session
//! - `ping` - Open a session and close it again
//! - `config` - Print the effective configuration

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sightline::{
    config::{self, ColorFields},
    transport::Reply,
    Config, Frame, HttpTransport, ScriptedTransport, SessionClient, Transport, VERSION,
};

#[derive(Parser)]
#[command(name = "sightline")]
#[command(version = VERSION)]
#[command(about = "Sightline - detection session client", long_about = None)]
struct Cli {
    /// Config file (default: $SIGHTLINE_CONFIG or the user config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Detection service base URL (overrides config)
    #[arg(long, global = true)]
    server: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream recorded frames through a detection session
    Replay {
        /// JSON-lines input, one frame per line (or - for stdin)
        input: Option<PathBuf>,

        /// Source (camera) name announced at session start
        #[arg(short, long)]
        source: String,

        /// Clothing color field layout (last-wins, numbered)
        #[arg(long)]
        color_fields: Option<String>,

        /// Treat replies lost at transport level as stop signals
        #[arg(long)]
        escalate_loss: bool,

        /// Keep streaming after the service asks to stop
        #[arg(long)]
        ignore_stop: bool,

        /// Use an in-memory transport that accepts everything
        #[arg(long)]
        dry_run: bool,
    },

    /// Open a session and close it again
    Ping {
        /// Source (camera) name announced at session start
        #[arg(short, long, default_value = "sightline-ping")]
        source: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(io::stderr)
        .init();

    let mut config = match cli.config.as_deref() {
        Some(path) => {
            let mut config = config::load_or_default(Some(path))?;
            config.apply_env()?;
            config
        }
        None => Config::load()?,
    };
    if let Some(server) = cli.server {
        config.endpoints.base_url = server;
    }

    match cli.command {
        Commands::Replay {
            input,
            source,
            color_fields,
            escalate_loss,
            ignore_stop,
            dry_run,
        } => {
            if let Some(mode) = color_fields {
                config.wire.color_fields = mode
                    .parse::<ColorFields>()
                    .map_err(|e| anyhow::anyhow!(e))?;
            }
            if escalate_loss {
                config.reconcile.escalate_transport_loss = true;
            }
            config.validate()?;
            let reader = open_input(input)?;

            if dry_run {
                cmd_replay(&config, dry_run_transport(), &source, reader, ignore_stop)
            } else {
                let transport = HttpTransport::new(&config.transport)?;
                cmd_replay(&config, transport, &source, reader, ignore_stop)
            }
        }
        Commands::Ping { source } => {
            config.validate()?;
            cmd_ping(&config, &source)
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn open_input(input: Option<PathBuf>) -> anyhow::Result<Box<dyn BufRead>> {
    match input {
        Some(path) if path.as_os_str() != "-" => {
            let file = File::open(&path)
                .map_err(|e| anyhow::anyhow!("cannot open {}: {e}", path.display()))?;
            Ok(Box::new(BufReader::new(file)))
        }
        _ => Ok(Box::new(BufReader::new(io::stdin()))),
    }
}

fn dry_run_transport() -> ScriptedTransport {
    let transport = ScriptedTransport::new();
    transport
        .reply_blocking(Reply::body(r#"{"code":0,"session_key":"dry-run"}"#))
        .reply_blocking(Reply::code(0))
        .auto_reply(Some(Reply::code(0)));
    transport
}

fn cmd_replay<T: Transport>(
    config: &Config,
    transport: T,
    source: &str,
    reader: Box<dyn BufRead>,
    ignore_stop: bool,
) -> anyhow::Result<()> {
    let mut client = SessionClient::open(config, transport, source);
    if !client.is_active() {
        client.close();
        anyhow::bail!("could not start a session for '{source}'");
    }

    let mut frames = 0u64;
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: Frame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Skipping line {}: {}", line_no + 1, e);
                continue;
            }
        };

        let report = client.send_records(&frame.people, frame.frame);
        frames += 1;
        if report.stop_requested && !ignore_stop {
            tracing::warn!("Service asked to stop at frame {}", frame.frame);
            break;
        }
    }

    if !client.stop_signalled() || ignore_stop {
        client.flush();
    }
    let stats = client.stats();
    client.close();

    println!("Frames:           {frames}");
    println!("Records sent:     {}", stats.records_sent);
    println!("Records skipped:  {}", stats.records_skipped);
    println!("Dispatch errors:  {}", stats.dispatch_failures);
    println!("Replies accepted: {}", stats.replies_accepted);
    println!("Replies rejected: {}", stats.replies_rejected);
    println!("Replies lost:     {}", stats.replies_lost);
    Ok(())
}

fn cmd_ping(config: &Config, source: &str) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&config.transport)?;
    let mut client = SessionClient::new(config, transport);
    client.start(source)?;
    println!("Session started (key: {})", client.session_key());
    client.stop()?;
    println!("Session stopped");
    Ok(())
}
