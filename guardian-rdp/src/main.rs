//! Guardian RDP: entry point.
//!
//! ```text
//! guardian-rdp server [--bind HOST:PORT]   Stream annotated frames to viewers
//! guardian-rdp client [ADDR] [--display]   View a server (ADDR = host[:port])
//! guardian-rdp --config <path> ...         Load a custom config TOML
//! guardian-rdp --gen-config                Write default config to stdout
//! ```

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use tokio::sync::{Notify, mpsc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use guardian_core::{DisplaySink, ScreenClient, ScreenServer, SessionEvent, StopReason};
use guardian_rdp::config::{
    DEFAULT_PORT, DisplayKind, GuardianConfig, LoggingConfig, resolve_server_addr,
};
use guardian_rdp::display::SnapshotSink;
use guardian_rdp::viewer::TerminalSink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "guardian-rdp", version, about = "Annotated remote screen streaming")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "guardian-rdp.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept viewers and stream frames to each of them.
    Server {
        /// Listen address, overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Connect to a server and receive frames.
    Client {
        /// Server address, `host` or `host:port` (default port 5000).
        addr: Option<String>,

        /// How to show frames, overrides `client.display`.
        #[arg(long, value_enum)]
        display: Option<DisplayKind>,

        /// Terminal graphics protocol (sixel, kitty, iterm2, halfblocks).
        #[arg(long)]
        graphics: Option<String>,
    },
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&GuardianConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let Some(command) = cli.command else {
        Cli::command()
            .error(ErrorKind::MissingSubcommand, "a mode is required: `server` or `client`")
            .exit();
    };

    let mut config = GuardianConfig::load(&cli.config);
    if let Command::Client {
        display, graphics, ..
    } = &command
    {
        if let Some(display) = display {
            config.client.display = *display;
        }
        if graphics.is_some() {
            config.client.graphics = graphics.clone();
        }
    }

    // The terminal viewer owns the screen; stray log lines would tear it.
    let owns_terminal = matches!(command, Command::Client { .. })
        && config.client.display == DisplayKind::Terminal;
    init_logging(&config.logging, owns_terminal)?;

    info!("guardian-rdp v{}", env!("CARGO_PKG_VERSION"));

    match command {
        Command::Server { bind } => run_server(config, bind).await,
        Command::Client { addr, .. } => run_client(config, addr).await,
    }
}

fn init_logging(
    logging: &LoggingConfig,
    owns_terminal: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let level = match (&logging.file, owns_terminal) {
        (None, true) => "off",
        _ => logging.level.as_str(),
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match &logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
    Ok(())
}

// ── Modes ────────────────────────────────────────────────────────

async fn run_server(
    mut config: GuardianConfig,
    bind: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    let server_cfg = &config.server;
    let bind = resolve_server_addr(&server_cfg.bind, DEFAULT_PORT);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let server = ScreenServer::bind(
        bind.as_str(),
        server_cfg.pipeline_factory(),
        server_cfg.to_session_config(),
    )
    .await
    .inspect_err(|e| error!("cannot listen on {bind}: {e}"))?
    .with_events(tx);

    info!("listening on {}", server.local_addr()?);
    info!(
        "capture: {:?}, analyzer: {:?}, pacing: {}ms",
        server_cfg.capture, server_cfg.analyzer, server_cfg.pacing_ms
    );

    tokio::spawn(async move {
        let mut active = 0usize;
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Started { .. } => active += 1,
                SessionEvent::Ended { .. } => active = active.saturating_sub(1),
            }
            info!(active, "viewers");
        }
    });

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => info!("Ctrl-C received, shutting down"),
    }
    Ok(())
}

async fn run_client(
    config: GuardianConfig,
    addr: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let client_cfg = config.client;
    let addr = resolve_server_addr(
        addr.as_deref().unwrap_or(&client_cfg.server_address),
        DEFAULT_PORT,
    );

    info!("connecting to {addr}");
    let stream = ScreenClient::connect(addr.as_str())
        .await
        .inspect_err(|e| error!("cannot connect to {addr}: {e}"))?;

    let running = Arc::new(AtomicBool::new(true));
    let interrupted = Arc::new(Notify::new());
    {
        let running = running.clone();
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Ctrl-C received, closing viewer");
            running.store(false, Ordering::SeqCst);
            interrupted.notify_one();
        });
    }

    let mut sink: Box<dyn DisplaySink> = match client_cfg.display {
        DisplayKind::Terminal => Box::new(
            TerminalSink::open(running, client_cfg.graphics.as_deref())?
                .with_max_frames(client_cfg.max_frames()),
        ),
        DisplayKind::Snapshot => Box::new(
            SnapshotSink::new(running)
                .with_snapshot(client_cfg.snapshot_path.clone())
                .with_max_frames(client_cfg.max_frames()),
        ),
    };
    let mut client = ScreenClient::new()
        .with_decoder(client_cfg.frame_decoder())
        .with_io_timeout(client_cfg.io_timeout());

    // A read blocked on a silent server would never poll the stop flag.
    let outcome = tokio::select! {
        outcome = client.run(stream, sink.as_mut()) => outcome,
        _ = interrupted.notified() => {
            sink.close();
            Ok(StopReason::Cancelled)
        }
    };

    drop(sink);
    let stats = client.stats();
    info!(
        "received {} frames ({} bytes), last {}x{}",
        stats.total_frames, stats.total_bytes, stats.width, stats.height
    );

    match outcome {
        Ok(reason) => {
            info!("viewer stopped: {reason:?}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
