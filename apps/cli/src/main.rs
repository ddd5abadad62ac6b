use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use cfglink_core::platform::{StaticIdentity, SystemClock, reset_reason};
use cfglink_core::{AgentConfig, AgentEvent, AgentObserver, Engine, SerialWire, Session};
use cfglink_core::{FileSlots, TomlStore};

#[derive(Parser, Debug)]
#[command(
    name = "cfglink",
    author,
    version,
    about = "cfglink device agent",
    long_about = "Runs the cfglink configuration & provisioning agent on a serial port, \
                  serving the host-side tooling over a framed request/response protocol."
)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Serial device path (e.g. /dev/ttyACM0); overrides the config file
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Directory file transfers operate under
    #[arg(long)]
    root: Option<String>,

    /// Backing file of the key-value store
    #[arg(long)]
    store: Option<String>,

    /// Directory holding firmware slot images
    #[arg(long)]
    slots: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// CLI observer that prints protocol activity to stderr.
struct CliObserver {
    verbose: bool,
}

impl AgentObserver for CliObserver {
    fn on_event(&self, event: &AgentEvent) {
        match event {
            AgentEvent::PacketReceived { opcode, payload_len } => {
                if self.verbose {
                    eprintln!("← {} ({} bytes)", opcode, payload_len);
                }
            }
            AgentEvent::ReplySent { opcode, payload_len } => {
                if self.verbose {
                    eprintln!("→ {} ({} bytes)", opcode, payload_len);
                }
            }
            AgentEvent::CrcMismatch { expected, actual } => {
                eprintln!("✗ CRC mismatch: expected {expected:#06x}, got {actual:#06x}");
            }
            AgentEvent::UnknownOpcode { raw } => {
                eprintln!("✗ Unknown opcode {raw:#04x}");
            }
            AgentEvent::FileWriteStarted { path, expected } => {
                eprintln!("⇣ Receiving {path} ({expected} bytes)");
            }
            AgentEvent::FileWriteProgress { written, expected } => {
                let pct = if *expected > 0 {
                    (*written * 100) / *expected
                } else {
                    0
                };
                eprint!("\r[{pct:>3}%] file write");
            }
            AgentEvent::FileWriteFinished { path, written } => {
                eprintln!("\r✓ {path} written ({written} bytes)");
            }
            AgentEvent::FileWriteAborted { path } => {
                eprintln!("\r✗ File write aborted: {path}");
            }
            AgentEvent::OtaStarted { slot } => {
                eprintln!("⇣ Firmware update started (slot {slot})");
            }
            AgentEvent::OtaProgress { offset } => {
                if self.verbose {
                    eprint!("\r{offset} bytes staged");
                }
            }
            AgentEvent::OtaAborted => {
                eprintln!("\r✗ Firmware update aborted");
            }
            AgentEvent::OtaCommitted { slot } => {
                eprintln!("\r✓ Firmware update committed (slot {slot})");
            }
            AgentEvent::RebootRequested { bootloader } => {
                if *bootloader {
                    eprintln!("↻ Reboot to bootloader requested");
                } else {
                    eprintln!("↻ Reboot requested");
                }
            }
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.config {
        Some(path) => AgentConfig::load_from_file(path)?,
        None => AgentConfig::default(),
    };
    if args.port.is_some() {
        config.port = args.port.clone();
    }
    if let Some(baud) = args.baud {
        config.baud = baud;
    }
    if let Some(root) = &args.root {
        config.fs_root = root.into();
    }
    if let Some(store) = &args.store {
        config.store_path = store.into();
    }
    if let Some(slots) = &args.slots {
        config.slots_dir = slots.into();
    }
    Ok(config)
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    let Some(port) = config.port.clone() else {
        eprintln!("No serial port configured. Available ports:");
        for port in serialport::available_ports().unwrap_or_default() {
            eprintln!("  - {}", port.port_name);
        }
        anyhow::bail!("pass --port or set `port` in the config file");
    };

    std::fs::create_dir_all(&config.fs_root)?;

    let observer = Arc::new(CliObserver {
        verbose: args.verbose,
    });
    let engine = Engine::new(
        Box::new(TomlStore::open(&config.store_path)?),
        Box::new(FileSlots::new(&config.slots_dir)?),
        Box::new(SystemClock::new(reset_reason::POWER_ON)),
        Box::new(StaticIdentity::new(config.identity.clone())),
        config.fs_root.clone(),
        observer.clone(),
    );

    let wire = SerialWire::open(&port, config.baud)?;
    info!(port = %port, "cfglink agent ready");

    let mut session = Session::new(wire, engine, observer).with_timing(
        std::time::Duration::from_millis(config.flush_timeout_ms),
        std::time::Duration::from_millis(config.reboot_delay_ms),
    );
    session.run()
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    info!("cfglink agent starting...");

    if let Err(e) = run(args) {
        error!("Agent failed: {}", e);
        eprintln!("✗ FAILED: {e}");
        std::process::exit(1);
    }
}
