use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info};
use usbdl_core::protocol::{BOOTLOADER_PRODUCT_ID, RIM_VENDOR_ID};
use usbdl_core::{NusbTransport, Session, SessionConfig, Task, TaskReport, run_task};

#[derive(Parser, Debug)]
#[command(author, version, about = "BlackBerry USB bootloader tool (Pure Rust)", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Load settings from a TOML file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Password answered to the device challenge
    #[arg(long)]
    password: Option<String>,

    /// File the `info` command writes to
    #[arg(long)]
    info_path: Option<String>,

    /// Only adopt a bootloader mode the device confirms
    #[arg(long)]
    strict_mode_switch: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Dump device identity to the info file
    Info,
    /// Enter RimBoot and reboot the device
    Reboot,
    /// Enter RimBoot, authenticate and start a loader transfer (default)
    Send,
}

impl From<Command> for Task {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Info => Task::Info,
            Command::Reboot => Task::Reboot,
            Command::Send => Task::Send,
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(password) = &args.password {
        config.password = password.clone();
    }
    if let Some(path) = &args.info_path {
        config.info_path = path.clone();
    }
    if args.strict_mode_switch {
        config.strict_mode_switch = true;
    }
    Ok(config)
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

    info!("Starting usbdl (nusb backend)...");

    let config = match load_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load config: {:#}", e);
            std::process::exit(1);
        }
    };

    let transport = match NusbTransport::wait_for(
        RIM_VENDOR_ID,
        BOOTLOADER_PRODUCT_ID,
        config.poll_interval(),
        config.wait_timeout(),
    ) {
        Ok(t) => t,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let task: Task = args.command.map(Task::from).unwrap_or_default();
    let mut session = Session::new(transport, config);

    // Failures after the device is claimed are reported, not fatal.
    match run_task(&mut session, task) {
        Ok(TaskReport::Info(_)) => info!("Device info dumped"),
        Ok(TaskReport::Rebooted) => info!("Reboot requested"),
        Ok(TaskReport::Sent { auth, loader }) => {
            info!(auth = %auth, loader = ?loader, "Loader stage finished")
        }
        Err(e) => error!("{} failed: {:#}", task, e),
    }
}
