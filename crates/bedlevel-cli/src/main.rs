//! `bedlevel`: bed-leveling mesh transfer and machine control over a serial link.

use std::path::{Path, PathBuf};

use bedlevel_cli::{connect, CliError, CliResult, Config, Machine, SerialTransport, Target};
use bedlevel_mesh::{render_csv, MeshGrid};
use bedlevel_protocol::{AckFramer, Axes, ReplyMode};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "bedlevel",
    about = "Download, upload and apply bed-leveling meshes on a serial-attached printer",
    version
)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial device, overrides the configuration.
    #[arg(long, global = true)]
    port: Option<String>,

    /// Baud rate, overrides the configuration.
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Log filter used when RUST_LOG is not set (error, warn, info, debug, trace).
    #[arg(long = "log-level", global = true, default_value = "info")]
    log_level: String,

    /// Do not restart the controller after opening the port.
    #[arg(long, global = true)]
    no_reset: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for the controller's startup banner.
    WaitBanner,

    /// Send one command line and print the reply.
    Send {
        line: String,

        /// Print every reply line, not just the acknowledgment.
        #[arg(long)]
        retain: bool,
    },

    /// Home X and Y, then Z.
    Home,

    /// Move to an absolute position.
    Move {
        #[arg(long, short)]
        x: Option<f32>,
        #[arg(long, short)]
        y: Option<f32>,
        #[arg(long, short)]
        z: Option<f32>,
        /// Feed rate in mm/min.
        #[arg(long, short)]
        feed: Option<f32>,
    },

    /// Mesh transfer.
    #[command(subcommand)]
    Mesh(MeshCommand),
}

#[derive(Subcommand, Debug)]
enum MeshCommand {
    /// Read the mesh from the controller and print it as CSV.
    Download {
        /// Load this storage slot before reading.
        #[arg(long)]
        slot: Option<u32>,

        /// Also save the mesh as JSON.
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Send a JSON mesh to the controller.
    Upload {
        file: PathBuf,

        /// Persist the mesh to this storage slot.
        #[arg(long)]
        slot: Option<u32>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    if let Err(err) = run(cli) {
        error!(error = %err, "command failed");
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> CliResult<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    let reset = config.serial.reset_on_open && !cli.no_reset;
    debug!(?config, reset, "configuration loaded");

    match cli.command {
        Command::WaitBanner => {
            let mut transport = SerialTransport::open(&config.serial)?;
            if reset {
                transport.pulse_reset()?;
            }
            let framer = AckFramer::with_config(transport, config.framer_config()?);
            let mut machine = Machine::new(framer, config.machine.clone());
            let reply = machine.wait_for_banner(config.protocol.banner_timeout()?)?;
            println!("{}", reply.sentinel_line());
        }
        Command::Send { line, retain } => {
            let mut machine = connect(&config, reset)?;
            let mode = if retain {
                ReplyMode::RetainAll
            } else {
                ReplyMode::DiscardNoise
            };
            let reply = machine.send_line(&line, mode)?;
            print!("{}", reply.payload());
        }
        Command::Home => {
            let mut machine = connect(&config, reset)?;
            machine.home(Axes::XY)?;
            machine.home(Axes::Z)?;
            machine.finish()?;
        }
        Command::Move { x, y, z, feed } => {
            let mut machine = connect(&config, reset)?;
            let target = Target {
                x,
                y,
                z,
                feedrate: feed,
            };
            if machine.move_to(target)? {
                machine.finish()?;
            }
        }
        Command::Mesh(MeshCommand::Download { slot, output }) => {
            let mut grid = config.mesh.empty_grid()?;
            let mut machine = connect(&config, reset)?;
            machine.download_mesh(slot.or(config.mesh.slot), &mut grid)?;
            print!("{}", render_csv(&grid));
            if let Some(path) = output {
                save_mesh(&path, &grid)?;
            }
        }
        Command::Mesh(MeshCommand::Upload { file, slot }) => {
            let grid = load_mesh(&file)?;
            grid.ensure_shape(config.mesh.rows, config.mesh.cols)?;
            let mut machine = connect(&config, reset)?;
            machine.upload_mesh(&grid, slot.or(config.mesh.slot))?;
            machine.finish()?;
        }
    }
    Ok(())
}

fn load_mesh(path: &Path) -> CliResult<MeshGrid> {
    let text = std::fs::read_to_string(path).map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| CliError::MeshFile {
        path: path.to_path_buf(),
        source,
    })
}

fn save_mesh(path: &Path, grid: &MeshGrid) -> CliResult<()> {
    let json = serde_json::to_string_pretty(grid).map_err(|source| CliError::MeshFile {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, json).map_err(|source| CliError::File {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "saved mesh");
    Ok(())
}
