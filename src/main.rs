// src/main.rs - Command-line front-end for a NexStar mount
use chrono::Utc;
use clap::{Parser, Subcommand};
use nexstar_rs::communication::SerialTransport;
use nexstar_rs::{
    load_config, local_sidereal_time, Axis, CancelPolicy, Config, Direction, EquatorialCoordinate,
    GeographicLocation, Mount, MonitorOutcome, Rate, SimulatedMount, TrackingMode,
};
use std::path::PathBuf;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Parser, Debug)]
#[command(name = "nexstar", about = "Control a NexStar-protocol telescope mount over a serial link.")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate (overrides the config file)
    #[arg(long)]
    baud: Option<u32>,

    /// Talk to a built-in simulated mount instead of a serial port
    #[arg(long)]
    simulate: bool,

    /// Log wire traffic
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Hand controller firmware version
    Version,
    /// Mount model
    Model,
    /// Check that the hand controller answers
    Ping,
    /// Current pointing
    Position {
        /// Report azimuth/altitude instead of RA/Dec
        #[arg(long)]
        altaz: bool,
    },
    /// Slew to RA (hours) and Dec (degrees)
    #[command(allow_negative_numbers = true)]
    Goto {
        ra: f64,
        dec: f64,
        /// Follow the slew until it completes; Ctrl-C aborts it
        #[arg(long)]
        wait: bool,
    },
    /// Fixed-rate move; runs until Ctrl-C unless --seconds is given
    Move {
        direction: Direction,
        #[arg(short, long)]
        rate: Option<u8>,
        #[arg(short, long)]
        seconds: Option<f64>,
    },
    /// One short pulse
    Step {
        direction: Direction,
        #[arg(short, long)]
        rate: Option<u8>,
    },
    /// Stop fixed-rate motion
    Stop {
        #[arg(default_value = "both")]
        axis: Axis,
    },
    /// Abort a goto in progress
    CancelGoto,
    /// Show or set the tracking mode
    Tracking { mode: Option<TrackingMode> },
    /// Show or set the site location
    #[command(allow_negative_numbers = true)]
    Location {
        #[arg(long, requires = "longitude")]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude")]
        longitude: Option<f64>,
    },
    /// Whether a goto is in progress
    Slewing,
    /// List serial ports
    Ports,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Ports = cli.command {
        print_ports();
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => load_config(&path.to_string_lossy())?,
        None => Config::default(),
    };
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(baud) = cli.baud {
        config.serial.baud = baud;
    }

    let mount = Mount::new(config);
    if cli.simulate {
        mount.connect_with(Box::new(SimulatedMount::new())).await?;
    } else {
        mount.connect_configured().await?;
    }

    let result = run(&mount, cli.command).await;
    mount.disconnect().await?;
    result
}

async fn run(mount: &Mount, command: Commands) -> Result<(), BoxError> {
    match command {
        Commands::Version => println!("{}", mount.get_version().await?),
        Commands::Model => {
            let model = mount.get_model().await?;
            println!("{} ({})", model.name(), model.0);
        }
        Commands::Ping => {
            mount.ping().await?;
            println!("ok");
        }
        Commands::Position { altaz: false } => println!("{}", mount.get_position_ra_dec().await?),
        Commands::Position { altaz: true } => println!("{}", mount.get_position_alt_az().await?),
        Commands::Goto { ra, dec, wait } => {
            let target = EquatorialCoordinate::new(ra, dec)?;
            if wait {
                follow_goto(mount, &target).await?;
            } else {
                mount.goto(&target).await?;
                println!("Slewing to {}", target);
            }
        }
        Commands::Move { direction, rate, seconds } => {
            let rate = rate.map(Rate::new);
            match seconds {
                Some(seconds) => {
                    mount.move_for_time(direction, seconds, rate).await?;
                }
                None => {
                    mount.move_fixed(direction, rate).await?;
                    println!("Moving {}; Ctrl-C to stop", direction);
                    tokio::signal::ctrl_c().await?;
                    mount.stop_motion(direction.motor().into()).await?;
                }
            }
        }
        Commands::Step { direction, rate } => {
            mount.move_step(direction, rate.map(Rate::new)).await?;
        }
        Commands::Stop { axis } => {
            mount.stop_motion(axis).await?;
        }
        Commands::CancelGoto => mount.cancel_goto().await?,
        Commands::Tracking { mode: Some(mode) } => {
            mount.set_tracking_mode(mode).await?;
            println!("Tracking {}", mode);
        }
        Commands::Tracking { mode: None } => println!("Tracking {}", mount.get_tracking_mode().await?),
        Commands::Location { latitude: Some(latitude), longitude: Some(longitude) } => {
            let location = GeographicLocation::new(latitude, longitude)?;
            mount.set_location(&location).await?;
            println!("{}", location);
        }
        Commands::Location { .. } => {
            let location = mount.get_location().await?;
            println!("{}", location);
            println!("LST {:.4}h", local_sidereal_time(&location, &Utc::now()));
        }
        Commands::Slewing => println!("{}", mount.is_slewing().await?),
        Commands::Ports => print_ports(),
    }
    Ok(())
}

fn print_ports() {
    for port in SerialTransport::available_ports() {
        println!("{}", port);
    }
}

async fn follow_goto(mount: &Mount, target: &EquatorialCoordinate) -> Result<(), BoxError> {
    let mut monitor = mount.monitor_goto(target, CancelPolicy::AbortGoto).await?;
    loop {
        let sample = tokio::select! {
            sample = monitor.changed() => sample,
            _ = tokio::signal::ctrl_c() => {
                monitor.cancel();
                break;
            }
        };
        let Some(sample) = sample else { break };
        println!("{}  {:5.1}%", sample.position, sample.progress.unwrap_or_default());
    }
    match monitor.join().await? {
        MonitorOutcome::Completed => println!("Arrived at {}", target),
        MonitorOutcome::Cancelled => println!("Goto aborted"),
    }
    Ok(())
}
