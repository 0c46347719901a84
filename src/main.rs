//! # fc-link
//!
//! Talk to a flight controller over its USB serial port: poll MSP telemetry,
//! or run text CLI commands and print their output.
//!
//! ```bash
//! fc-link telemetry --count 200
//! fc-link --port /dev/ttyUSB0 cli "get gyro" diff
//! fc-link cli --settings diff
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use fc_link::cli::settings::parse_settings;
use fc_link::config::Config;
use fc_link::link::FcConnection;
use fc_link::msp::protocol::MspFrame;
use fc_link::serial::FcSerial;
use fc_link::telemetry::{decode_telemetry, TelemetryRecorder};

/// Number of poll cycles between status log messages
const LOG_INTERVAL_CYCLES: u64 = 200;

#[derive(Parser, Debug)]
#[command(name = "fc-link", version, about = "Flight controller MSP telemetry and CLI link")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "FC_LINK_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device, overrides the configured port
    #[arg(short, long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll MSP telemetry until Ctrl+C
    Telemetry {
        /// Stop after this many poll cycles
        #[arg(long)]
        count: Option<u64>,
    },
    /// Run CLI commands and print their output
    Cli {
        /// Print `set name = value` lines as JSON
        #[arg(long)]
        settings: bool,

        #[arg(required = true)]
        commands: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();
    info!("fc-link v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    let serial = open_serial(&args, &config)?;
    let mut conn = FcConnection::from_config(serial, &config);

    match args.command {
        Command::Telemetry { count } => run_telemetry(&mut conn, &config, count).await?,
        Command::Cli { settings, commands } => {
            let wait = Duration::from_millis(config.cli.capture_timeout_ms);
            let outputs = run_cli(&mut conn, &commands, wait).await?;
            print_outputs(&commands, &outputs, settings)?;
        }
    }

    let serial = conn.disconnect();
    info!("Closed {}", serial.device_path());
    Ok(())
}

/// `--port` wins, then the configured port when a config file was given,
/// then the default device list
fn open_serial(args: &Args, config: &Config) -> Result<FcSerial> {
    let baud = config.serial.baud_rate;
    let serial = match (&args.port, &args.config) {
        (Some(port), _) => FcSerial::open_with_paths(&[port.as_str()], baud)?,
        (None, Some(_)) => FcSerial::open_with_paths(&[config.serial.port.as_str()], baud)?,
        (None, None) => FcSerial::open(baud)?,
    };
    Ok(serial)
}

async fn run_telemetry(
    conn: &mut FcConnection<FcSerial>,
    config: &Config,
    count: Option<u64>,
) -> Result<()> {
    let (tx, mut frames) = mpsc::unbounded_channel::<MspFrame>();
    conn.on_frame(move |frame| {
        let _ = tx.send(frame);
    });

    let mut recorder = if config.telemetry.enabled {
        Some(TelemetryRecorder::from_config(&config.telemetry)?)
    } else {
        None
    };

    let mut poll_interval = interval(Duration::from_millis(config.msp.poll_interval_ms));
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Polling MSP commands {:?} every {}ms",
        config.msp.poll_commands, config.msp.poll_interval_ms
    );
    info!("Press Ctrl+C to exit");

    let mut cycles: u64 = 0;

    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                if count.is_some_and(|limit| cycles >= limit) {
                    info!("Completed {} poll cycles", cycles);
                    break;
                }

                if let Err(e) = conn.poll_all(&config.msp.poll_commands).await {
                    warn!("Failed to send poll: {}", e);
                    continue;
                }
                cycles += 1;

                if cycles % LOG_INTERVAL_CYCLES == 0 {
                    info!(
                        "Polled {} cycles, {} frames decoded, {} checksum errors",
                        cycles,
                        conn.decoder().frames_decoded(),
                        conn.decoder().checksum_errors()
                    );
                }
            }

            received = conn.receive() => {
                if received? == 0 {
                    warn!("Serial port closed");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }

        while let Ok(frame) = frames.try_recv() {
            match decode_telemetry(&frame) {
                Ok(Some(sample)) => {
                    debug!("{:?}", sample);
                    if let Some(recorder) = recorder.as_mut() {
                        recorder.record(&sample)?;
                    }
                }
                Ok(None) => debug!("Ignoring MSP command {}", frame.command),
                Err(e) => warn!("{}", e),
            }
        }
    }

    if let Some(recorder) = recorder.as_mut() {
        recorder.flush()?;
    }

    info!(
        "Total: {} poll cycles, {} frames decoded",
        cycles,
        conn.decoder().frames_decoded()
    );
    Ok(())
}

/// Enter the CLI, capture each command in turn, and always try to leave it
async fn run_cli(
    conn: &mut FcConnection<FcSerial>,
    commands: &[String],
    banner_wait: Duration,
) -> Result<Vec<String>> {
    conn.set_text_observer(|text| debug!(target: "fc_link::console", "{}", text.trim_end()));

    conn.enter_cli().await?;
    let outputs = capture_all(conn, commands, banner_wait).await;

    if let Err(e) = conn.exit_cli().await {
        warn!("Failed to leave CLI mode: {}", e);
    }
    outputs
}

async fn capture_all(
    conn: &mut FcConnection<FcSerial>,
    commands: &[String],
    banner_wait: Duration,
) -> Result<Vec<String>> {
    let Some((first, rest)) = commands.split_first() else {
        return Ok(Vec::new());
    };

    // The console greets with a banner ending in a prompt; the first command
    // goes out once that prompt shows up.
    let mut outputs = Vec::with_capacity(commands.len());
    outputs.push(conn.capture_at_prompt(first, true, banner_wait).await?);

    for command in rest {
        outputs.push(conn.capture(command, true).await?);
    }

    Ok(outputs)
}

fn print_outputs(commands: &[String], outputs: &[String], settings: bool) -> Result<()> {
    for (command, output) in commands.iter().zip(outputs) {
        if settings {
            let parsed = parse_settings(output);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        } else {
            println!("# {}", command);
            println!("{}", output);
        }
    }
    Ok(())
}
