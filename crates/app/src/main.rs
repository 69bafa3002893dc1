use std::{
    path::PathBuf,
    thread,
    time::{Duration, Instant},
};

use clap::{Parser, Subcommand};
use poi_stream_core::{
    sim::{SimPeripheral, SimulatedRadio, SyntheticAudio, SyntheticMotion},
    transport::PeerAddress,
    AppConfig, EffectRegistry, MicSensitivity, Runtime,
};
use tracing_subscriber::EnvFilter;

/// How often `run` prints a status line.
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

fn main() -> poi_stream_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            effect,
            sensitivity,
            seconds,
            peripherals,
        } => run(RunOptions {
            config,
            effect,
            sensitivity,
            seconds,
            peripherals,
        }),
        Commands::Effects => {
            list_effects();
            Ok(())
        }
        Commands::Config { output } => write_default_config(output.as_ref()),
    }
}

struct RunOptions {
    config: Option<PathBuf>,
    effect: usize,
    sensitivity: Option<MicSensitivity>,
    seconds: Option<u64>,
    peripherals: u8,
}

fn run(options: RunOptions) -> poi_stream_core::Result<()> {
    if options.peripherals == 0 {
        return Err("at least one simulated peripheral is required".into());
    }
    let mut config = match &options.config {
        Some(path) => AppConfig::from_json_file(path)?,
        None => AppConfig::default(),
    };
    if let Some(sensitivity) = options.sensitivity {
        config.audio.sensitivity = sensitivity;
    }
    tracing::info!(
        config = ?options.config,
        peripherals = options.peripherals,
        effect = options.effect,
        "starting simulated session"
    );

    let (radio, events) = SimulatedRadio::with_channel(&config);
    for n in 1..=options.peripherals {
        let addr = PeerAddress([0xc4, 0x5b, 0xbe, 0x00, 0x00, n]);
        radio.add_peripheral(SimPeripheral::named(addr, &config.device.target_name));
    }

    let runtime = Runtime::start(
        &config,
        radio,
        events,
        SyntheticMotion::new(config.stream.period(), 1.5),
        SyntheticAudio::new(config.audio.sample_rate, 250.0, 0.4),
        EffectRegistry::with_defaults(),
    )?;
    runtime.state().select_effect(options.effect);

    let deadline = options.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    while deadline.map_or(true, |d| Instant::now() < d) {
        thread::sleep(STATUS_INTERVAL);
        let status = runtime.status();
        tracing::debug!(text = %status.connection_text(), "status");
        println!("{}", status.to_json()?);
    }

    runtime.shutdown()
}

fn list_effects() {
    for (index, name) in EffectRegistry::with_defaults().names().iter().enumerate() {
        println!("{index:>2}  {name}");
    }
}

fn write_default_config(output: Option<&PathBuf>) -> poi_stream_core::Result<()> {
    let json = AppConfig::default().to_json_pretty()?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!(?path, "wrote default configuration");
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams motion and audio reactive frames to two LED poi", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller against simulated peripherals and sensors.
    Run {
        /// JSON configuration file; defaults are used for anything missing.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Index of the effect to start with (see `effects`).
        #[arg(short, long, default_value_t = 0)]
        effect: usize,
        /// Microphone gain: low, medium or high.
        #[arg(short, long)]
        sensitivity: Option<MicSensitivity>,
        /// Stop after this many seconds instead of running forever.
        #[arg(long)]
        seconds: Option<u64>,
        /// Number of simulated peripherals advertising the target name.
        #[arg(short, long, default_value_t = 2)]
        peripherals: u8,
    },
    /// List the available effects with their indices.
    Effects,
    /// Print the default configuration, or write it to a file.
    Config {
        /// Where to write the configuration instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}
