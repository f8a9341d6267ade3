//! Deckview Player
//!
//! Headless live camera player for the dv-stream decode engine. Connects to
//! an RTSP (or any FFmpeg-readable) source, decodes it and reports state
//! changes and throughput. Useful for checking a camera link without the
//! dashboard.

mod commands;
mod presets;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use crossbeam::channel::{after, never, select, tick, Receiver};
use dv_stream::{
    CameraSwitcher, EngineConfig, EngineEvent, EngineState, FfmpegBackend, PackedFormat,
    RtspTransport, StreamEngine,
};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use commands::Command;

/// Deckview Player - headless live stream decoder
#[derive(Parser, Debug)]
#[command(name = "deckview-player")]
#[command(about = "Decode a live camera stream and report its health")]
#[command(version)]
struct Args {
    /// Stream URL (rtsp://, http://, file path, ...)
    url: Option<String>,

    /// Play a built-in camera preset instead of a URL
    #[arg(long, conflicts_with = "url")]
    preset: Option<String>,

    /// List the built-in presets and exit
    #[arg(long)]
    list_presets: bool,

    /// JSON engine configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// RTSP transport (tcp, udp)
    #[arg(long)]
    transport: Option<String>,

    /// Connect/read timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Decoder threads
    #[arg(long)]
    threads: Option<usize>,

    /// Output pixel format (bgra, rgba, rgb24)
    #[arg(long)]
    format: Option<String>,

    /// Give up after this many milliseconds without a readable packet
    #[arg(long)]
    stall_limit_ms: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    duration_secs: Option<u64>,

    /// Accept commands on stdin (pause, resume, stop, play, preset, stats, quit)
    #[arg(short, long)]
    interactive: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Let FFmpeg log at its own default level
    #[arg(long)]
    ffmpeg_verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_presets {
        for (name, url) in presets::PRESETS {
            println!("{name:8} {url}");
        }
        return Ok(());
    }

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();

    // Initialize FFmpeg
    let backend = match FfmpegBackend::new() {
        Ok(backend) => backend,
        Err(e) => {
            error!("Failed to initialize FFmpeg: {}", e);
            return Err(anyhow!("FFmpeg initialization failed: {}", e));
        }
    };
    if !args.ffmpeg_verbose {
        ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
    }

    let config = build_config(&args)?;
    let url = resolve_url(&args)?;

    let (engine, outputs) = StreamEngine::new(backend, config).context("invalid engine configuration")?;
    let mut switcher = CameraSwitcher::new(engine);

    print_banner(&url, switcher.engine().config(), args.interactive);

    let commands = if args.interactive {
        commands::spawn_stdin_reader().context("failed to start stdin reader")?
    } else {
        never()
    };
    let deadline = match args.duration_secs {
        Some(secs) => after(Duration::from_secs(secs)),
        None => never(),
    };

    if let Err(e) = switcher.play(&url) {
        if !args.interactive {
            return Err(e).with_context(|| format!("could not open {url}"));
        }
        warn!("{e}");
    }

    run(&mut switcher, &outputs.frames, &outputs.events, &commands, &deadline, args.interactive)
}

/// Pump frames and events until the stream ends, the deadline passes or the
/// user quits.
fn run(
    switcher: &mut CameraSwitcher,
    frames: &Receiver<dv_stream::Frame>,
    events: &Receiver<EngineEvent>,
    commands: &Receiver<Command>,
    deadline: &Receiver<Instant>,
    interactive: bool,
) -> Result<()> {
    let ticker = tick(Duration::from_secs(1));
    let mut window_frames = 0u64;
    let mut last_dropped = 0u64;
    let mut last_frame: Option<(u32, u32)> = None;
    let mut failure: Option<String> = None;

    loop {
        select! {
            recv(frames) -> frame => {
                if let Ok(frame) = frame {
                    window_frames += 1;
                    let size = (frame.width(), frame.height());
                    if last_frame != Some(size) {
                        info!(width = size.0, height = size.1, format = frame.format().name(), "first frame");
                        last_frame = Some(size);
                    }
                }
            }
            recv(events) -> event => {
                let Ok(event) = event else { break };
                match event {
                    EngineEvent::StateChanged(state) => {
                        info!(state = state.label(), "state changed");
                        if state == EngineState::Stopped {
                            last_frame = None;
                            if !interactive {
                                break;
                            }
                        }
                    }
                    EngineEvent::Error(message) => {
                        error!("{message}");
                        if !interactive {
                            failure = Some(message);
                            break;
                        }
                    }
                }
            }
            recv(ticker) -> _ => {
                let stats = switcher.engine().stats();
                if switcher.engine().state() == EngineState::Playing || window_frames > 0 {
                    info!(
                        fps = window_frames,
                        dropped = stats.frames_dropped.saturating_sub(last_dropped),
                        decode_errors = stats.decode_errors,
                        "throughput"
                    );
                }
                last_dropped = stats.frames_dropped;
                window_frames = 0;
            }
            recv(commands) -> command => {
                let Ok(command) = command else {
                    info!("stdin closed, quitting");
                    break;
                };
                if !handle_command(switcher, command) {
                    break;
                }
            }
            recv(deadline) -> _ => {
                info!("duration reached");
                break;
            }
        }
    }

    switcher.engine().close();
    let stats = switcher.engine().stats();
    info!(
        delivered = %format!("{:.1}%", stats.delivery_ratio() * 100.0),
        "session summary"
    );
    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("failed to encode stats")?
    );

    match failure {
        Some(message) => bail!(message),
        None => Ok(()),
    }
}

/// Apply one interactive command. Returns `false` to quit.
fn handle_command(switcher: &mut CameraSwitcher, command: Command) -> bool {
    match command {
        Command::Pause => switcher.engine().pause(),
        Command::Resume => switcher.engine().resume(),
        Command::Stop => switcher.stop(),
        Command::Play(url) => play(switcher, &url),
        Command::Preset(name) => match presets::lookup(&name) {
            Some(url) => play(switcher, url),
            None => warn!(preset = %name, known = ?presets::names(), "unknown preset"),
        },
        Command::Stats => {
            let url = switcher.current_url().unwrap_or("-").to_string();
            let engine = switcher.engine();
            let stats = engine.stats();
            info!(
                state = engine.state().label(),
                url = %url,
                width = engine.width(),
                height = engine.height(),
                delivery_ratio = stats.delivery_ratio(),
                stats = ?stats,
                "status"
            );
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => return false,
    }
    true
}

fn play(switcher: &mut CameraSwitcher, url: &str) {
    match switcher.play(url) {
        Ok(outcome) => info!(url, ?outcome, "play"),
        Err(e) => error!("{e}"),
    }
}

fn build_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str::<EngineConfig>(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => EngineConfig::default(),
    };

    if let Some(transport) = &args.transport {
        config.transport = parse_name::<RtspTransport>(transport, "transport")?;
    }
    if let Some(format) = &args.format {
        config.output_format = parse_name::<PackedFormat>(format, "format")?;
    }
    if let Some(ms) = args.timeout_ms {
        config.connect_timeout_ms = ms;
    }
    if let Some(threads) = args.threads {
        config.decoder_threads = threads;
    }
    if let Some(ms) = args.stall_limit_ms {
        config.read_stall_limit_ms = Some(ms);
    }

    config.validate().context("invalid engine configuration")?;
    Ok(config)
}

/// Parse a lowercase enum name the same way the config file does.
fn parse_name<T: serde::de::DeserializeOwned>(value: &str, what: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_lowercase()))
        .map_err(|_| anyhow!("unknown {what} '{value}'"))
}

fn resolve_url(args: &Args) -> Result<String> {
    if let Some(name) = &args.preset {
        return presets::lookup(name).map(str::to_string).ok_or_else(|| {
            anyhow!(
                "unknown preset '{}' (known: {})",
                name,
                presets::names().join(", ")
            )
        });
    }
    match args.url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => Ok(url.to_string()),
        Some(_) => bail!("stream URL is empty"),
        None => bail!("no stream URL given (pass a URL or --preset, see --list-presets)"),
    }
}

fn print_banner(url: &str, config: &EngineConfig, interactive: bool) {
    println!();
    println!("========================================================");
    println!("  Deckview Player v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================================");
    println!("  Source:    {}", url);
    println!("  Transport: {}", config.transport.as_str());
    println!("  Timeout:   {} ms", config.connect_timeout_ms);
    println!("  Decoder:   {} threads", config.decoder_threads);
    println!("  Output:    {}", config.output_format.name());
    println!(
        "  Stall:     {}",
        config
            .read_stall_limit_ms
            .map(|ms| format!("give up after {ms} ms"))
            .unwrap_or_else(|| "retry forever".to_string())
    );
    if interactive {
        println!("  {}", commands::HELP);
    }
    println!("========================================================");
    println!();
}
