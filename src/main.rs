use clap::{Parser, ValueEnum};
use frame_reductor::dispatcher::{
    check_tcp_connection, parse_output_port, run_dispatcher, OutputProtocol, OutputTarget, TcpMode,
};
use frame_reductor::listener::run_udp_listener;
use frame_reductor::pipeline::StreamProcessor;
use frame_reductor::playback::{read_hex_frames, FrameCapture};
use frame_reductor::reducer::{is_valid_output_rate, VALID_OUTPUT_RATES};
use log::{info, warn};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const OUTPUT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Live UDP intake.
    Listen,
    /// Hex-dump file playback.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum TcpModeArg {
    Client,
    Server,
}

impl From<TcpModeArg> for TcpMode {
    fn from(mode: TcpModeArg) -> Self {
        match mode {
            TcpModeArg::Client => TcpMode::Client,
            TcpModeArg::Server => TcpMode::Server,
        }
    }
}

/// IEEE C37.118 stream reductor: aggregates multi-PMU configurations,
/// reduces the frame rate, and forwards the positive-sequence voltage
/// phasor over UDP or TCP.
#[derive(Debug, Parser)]
#[command(name = "frame-reductor", version)]
struct Cli {
    /// Mode of operation.
    #[arg(long, value_enum, default_value_t = Mode::Listen)]
    mode: Mode,

    /// Comma-separated list of UDP ports to listen on, e.g. 4716,4720,5002.
    #[arg(long, default_value = "4716")]
    ports: String,

    /// Listening duration in seconds; 0 listens forever.
    #[arg(long, default_value_t = 0)]
    time: u64,

    /// Target output frame rate (frames per second).
    #[arg(long, default_value_t = 10)]
    frames: u16,

    /// Output protocol and port, e.g. UDP:7420 or TCP:7421.
    #[arg(long)]
    output_port: Option<String>,

    /// Direction of the TCP transport when the output is TCP.
    #[arg(long, value_enum, default_value_t = TcpModeArg::Client)]
    tcp_mode: TcpModeArg,

    /// Target host for the TCP client and UDP output.
    #[arg(long, default_value = "localhost")]
    target_host: String,

    /// Local IP address to establish the outbound TCP connection from.
    #[arg(long)]
    bind: Option<IpAddr>,

    /// Hex-dump file to play back in file mode.
    #[arg(long)]
    input_file: Option<PathBuf>,

    /// Capture sink: received frames are written here as hex lines.
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Number of distinct PMUs whose configurations form one aggregate.
    #[arg(long, default_value_t = 3)]
    expected_pmus: usize,

    /// Synthetic IDCODE stamped on aggregated configuration frames.
    #[arg(long, default_value_t = 999)]
    aggregate_id: u16,

    /// List local interface addresses and exit.
    #[arg(long)]
    show_interfaces: bool,

    /// Probe the TCP target and exit.
    #[arg(long)]
    check_tcp_connection: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    if cli.show_interfaces {
        return show_interfaces();
    }

    if !is_valid_output_rate(cli.frames) {
        eprintln!(
            "invalid value {} for --frames, allowed values: {:?}",
            cli.frames, VALID_OUTPUT_RATES
        );
        return ExitCode::from(2);
    }
    if cli.expected_pmus == 0 {
        eprintln!("--expected-pmus must be at least 1");
        return ExitCode::from(2);
    }

    let ports = match parse_ports(&cli.ports) {
        Ok(ports) => ports,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    let output = match build_output_target(&cli) {
        Ok(output) => output,
        Err(message) => {
            eprintln!("{}", message);
            return ExitCode::from(2);
        }
    };

    if cli.check_tcp_connection {
        let Some(target) = output
            .as_ref()
            .filter(|target| target.protocol == OutputProtocol::Tcp)
        else {
            eprintln!("--check-tcp-connection requires a TCP --output-port");
            return ExitCode::from(2);
        };
        return match check_tcp_connection(target).await {
            Ok(local_addr) => {
                println!(
                    "TCP connection to {}:{} established from {}",
                    target.target_host, target.port, local_addr
                );
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!(
                    "TCP connection to {}:{} cannot be established: {}",
                    target.target_host, target.port, err
                );
                ExitCode::FAILURE
            }
        };
    }

    let processor = Arc::new(StreamProcessor::new(
        cli.frames,
        cli.expected_pmus,
        cli.aggregate_id,
    ));
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(OUTPUT_CHANNEL_CAPACITY);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut dispatcher = match output {
        Some(target) => {
            info!(
                "output: {:?} port {} ({:?})",
                target.protocol, target.port, target.tcp_mode
            );
            tokio::spawn(run_dispatcher(target, out_rx, shutdown_rx))
        }
        None => tokio::spawn(drain_frames(out_rx)),
    };

    let status = match cli.mode {
        Mode::File => run_file_mode(&cli, processor, out_tx).await,
        Mode::Listen => run_listen_mode(&cli, ports, processor, out_tx).await,
    };

    // Let the dispatcher drain the closed channel, then force shutdown.
    if timeout(Duration::from_secs(10), &mut dispatcher).await.is_err() {
        let _ = shutdown_tx.send(true);
        let _ = dispatcher.await;
    }

    status
}

async fn run_file_mode(
    cli: &Cli,
    processor: Arc<StreamProcessor>,
    out_tx: mpsc::Sender<Vec<u8>>,
) -> ExitCode {
    let Some(path) = cli.input_file.as_ref() else {
        eprintln!("file mode requires --input-file");
        return ExitCode::from(2);
    };

    let frames = match read_hex_frames(path) {
        Ok(frames) => frames,
        Err(err) => {
            eprintln!("cannot read {}: {}", path.display(), err);
            return ExitCode::FAILURE;
        }
    };
    info!("replaying {} frames from {}", frames.len(), path.display());

    let mut forwarded = 0usize;
    for frame in frames {
        for output in processor.process(&frame) {
            if out_tx.send(output).await.is_err() {
                warn!("output channel closed, playback stops");
                return ExitCode::SUCCESS;
            }
            forwarded += 1;
        }
    }
    info!("playback finished, {} frames forwarded", forwarded);
    ExitCode::SUCCESS
}

async fn run_listen_mode(
    cli: &Cli,
    ports: Vec<u16>,
    processor: Arc<StreamProcessor>,
    out_tx: mpsc::Sender<Vec<u8>>,
) -> ExitCode {
    let capture = match cli.output_file.as_ref() {
        None => None,
        Some(path) => match FrameCapture::create(path) {
            Ok(capture) => Some(Arc::new(Mutex::new(capture))),
            Err(err) => {
                eprintln!("cannot create capture file {}: {}", path.display(), err);
                return ExitCode::FAILURE;
            }
        },
    };

    // The listeners get their own shutdown channel so the dispatcher can
    // keep draining after they stop.
    let (listener_shutdown_tx, listener_shutdown_rx) = watch::channel(false);

    let mut listeners = Vec::with_capacity(ports.len());
    for port in &ports {
        listeners.push(tokio::spawn(run_udp_listener(
            *port,
            processor.clone(),
            out_tx.clone(),
            capture.clone(),
            listener_shutdown_rx.clone(),
        )));
    }
    info!("listening on UDP ports {:?}", ports);

    if cli.time > 0 {
        info!("listening for {} seconds", cli.time);
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.time)) => {
                info!("listening period elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
            }
        }
    } else {
        info!("listening until interrupted");
        let _ = tokio::signal::ctrl_c().await;
        info!("interrupted");
    }

    let _ = listener_shutdown_tx.send(true);
    for listener in listeners {
        match listener.await {
            Ok(Ok(())) => (),
            Ok(Err(err)) => warn!("listener failed: {}", err),
            Err(err) => warn!("listener task panicked: {}", err),
        }
    }

    ExitCode::SUCCESS
}

/// Frames with no configured output transport are counted and discarded.
async fn drain_frames(mut rx: mpsc::Receiver<Vec<u8>>) {
    let mut dropped = 0u64;
    while rx.recv().await.is_some() {
        if dropped == 0 {
            warn!("no output transport configured, frames are discarded");
        }
        dropped += 1;
    }
    if dropped > 0 {
        info!("{} frames discarded without an output transport", dropped);
    }
}

fn parse_ports(spec: &str) -> Result<Vec<u16>, String> {
    let mut ports = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        let port: u16 = part
            .parse()
            .map_err(|_| format!("invalid port '{}', must be 1-65535", part))?;
        if port == 0 {
            return Err("invalid port 0, must be 1-65535".to_string());
        }
        ports.push(port);
    }
    Ok(ports)
}

fn build_output_target(cli: &Cli) -> Result<Option<OutputTarget>, String> {
    let Some(spec) = cli.output_port.as_ref() else {
        return Ok(None);
    };
    let (protocol, port) = parse_output_port(spec)?;
    Ok(Some(OutputTarget {
        protocol,
        port,
        tcp_mode: cli.tcp_mode.into(),
        target_host: cli.target_host.clone(),
        bind_ip: cli.bind,
    }))
}

fn show_interfaces() -> ExitCode {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            println!("Available interfaces:");
            for interface in interfaces {
                println!("  {}: {}", interface.name, interface.ip());
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("cannot list interfaces: {}", err);
            ExitCode::FAILURE
        }
    }
}
