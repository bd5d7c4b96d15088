//! Outbound frame dispatch.
//!
//! Routes re-serialized frames to the transport the operator selected:
//!
//! - **UDP**: one datagram per frame to the configured endpoint; send
//!   errors are logged and the frame dropped.
//! - **TCP server**: accepted clients each receive every outbound frame on
//!   their own task; ten seconds without a frame disconnects the client.
//! - **TCP client**: one connection to the configured host, dialled with a
//!   five-second timeout (optionally bound to a local source address) and
//!   re-dialled three seconds after any failure.
//!
//! Within a single connection frames are delivered in emission order; there
//! is no cross-connection ordering guarantee.

use log::{debug, info, warn};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{lookup_host, TcpListener, TcpSocket, TcpStream, UdpSocket};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{sleep, timeout};

pub const TCP_IDLE_TIMEOUT: Duration = Duration::from_secs(10);
pub const TCP_DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const TCP_RECONNECT_DELAY: Duration = Duration::from_secs(3);

const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputProtocol {
    Udp,
    Tcp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpMode {
    Client,
    Server,
}

impl FromStr for TcpMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(TcpMode::Client),
            "server" => Ok(TcpMode::Server),
            other => Err(format!("invalid TCP mode '{}', use client or server", other)),
        }
    }
}

/// Parses the `--output-port` value, e.g. `UDP:7420` or `TCP:7421`.
pub fn parse_output_port(s: &str) -> Result<(OutputProtocol, u16), String> {
    let (proto, port) = s
        .split_once(':')
        .ok_or_else(|| format!("invalid output port '{}', use [TCP|UDP]:<port>", s))?;
    let protocol = match proto.to_ascii_uppercase().as_str() {
        "TCP" => OutputProtocol::Tcp,
        "UDP" => OutputProtocol::Udp,
        other => return Err(format!("invalid protocol '{}', use TCP or UDP", other)),
    };
    let port: u16 = port
        .parse()
        .map_err(|_| format!("invalid port '{}', must be 1-65535", port))?;
    if port == 0 {
        return Err("invalid port 0, must be 1-65535".to_string());
    }
    Ok((protocol, port))
}

/// Fully resolved output selection.
#[derive(Debug, Clone)]
pub struct OutputTarget {
    pub protocol: OutputProtocol,
    pub port: u16,
    pub tcp_mode: TcpMode,
    pub target_host: String,
    pub bind_ip: Option<IpAddr>,
}

impl OutputTarget {
    fn endpoint(&self) -> String {
        format!("{}:{}", self.target_host, self.port)
    }
}

/// Runs the selected transport until the input channel closes or shutdown
/// is signalled.
pub async fn run_dispatcher(
    target: OutputTarget,
    rx: mpsc::Receiver<Vec<u8>>,
    shutdown: watch::Receiver<bool>,
) {
    match (target.protocol, target.tcp_mode) {
        (OutputProtocol::Udp, _) => run_udp_sender(target, rx, shutdown).await,
        (OutputProtocol::Tcp, TcpMode::Server) => run_tcp_server(target, rx, shutdown).await,
        (OutputProtocol::Tcp, TcpMode::Client) => run_tcp_client(target, rx, shutdown).await,
    }
}

async fn run_udp_sender(
    target: OutputTarget,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let socket = match UdpSocket::bind("0.0.0.0:0").await {
        Ok(socket) => socket,
        Err(err) => {
            warn!("cannot open UDP send socket: {}", err);
            return;
        }
    };
    let endpoint = target.endpoint();
    info!("forwarding frames over UDP to {}", endpoint);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                match socket.send_to(&frame, endpoint.as_str()).await {
                    Ok(sent) => debug!("sent {} bytes to {}", sent, endpoint),
                    Err(err) => warn!("UDP send to {} failed, frame dropped: {}", endpoint, err),
                }
            }
        }
    }
    debug!("UDP sender finished");
}

async fn run_tcp_server(
    target: OutputTarget,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let listener = match TcpListener::bind(("0.0.0.0", target.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!("cannot listen on TCP port {}: {}", target.port, err);
            return;
        }
    };
    info!("TCP server waiting for clients on port {}", target.port);

    let (fanout_tx, _) = broadcast::channel::<Vec<u8>>(BROADCAST_CAPACITY);

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            frame = rx.recv() => {
                match frame {
                    // No subscribers is normal between client connections.
                    Some(frame) => { let _ = fanout_tx.send(frame); }
                    None => break,
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        info!("client connected: {}", peer);
                        tokio::spawn(serve_tcp_client(
                            stream,
                            peer,
                            fanout_tx.subscribe(),
                            shutdown.clone(),
                        ));
                    }
                    Err(err) => warn!("accept failed: {}", err),
                }
            }
        }
    }
    debug!("TCP server finished");
}

async fn serve_tcp_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    mut frames: broadcast::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            received = timeout(TCP_IDLE_TIMEOUT, frames.recv()) => {
                match received {
                    Err(_) => {
                        info!("no frames for 10 s, disconnecting {}", peer);
                        break;
                    }
                    Ok(Err(broadcast::error::RecvError::Closed)) => break,
                    Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                        warn!("client {} lagged, {} frames skipped", peer, skipped);
                    }
                    Ok(Ok(frame)) => {
                        if let Err(err) = stream.write_all(&frame).await {
                            warn!("send to {} failed, disconnecting: {}", peer, err);
                            break;
                        }
                        debug!("sent {} bytes to {}", frame.len(), peer);
                    }
                }
            }
        }
    }
}

async fn run_tcp_client(
    target: OutputTarget,
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    let endpoint = target.endpoint();

    loop {
        if *shutdown.borrow() {
            break;
        }

        let stream = match dial(&target).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(
                    "cannot connect to {}, retrying in {} s: {}",
                    endpoint,
                    TCP_RECONNECT_DELAY.as_secs(),
                    err
                );
                if wait_reconnect(&mut shutdown).await {
                    break;
                }
                continue;
            }
        };
        info!("connected to {}", endpoint);

        let channel_open = forward_frames(stream, &mut rx, &mut shutdown).await;
        if !channel_open || *shutdown.borrow() {
            break;
        }

        info!("connection to {} ended, reconnecting in {} s", endpoint, TCP_RECONNECT_DELAY.as_secs());
        if wait_reconnect(&mut shutdown).await {
            break;
        }
    }
    debug!("TCP client finished");
}

/// Sleeps out the reconnect delay; returns `true` if shutdown arrived.
async fn wait_reconnect(shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = sleep(TCP_RECONNECT_DELAY) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

/// Forwards frames over one connection until it fails, goes idle, or the
/// channel closes. Returns `false` when the channel is closed for good.
async fn forward_frames(
    mut stream: TcpStream,
    rx: &mut mpsc::Receiver<Vec<u8>>,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    return true;
                }
            }
            received = timeout(TCP_IDLE_TIMEOUT, rx.recv()) => {
                match received {
                    Err(_) => {
                        info!("no frames for 10 s, closing the connection");
                        return true;
                    }
                    Ok(None) => return false,
                    Ok(Some(frame)) => {
                        if let Err(err) = stream.write_all(&frame).await {
                            warn!("send failed: {}", err);
                            return true;
                        }
                        debug!("sent {} bytes", frame.len());
                    }
                }
            }
        }
    }
}

/// Dials the configured endpoint with the 5 s timeout, optionally binding
/// the local source address first.
async fn dial(target: &OutputTarget) -> io::Result<TcpStream> {
    let endpoint = target.endpoint();
    let connect = async {
        match target.bind_ip {
            None => TcpStream::connect(endpoint.as_str()).await,
            Some(local_ip) => {
                let remote = lookup_host(endpoint.as_str())
                    .await?
                    .find(|addr| addr.is_ipv4() == local_ip.is_ipv4())
                    .ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::AddrNotAvailable,
                            "no remote address matching the bound address family",
                        )
                    })?;
                let socket = match local_ip {
                    IpAddr::V4(_) => TcpSocket::new_v4()?,
                    IpAddr::V6(_) => TcpSocket::new_v6()?,
                };
                socket.bind(SocketAddr::new(local_ip, 0))?;
                socket.connect(remote).await
            }
        }
    };

    match timeout(TCP_DIAL_TIMEOUT, connect).await {
        Ok(result) => result,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {} timed out", target.endpoint()),
        )),
    }
}

/// `--check-tcp-connection` probe: dials once and reports the local address
/// the connection was made from.
pub async fn check_tcp_connection(target: &OutputTarget) -> io::Result<SocketAddr> {
    let stream = dial(target).await?;
    stream.local_addr()
}
