//! UDP intake.
//!
//! One listener task per configured port. Reads use a one-second deadline so
//! the task observes the shutdown signal between datagrams; each datagram is
//! truncated to the frame size its header declares, optionally captured to
//! the hex sink, run through the shared processor, and the resulting frames
//! handed to the dispatcher channel. A full channel drops the frame rather
//! than stall the socket.
//!
//! Processing runs on this task with no pipeline-wide lock; the processor
//! synchronizes its own small pieces of shared state internally.

use crate::pipeline::StreamProcessor;
use crate::playback::FrameCapture;
use bytes::BytesMut;
use log::{debug, error, warn};
use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;

const RECV_DEADLINE: Duration = Duration::from_secs(1);
const RECV_BUFFER_SIZE: usize = 4096;

/// Cuts one C37.118 frame out of a received datagram.
///
/// The frame length sits in bytes 2-3; trailing bytes beyond it are
/// discarded, and a declared length larger than the datagram rejects it.
pub fn extract_frame(datagram: &[u8]) -> Option<Vec<u8>> {
    if datagram.len() < 4 {
        warn!("datagram of {} bytes is too short for a frame header", datagram.len());
        return None;
    }
    let frame_len = u16::from_be_bytes([datagram[2], datagram[3]]) as usize;
    if frame_len < 4 {
        warn!("declared frame size {} is impossible", frame_len);
        return None;
    }
    if frame_len > datagram.len() {
        warn!(
            "declared frame size {} exceeds received {} bytes",
            frame_len,
            datagram.len()
        );
        return None;
    }
    Some(datagram[..frame_len].to_vec())
}

/// Runs one UDP listener until shutdown is signalled.
pub async fn run_udp_listener(
    port: u16,
    processor: Arc<StreamProcessor>,
    out_tx: mpsc::Sender<Vec<u8>>,
    capture: Option<Arc<Mutex<FrameCapture>>>,
    mut shutdown: watch::Receiver<bool>,
) -> io::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    debug!("listening for UDP frames on port {}", port);

    let mut buf = BytesMut::zeroed(RECV_BUFFER_SIZE);

    loop {
        if *shutdown.borrow() {
            break;
        }

        let (received, _peer) = match timeout(RECV_DEADLINE, socket.recv_from(&mut buf[..])).await {
            Err(_) => continue, // deadline: re-check the shutdown signal
            Ok(Err(err)) => {
                error!("UDP read error on port {}: {}", port, err);
                break;
            }
            Ok(Ok(result)) => result,
        };

        let Some(frame) = extract_frame(&buf[..received]) else {
            continue;
        };

        if let Some(capture) = &capture {
            match capture.lock() {
                Ok(mut capture) => {
                    if let Err(err) = capture.record(&frame) {
                        warn!("capture write failed: {}", err);
                    }
                }
                Err(err) => error!("capture sink poisoned: {}", err),
            }
        }

        for output in processor.process(&frame) {
            if out_tx.try_send(output).is_err() {
                warn!("output channel full, frame dropped");
            }
        }
    }

    debug!("UDP listener on port {} finished", port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_frame_truncates_to_declared_size() {
        let mut datagram = vec![0xAA, 0x02, 0x00, 0x06, 0x12, 0x34];
        datagram.extend_from_slice(&[0xFF; 10]); // socket buffer slack

        let frame = extract_frame(&datagram).unwrap();
        assert_eq!(frame, vec![0xAA, 0x02, 0x00, 0x06, 0x12, 0x34]);
    }

    #[test]
    fn test_extract_frame_rejects_bad_lengths() {
        assert!(extract_frame(&[0xAA, 0x02]).is_none());
        assert!(extract_frame(&[0xAA, 0x02, 0x00, 0x02]).is_none()); // size < 4
        assert!(extract_frame(&[0xAA, 0x02, 0x00, 0x20, 0x00]).is_none()); // size > datagram
    }
}
