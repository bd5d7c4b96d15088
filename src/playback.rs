//! Hex-dump playback and capture.
//!
//! Offline intake and the capture sink share one format: one frame per
//! line, lowercase hex, no separators. Captured files replay byte-exactly
//! through `--mode file`.

use log::warn;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Encodes a frame as a lowercase hex line (no separators, no newline).
pub fn encode_hex(frame: &[u8]) -> String {
    let mut out = String::with_capacity(frame.len() * 2);
    for byte in frame {
        out.push_str(&format!("{:02x}", byte));
    }
    out
}

/// Decodes one hex line back into frame bytes. Returns `None` for lines
/// that are empty, odd-length, or contain non-hex characters.
pub fn decode_hex_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    if line.is_empty() || line.len() % 2 != 0 {
        return None;
    }
    let mut frame = Vec::with_capacity(line.len() / 2);
    for i in (0..line.len()).step_by(2) {
        frame.push(u8::from_str_radix(line.get(i..i + 2)?, 16).ok()?);
    }
    Some(frame)
}

/// Reads every frame from a hex-dump file. Unparseable lines are skipped
/// with a warning so one bad capture line does not end the playback.
pub fn read_hex_frames(path: &Path) -> io::Result<Vec<Vec<u8>>> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);

    let mut frames = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match decode_hex_line(&line) {
            Some(frame) => frames.push(frame),
            None => warn!(
                "{}: line {} is not a hex frame, skipped",
                path.display(),
                index + 1
            ),
        }
    }
    Ok(frames)
}

/// Capture sink: appends every received frame as a hex line.
pub struct FrameCapture {
    writer: BufWriter<File>,
}

impl FrameCapture {
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(FrameCapture {
            writer: BufWriter::new(File::create(path)?),
        })
    }

    pub fn record(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(encode_hex(frame).as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }
}
