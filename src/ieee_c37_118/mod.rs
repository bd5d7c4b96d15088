//! # IEEE C37.118 Synchrophasor Frame Codec
//!
//! Decoding and encoding of the IEEE C37.118.2 wire format used between
//! Phasor Measurement Units (PMUs) and Phasor Data Concentrators (PDCs).
//!
//! ## Submodules
//!
//! - `common`: shared types (`ParseError`, `PrefixFrame`, `Version`,
//!   `FrameType`, `StatField`).
//! - `config`: configuration frames 1 and 2 with their per-PMU blocks.
//! - `config3`: configuration frame 3 and its CFG-2 normalization.
//! - `data_frame`: data frames, decoded against a configuration.
//! - `phasors`: phasor values in their four wire representations.
//! - `units`: PHUNIT/ANUNIT/DIGUNIT/FNOM records.
//! - `utils`: CRC-CCITT, checksum validation, byte cursor, timestamps.
//! - `random`: synthetic frame generation for tests.
//!
//! The top level defines the tagged [`Frame`] variant and its
//! [`Frame::from_hex`] entry point: length check, frame-size check, CRC
//! check, then dispatch on the frame type. Data frames require the matching
//! configuration, supplied through a resolver callback keyed on IDCODE.

pub mod common;
pub mod config;
pub mod config3;
pub mod data_frame;
pub mod phasors;
pub mod random;
pub mod units;
pub mod utils;


use std::sync::Arc;

use common::{FrameType, ParseError, PrefixFrame};
use config::ConfigurationFrame;
use config3::ConfigurationFrame3;
use data_frame::DataFrame;
use serde::{Deserialize, Serialize};
use utils::{calculate_crc, validate_checksum};

/// Header frame: the common prefix followed by free-form ASCII text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderFrame {
    pub prefix: PrefixFrame,
    pub data: Vec<u8>,
    pub chk: u16,
}

impl HeaderFrame {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 16 {
            return Err(ParseError::FrameTruncated {
                message: format!(
                    "expected at least 16 bytes for a header frame, got {}",
                    bytes.len()
                ),
            });
        }
        let prefix = PrefixFrame::from_hex(bytes)?;
        if prefix.framesize as usize != bytes.len() {
            return Err(ParseError::FrameSizeMismatch {
                message: format!(
                    "framesize field says {} bytes, buffer holds {}",
                    prefix.framesize,
                    bytes.len()
                ),
            });
        }
        validate_checksum(bytes)?;

        Ok(HeaderFrame {
            prefix,
            data: bytes[14..bytes.len() - 2].to_vec(),
            chk: u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]),
        })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(16 + self.data.len());
        result.extend_from_slice(&self.prefix.to_hex());
        result.extend_from_slice(&self.data);

        let framesize = (result.len() + 2) as u16;
        result[2..4].copy_from_slice(&framesize.to_be_bytes());

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }

    /// The header text, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }
}

/// A decoded IEEE C37.118 frame.
///
/// Command frames are classified but not decoded further; the pipeline has
/// no use for their body.
#[derive(Debug, Clone)]
pub enum Frame {
    Data(DataFrame),
    ConfigV2(ConfigurationFrame),
    ConfigV3(ConfigurationFrame3),
    Header(HeaderFrame),
    Command(PrefixFrame),
}

impl Frame {
    /// Decodes one frame: minimum length, SYNC magic and frame type, frame
    /// size against the buffer, CRC, then the body.
    ///
    /// `resolve` supplies the cached configuration for a data frame's
    /// IDCODE; without one the frame cannot be laid out and
    /// `ParseError::MissingConfiguration` is returned.
    pub fn from_hex<R>(bytes: &[u8], resolve: R) -> Result<Frame, ParseError>
    where
        R: Fn(u16) -> Option<Arc<ConfigurationFrame>>,
    {
        let prefix = PrefixFrame::from_hex(bytes)?;
        let frame_type = prefix.frame_type()?;

        if prefix.framesize as usize != bytes.len() {
            return Err(ParseError::FrameSizeMismatch {
                message: format!(
                    "framesize field says {} bytes, buffer holds {}",
                    prefix.framesize,
                    bytes.len()
                ),
            });
        }
        validate_checksum(bytes)?;

        match frame_type {
            FrameType::Data => {
                let config = resolve(prefix.idcode)
                    .ok_or(ParseError::MissingConfiguration { id_code: prefix.idcode })?;
                Ok(Frame::Data(DataFrame::from_hex(bytes, &config)?))
            }
            FrameType::Config1 | FrameType::Config2 => {
                Ok(Frame::ConfigV2(ConfigurationFrame::from_hex(bytes)?))
            }
            FrameType::Config3 => Ok(Frame::ConfigV3(ConfigurationFrame3::from_hex(bytes)?)),
            FrameType::Header => Ok(Frame::Header(HeaderFrame::from_hex(bytes)?)),
            FrameType::Command => Ok(Frame::Command(prefix)),
        }
    }

    /// The source IDCODE from the common prefix.
    pub fn id_code(&self) -> u16 {
        match self {
            Frame::Data(f) => f.prefix.idcode,
            Frame::ConfigV2(f) => f.prefix.idcode,
            Frame::ConfigV3(f) => f.prefix.idcode,
            Frame::Header(f) => f.prefix.idcode,
            Frame::Command(prefix) => prefix.idcode,
        }
    }
}
