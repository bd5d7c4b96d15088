//! # IEEE C37.118 Common Types
//!
//! Core types shared by every frame codec: the parse error taxonomy, the
//! standard version and frame type carried in the SYNC field, the 14-byte
//! prefix present on every frame, and the decomposed STAT field of data
//! frames.
//!
//! ## Key Components
//!
//! - `ParseError`: per-frame decode failures; none of them unwinds past a
//!   single frame.
//! - `Version` / `FrameType`: the two bit fields packed into SYNC.
//! - `PrefixFrame`: SYNC, frame size, ID code and timestamp fields common to
//!   all frames.
//! - `StatField`: the 16-bit status bitmap of a data-frame PMU block, with
//!   `DataError` and `TriggerReason` enums for its coded fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors raised while decoding a single frame.
///
/// Structural kinds (`FrameTruncated`, `FrameSizeMismatch`, `CrcMismatch`)
/// and semantic kinds (`UnknownFrameType`, `UnknownVersion`,
/// `ServiceClassUnknown`, `ChannelTypeUnknown`) drop the frame; the stream
/// continues. `MissingConfiguration` marks a data frame whose IDCODE has no
/// cached configuration to decode against.
#[derive(Debug)]
pub enum ParseError {
    FrameTruncated { message: String },
    FrameSizeMismatch { message: String },
    CrcMismatch { message: String },
    UnknownFrameType { message: String },
    UnknownVersion { message: String },
    ServiceClassUnknown { message: String },
    ChannelTypeUnknown { message: String },
    MissingConfiguration { id_code: u16 },
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParseError::FrameTruncated { message } => write!(f, "frame truncated: {}", message),
            ParseError::FrameSizeMismatch { message } => {
                write!(f, "frame size mismatch: {}", message)
            }
            ParseError::CrcMismatch { message } => write!(f, "CRC mismatch: {}", message),
            ParseError::UnknownFrameType { message } => {
                write!(f, "unknown frame type: {}", message)
            }
            ParseError::UnknownVersion { message } => write!(f, "unknown version: {}", message),
            ParseError::ServiceClassUnknown { message } => {
                write!(f, "unknown service class: {}", message)
            }
            ParseError::ChannelTypeUnknown { message } => {
                write!(f, "unknown channel type: {}", message)
            }
            ParseError::MissingConfiguration { id_code } => {
                write!(f, "no configuration cached for IDCODE {}", id_code)
            }
        }
    }
}

impl std::error::Error for ParseError {}

/// IEEE C37.118 standard version carried in SYNC bits 3-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Version {
    V2005, // version field 0x1
    V2011, // version field 0x2
}

impl Version {
    /// Extracts the version from the SYNC field.
    pub fn from_sync(sync: u16) -> Result<Self, ParseError> {
        match sync & 0x000F {
            0x0001 => Ok(Version::V2005),
            0x0002 => Ok(Version::V2011),
            other => Err(ParseError::UnknownVersion {
                message: format!("unsupported version field: 0x{:X}", other),
            }),
        }
    }

    fn bits(&self) -> u16 {
        match self {
            Version::V2005 => 0x1,
            Version::V2011 => 0x2,
        }
    }
}

impl Default for Version {
    fn default() -> Self {
        Version::V2011
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::V2005 => write!(f, "IEEE Std C37.118-2005"),
            Version::V2011 => write!(f, "IEEE Std C37.118.2-2011"),
        }
    }
}

/// Frame type carried in SYNC bits 6-4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameType {
    Data,
    Header,
    Config1,
    Config2,
    Config3,
    Command,
}

impl FrameType {
    /// Extracts the frame type from the SYNC field.
    ///
    /// The leading byte must be 0xAA; unknown type bits are rejected.
    pub fn from_sync(sync: u16) -> Result<FrameType, ParseError> {
        if (sync >> 8) != 0xAA {
            return Err(ParseError::UnknownFrameType {
                message: format!("invalid leading byte 0x{:02X}, expected 0xAA", sync >> 8),
            });
        }
        match (sync >> 4) & 0x7 {
            0 => Ok(FrameType::Data),
            1 => Ok(FrameType::Header),
            2 => Ok(FrameType::Config1),
            3 => Ok(FrameType::Config2),
            4 => Ok(FrameType::Command),
            5 => Ok(FrameType::Config3),
            bits => Err(ParseError::UnknownFrameType {
                message: format!("invalid frame type bits: {}", bits),
            }),
        }
    }

    fn bits(&self) -> u16 {
        match self {
            FrameType::Data => 0,
            FrameType::Header => 1,
            FrameType::Config1 => 2,
            FrameType::Config2 => 3,
            FrameType::Command => 4,
            FrameType::Config3 => 5,
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameType::Data => write!(f, "Data Frame"),
            FrameType::Header => write!(f, "Header Frame"),
            FrameType::Config1 => write!(f, "Configuration Frame 1"),
            FrameType::Config2 => write!(f, "Configuration Frame 2"),
            FrameType::Config3 => write!(f, "Configuration Frame 3"),
            FrameType::Command => write!(f, "Command Frame"),
        }
    }
}

/// Constructs a SYNC field from a version and frame type.
pub fn create_sync(version: Version, frame_type: FrameType) -> u16 {
    (0xAA << 8) | (frame_type.bits() << 4) | version.bits()
}

/// Common 14-byte prefix present on every IEEE C37.118 frame.
///
/// `framesize` counts the whole frame including the trailing CRC. The
/// FRACSEC word packs the message time-quality byte in `leapbyte` and the
/// 24-bit sub-second numerator in `fracsec`; the true sub-second is
/// `fracsec / time_base` with the time base from the active configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrefixFrame {
    pub sync: u16,
    pub framesize: u16,
    pub idcode: u16,
    pub soc: u32,
    pub leapbyte: u8,
    pub fracsec: u32,
    #[serde(skip)]
    pub version: Version, // derived from sync
}

impl PrefixFrame {
    /// Creates a prefix with zeroed timestamp fields; `framesize` is patched
    /// at encode time.
    pub fn new(sync: u16, idcode: u16, version: Version) -> Self {
        PrefixFrame {
            sync,
            framesize: 14,
            idcode,
            soc: 0,
            leapbyte: 0,
            fracsec: 0,
            version,
        }
    }

    /// Parses a prefix from the first 14 bytes of a frame.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 14 {
            return Err(ParseError::FrameTruncated {
                message: format!(
                    "expected at least 14 bytes for the common prefix, got {}",
                    bytes.len()
                ),
            });
        }
        let sync = u16::from_be_bytes([bytes[0], bytes[1]]);
        let version = Version::from_sync(sync)?;

        Ok(PrefixFrame {
            sync,
            framesize: u16::from_be_bytes([bytes[2], bytes[3]]),
            idcode: u16::from_be_bytes([bytes[4], bytes[5]]),
            soc: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
            leapbyte: bytes[10],
            fracsec: u32::from_be_bytes([0, bytes[11], bytes[12], bytes[13]]),
            version,
        })
    }

    /// Serializes the prefix to its 14-byte wire form.
    pub fn to_hex(&self) -> [u8; 14] {
        let mut result = [0u8; 14];
        result[0..2].copy_from_slice(&self.sync.to_be_bytes());
        result[2..4].copy_from_slice(&self.framesize.to_be_bytes());
        result[4..6].copy_from_slice(&self.idcode.to_be_bytes());
        result[6..10].copy_from_slice(&self.soc.to_be_bytes());
        result[10] = self.leapbyte;

        let fracsec = self.fracsec.to_be_bytes();
        result[11] = fracsec[1];
        result[12] = fracsec[2];
        result[13] = fracsec[3];
        result
    }

    pub fn frame_type(&self) -> Result<FrameType, ParseError> {
        FrameType::from_sync(self.sync)
    }
}

/// Data-error code, STAT bits 15-14.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataError {
    Good,         // 0b00: good measurement data, no errors
    PmuError,     // 0b01: PMU error, no information about data
    PmuTestMode,  // 0b10: PMU in test mode or absent data
    PmuErrorBad,  // 0b11: PMU error, do not use values
}

impl DataError {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => DataError::Good,
            0b01 => DataError::PmuError,
            0b10 => DataError::PmuTestMode,
            _ => DataError::PmuErrorBad,
        }
    }

    fn bits(&self) -> u16 {
        match self {
            DataError::Good => 0b00,
            DataError::PmuError => 0b01,
            DataError::PmuTestMode => 0b10,
            DataError::PmuErrorBad => 0b11,
        }
    }
}

/// Trigger-reason code, STAT bits 3-0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerReason {
    Manual,           // 0b0000
    MagnitudeLow,     // 0b0001
    MagnitudeHigh,    // 0b0010
    PhaseAngleDiff,   // 0b0011
    FrequencyHighLow, // 0b0100
    DfDtHigh,         // 0b0101
    Digital,          // 0b0111
    UserDefined,      // 0b1111
    Reserved(u8),     // everything else
}

impl TriggerReason {
    fn from_bits(bits: u16) -> Self {
        match bits & 0b1111 {
            0b0000 => TriggerReason::Manual,
            0b0001 => TriggerReason::MagnitudeLow,
            0b0010 => TriggerReason::MagnitudeHigh,
            0b0011 => TriggerReason::PhaseAngleDiff,
            0b0100 => TriggerReason::FrequencyHighLow,
            0b0101 => TriggerReason::DfDtHigh,
            0b0111 => TriggerReason::Digital,
            0b1111 => TriggerReason::UserDefined,
            other => TriggerReason::Reserved(other as u8),
        }
    }

    fn bits(&self) -> u16 {
        match self {
            TriggerReason::Manual => 0b0000,
            TriggerReason::MagnitudeLow => 0b0001,
            TriggerReason::MagnitudeHigh => 0b0010,
            TriggerReason::PhaseAngleDiff => 0b0011,
            TriggerReason::FrequencyHighLow => 0b0100,
            TriggerReason::DfDtHigh => 0b0101,
            TriggerReason::Digital => 0b0111,
            TriggerReason::UserDefined => 0b1111,
            TriggerReason::Reserved(bits) => (*bits as u16) & 0b1111,
        }
    }
}

/// Decomposed STAT field of a data-frame PMU block.
///
/// Bit layout (IEEE C37.118.2-2011): 15-14 data error, 13 PMU sync
/// (0 = synchronized), 12 data sorting, 11 trigger detected, 10 configuration
/// change, 9 data modified, 8-6 time quality, 5-4 unlocked time, 3-0 trigger
/// reason. `to_raw` reconstructs every bit, so decode/encode is the identity
/// on the full 16-bit word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatField {
    pub data_error: DataError,
    pub pmu_sync: bool,      // bit 13 set = NOT synchronized
    pub data_sorting: bool,  // bit 12
    pub pmu_trigger: bool,   // bit 11
    pub config_change: bool, // bit 10
    pub data_modified: bool, // bit 9
    pub time_quality: u8,    // bits 8-6
    pub unlock_time: u8,     // bits 5-4
    pub trigger_reason: TriggerReason,
}

impl StatField {
    pub fn from_raw(raw: u16) -> Self {
        StatField {
            data_error: DataError::from_bits(raw >> 14),
            pmu_sync: (raw & 0x2000) != 0,
            data_sorting: (raw & 0x1000) != 0,
            pmu_trigger: (raw & 0x0800) != 0,
            config_change: (raw & 0x0400) != 0,
            data_modified: (raw & 0x0200) != 0,
            time_quality: ((raw >> 6) & 0x07) as u8,
            unlock_time: ((raw >> 4) & 0x03) as u8,
            trigger_reason: TriggerReason::from_bits(raw),
        }
    }

    pub fn to_raw(&self) -> u16 {
        let mut raw = self.data_error.bits() << 14;
        raw |= (self.pmu_sync as u16) << 13;
        raw |= (self.data_sorting as u16) << 12;
        raw |= (self.pmu_trigger as u16) << 11;
        raw |= (self.config_change as u16) << 10;
        raw |= (self.data_modified as u16) << 9;
        raw |= ((self.time_quality & 0x07) as u16) << 6;
        raw |= ((self.unlock_time & 0x03) as u16) << 4;
        raw |= self.trigger_reason.bits();
        raw
    }
}
