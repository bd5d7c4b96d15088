//! # IEEE C37.118 Measurement Units
//!
//! Conversion-factor and unit records carried in configuration frames:
//! PHUNIT for phasor channels, ANUNIT for analog channels, DIGUNIT mask
//! words for digital status words, and the FNOM nominal-frequency indicator.
//!
//! ## Key Components
//!
//! - `PhasorUnits`: voltage/current type byte plus a 24-bit scale in 10⁻⁵
//!   V or A per bit (Table 9, IEEE C37.118.2-2011).
//! - `AnalogUnits`: measurement type byte plus a signed 24-bit user scale.
//! - `DigitalUnits`: the normal-status and valid-inputs mask words.
//! - `NominalFrequency`: the 50/60 Hz line-frequency indicator.

use super::common::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// PHUNIT record: conversion factor for one phasor channel.
///
/// The raw type byte is preserved so that frames using 128 for current
/// re-encode byte-identically; 0 is voltage, 1 and 128 are both current,
/// anything else is rejected. The scale factor is an unsigned 24-bit count
/// of 10⁻⁵ V or A per bit, ignored for floating-point phasor data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorUnits {
    pub channel_type: u8,
    pub scale_factor: u32,
}

impl PhasorUnits {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 4 bytes for PHUNIT, got {}", bytes.len()),
            });
        }
        match bytes[0] {
            0 | 1 | 128 => (),
            other => {
                return Err(ParseError::ChannelTypeUnknown {
                    message: format!("PHUNIT channel type byte {} is not voltage or current", other),
                })
            }
        }
        Ok(PhasorUnits {
            channel_type: bytes[0],
            scale_factor: u32::from_be_bytes([0, bytes[1], bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let scale = self.scale_factor.to_be_bytes();
        [self.channel_type, scale[1], scale[2], scale[3]]
    }

    pub fn is_current(&self) -> bool {
        self.channel_type != 0
    }

    /// Scale factor as V or A per integer bit.
    pub fn volts_per_bit(&self) -> f64 {
        self.scale_factor as f64 * 1e-5
    }
}

/// Measurement type byte of an ANUNIT record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementType {
    SinglePointOnWave, // 0
    Rms,               // 1
    Peak,              // 2
    Reserved(u8),      // 3-64
    UserDefined(u8),   // 65-255
}

impl MeasurementType {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            0 => MeasurementType::SinglePointOnWave,
            1 => MeasurementType::Rms,
            2 => MeasurementType::Peak,
            3..=64 => MeasurementType::Reserved(byte),
            _ => MeasurementType::UserDefined(byte),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            MeasurementType::SinglePointOnWave => 0,
            MeasurementType::Rms => 1,
            MeasurementType::Peak => 2,
            MeasurementType::Reserved(byte) => *byte,
            MeasurementType::UserDefined(byte) => *byte,
        }
    }
}

impl fmt::Display for MeasurementType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MeasurementType::SinglePointOnWave => write!(f, "single point-on-wave"),
            MeasurementType::Rms => write!(f, "RMS"),
            MeasurementType::Peak => write!(f, "peak"),
            MeasurementType::Reserved(code) => write!(f, "reserved ({})", code),
            MeasurementType::UserDefined(code) => write!(f, "user defined ({})", code),
        }
    }
}

/// ANUNIT record: measurement type and signed 24-bit user-defined scale for
/// one analog channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalogUnits {
    pub measurement_type: MeasurementType,
    pub scale_factor: i32, // sign-extended i24
}

impl AnalogUnits {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 4 bytes for ANUNIT, got {}", bytes.len()),
            });
        }
        let scale_factor =
            ((bytes[1] as i8 as i32) << 16) | ((bytes[2] as i32) << 8) | bytes[3] as i32;
        Ok(AnalogUnits {
            measurement_type: MeasurementType::from_byte(bytes[0]),
            scale_factor,
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let scale = self.scale_factor.to_be_bytes();
        [self.measurement_type.to_byte(), scale[1], scale[2], scale[3]]
    }
}

/// DIGUNIT record: the two mask words provided for each digital status word.
///
/// The first indicates the normal status of the digital inputs (XOR with the
/// status word yields 0 in the normal state); the second has a bit set for
/// each input currently valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigitalUnits {
    pub normal_status_mask: u16,
    pub valid_inputs_mask: u16,
}

impl DigitalUnits {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 4 bytes for DIGUNIT, got {}", bytes.len()),
            });
        }
        Ok(DigitalUnits {
            normal_status_mask: u16::from_be_bytes([bytes[0], bytes[1]]),
            valid_inputs_mask: u16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut bytes = [0u8; 4];
        bytes[0..2].copy_from_slice(&self.normal_status_mask.to_be_bytes());
        bytes[2..4].copy_from_slice(&self.valid_inputs_mask.to_be_bytes());
        bytes
    }
}

/// FNOM nominal line-frequency indicator: bit 0 set means 50 Hz, clear means
/// 60 Hz. Reserved upper bits are canonicalized to zero on encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NominalFrequency {
    Hz50,
    Hz60,
}

impl NominalFrequency {
    pub fn from_raw(raw: u16) -> Self {
        if raw & 0x0001 != 0 {
            NominalFrequency::Hz50
        } else {
            NominalFrequency::Hz60
        }
    }

    pub fn to_raw(&self) -> u16 {
        match self {
            NominalFrequency::Hz50 => 0x0001,
            NominalFrequency::Hz60 => 0x0000,
        }
    }

    pub fn frequency_hz(&self) -> f32 {
        match self {
            NominalFrequency::Hz50 => 50.0,
            NominalFrequency::Hz60 => 60.0,
        }
    }
}

impl fmt::Display for NominalFrequency {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NominalFrequency::Hz50 => write!(f, "50 Hz"),
            NominalFrequency::Hz60 => write!(f, "60 Hz"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phasor_units() {
        // Voltage and current factors from the IEEE C37.118-2011 examples.
        let phunit1: [u8; 4] = [0x00, 0x0D, 0xF8, 0x47];
        let phunit2: [u8; 4] = [0x01, 0x00, 0xB2, 0xD0];

        let p1 = PhasorUnits::from_hex(&phunit1).unwrap();
        let p2 = PhasorUnits::from_hex(&phunit2).unwrap();

        assert!(!p1.is_current());
        assert!(p2.is_current());
        assert_eq!(p1.scale_factor, 915_527);
        assert_eq!(p2.scale_factor, 45_776);

        assert_eq!(p1.to_hex(), phunit1);
        assert_eq!(p2.to_hex(), phunit2);
    }

    #[test]
    fn test_phasor_units_type_byte() {
        // 128 is accepted as current and preserved on re-encode.
        let raw: [u8; 4] = [0x80, 0x00, 0x00, 0x64];
        let unit = PhasorUnits::from_hex(&raw).unwrap();
        assert!(unit.is_current());
        assert_eq!(unit.to_hex(), raw);

        assert!(matches!(
            PhasorUnits::from_hex(&[0x02, 0, 0, 0]),
            Err(ParseError::ChannelTypeUnknown { .. })
        ));
    }

    #[test]
    fn test_analog_units_sign_extension() {
        // 0xFFFFFF as i24 is -1.
        let unit = AnalogUnits::from_hex(&[0x01, 0xFF, 0xFF, 0xFF]).unwrap();
        assert_eq!(unit.measurement_type, MeasurementType::Rms);
        assert_eq!(unit.scale_factor, -1);
        assert_eq!(unit.to_hex(), [0x01, 0xFF, 0xFF, 0xFF]);

        let unit = AnalogUnits::from_hex(&[0x42, 0x00, 0x01, 0x00]).unwrap();
        assert_eq!(unit.measurement_type, MeasurementType::UserDefined(0x42));
        assert_eq!(unit.scale_factor, 256);
    }

    #[test]
    fn test_digital_units_round_trip() {
        let raw: [u8; 4] = [0x00, 0x0F, 0xFF, 0xF0];
        let unit = DigitalUnits::from_hex(&raw).unwrap();
        assert_eq!(unit.normal_status_mask, 0x000F);
        assert_eq!(unit.valid_inputs_mask, 0xFFF0);
        assert_eq!(unit.to_hex(), raw);
    }

    #[test]
    fn test_nominal_frequency() {
        // Bit 0 set selects 50 Hz; re-encode is canonical.
        let n50 = NominalFrequency::from_raw(0x0001);
        let n60 = NominalFrequency::from_raw(0x0000);
        assert_eq!(n50, NominalFrequency::Hz50);
        assert_eq!(n60, NominalFrequency::Hz60);
        assert_eq!(n50.to_raw(), 0x0001);
        assert_eq!(n60.to_raw(), 0x0000);
        assert_eq!(n50.frequency_hz(), 50.0);
        assert_eq!(n60.frequency_hz(), 60.0);
    }
}
