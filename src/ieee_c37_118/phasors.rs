//! # IEEE C37.118 Phasor Values
//!
//! Phasor measurements as they appear on the wire: polar or rectangular
//! coordinates, 16-bit integer or 32-bit floating-point representation. The
//! raw integers are preserved through decode so that re-encoding a frame is
//! bit-exact; conversions to scaled floating-point use the PHUNIT factor
//! (10⁻⁵ V or A per bit) and the 10⁻⁴ radian scale of integer polar angles.

use super::common::ParseError;
use serde::{Deserialize, Serialize};

// 10^-5 V or A per PHUNIT count, IEEE C37.118-2011 Table 9.
const PHUNIT_LSB: f32 = 0.00001;

// Integer polar angles are radians scaled by 10^4.
const INT_ANGLE_SCALE: f32 = 0.0001;

fn scale_phasor_value(value: f32, factor: u32) -> f32 {
    value * PHUNIT_LSB * factor as f32
}

fn calc_magnitude(real: f32, imag: f32) -> f32 {
    (real * real + imag * imag).sqrt()
}

/// A phasor value in one of the four wire representations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PhasorValue {
    FloatPolar(PhasorFloatPolar),
    FloatRect(PhasorFloatRect),
    IntPolar(PhasorIntPolar),
    IntRect(PhasorIntRect),
}

impl PhasorValue {
    /// Parses a phasor from its wire bytes given the FORMAT-derived shape.
    pub fn from_hex(bytes: &[u8], is_float: bool, is_rectangular: bool) -> Result<Self, ParseError> {
        match (is_float, is_rectangular) {
            (true, true) => Ok(PhasorValue::FloatRect(PhasorFloatRect::from_hex(bytes)?)),
            (true, false) => Ok(PhasorValue::FloatPolar(PhasorFloatPolar::from_hex(bytes)?)),
            (false, true) => Ok(PhasorValue::IntRect(PhasorIntRect::from_hex(bytes)?)),
            (false, false) => Ok(PhasorValue::IntPolar(PhasorIntPolar::from_hex(bytes)?)),
        }
    }

    /// Serializes the phasor back to its wire bytes (4 or 8 depending on the
    /// representation).
    pub fn to_hex(&self) -> Vec<u8> {
        match self {
            PhasorValue::FloatPolar(p) => p.to_hex().to_vec(),
            PhasorValue::FloatRect(p) => p.to_hex().to_vec(),
            PhasorValue::IntPolar(p) => p.to_hex().to_vec(),
            PhasorValue::IntRect(p) => p.to_hex().to_vec(),
        }
    }

    pub fn wire_size(&self) -> usize {
        match self {
            PhasorValue::FloatPolar(_) | PhasorValue::FloatRect(_) => 8,
            PhasorValue::IntPolar(_) | PhasorValue::IntRect(_) => 4,
        }
    }

    /// Converts to scaled floating-point polar form. Integer representations
    /// require the PHUNIT scale factor.
    pub fn to_float_polar(&self, scale_factor: Option<u32>) -> PhasorFloatPolar {
        match self {
            PhasorValue::FloatPolar(p) => *p,
            PhasorValue::FloatRect(p) => p.to_float_polar(),
            PhasorValue::IntPolar(p) => p.to_float_polar(scale_factor.unwrap_or(1)),
            PhasorValue::IntRect(p) => p.to_float_polar(scale_factor.unwrap_or(1)),
        }
    }

    /// Converts to scaled floating-point rectangular form.
    pub fn to_float_rect(&self, scale_factor: Option<u32>) -> PhasorFloatRect {
        match self {
            PhasorValue::FloatRect(p) => *p,
            PhasorValue::FloatPolar(p) => p.to_float_rect(),
            PhasorValue::IntPolar(p) => p.to_float_rect(scale_factor.unwrap_or(1)),
            PhasorValue::IntRect(p) => p.to_float_rect(scale_factor.unwrap_or(1)),
        }
    }
}

/// Floating-point polar phasor: magnitude in physical units, angle in
/// radians. Wire order is magnitude, then angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatPolar {
    pub magnitude: f32,
    pub angle: f32,
}

impl PhasorFloatPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 8 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 8 bytes for float polar phasor, got {}", bytes.len()),
            });
        }
        Ok(PhasorFloatPolar {
            magnitude: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            angle: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.magnitude.to_be_bytes());
        result[4..8].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_float_rect(&self) -> PhasorFloatRect {
        PhasorFloatRect {
            real: self.magnitude * self.angle.cos(),
            imag: self.magnitude * self.angle.sin(),
        }
    }
}

/// Floating-point rectangular phasor: real and imaginary components in
/// physical units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhasorFloatRect {
    pub real: f32,
    pub imag: f32,
}

impl PhasorFloatRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 8 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 8 bytes for float rect phasor, got {}", bytes.len()),
            });
        }
        Ok(PhasorFloatRect {
            real: f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            imag: f32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut result = [0u8; 8];
        result[0..4].copy_from_slice(&self.real.to_be_bytes());
        result[4..8].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: calc_magnitude(self.real, self.imag),
            angle: self.imag.atan2(self.real),
        }
    }
}

/// Integer polar phasor: unsigned raw magnitude, signed angle in units of
/// 10⁻⁴ rad. Wire order is magnitude, then angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntPolar {
    pub magnitude: u16,
    pub angle: i16,
}

impl PhasorIntPolar {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 4 bytes for int polar phasor, got {}", bytes.len()),
            });
        }
        Ok(PhasorIntPolar {
            magnitude: u16::from_be_bytes([bytes[0], bytes[1]]),
            angle: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.magnitude.to_be_bytes());
        result[2..4].copy_from_slice(&self.angle.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self, scale_factor: u32) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: scale_phasor_value(self.magnitude as f32, scale_factor),
            angle: (self.angle as f32) * INT_ANGLE_SCALE,
        }
    }

    pub fn to_float_rect(&self, scale_factor: u32) -> PhasorFloatRect {
        self.to_float_polar(scale_factor).to_float_rect()
    }
}

/// Integer rectangular phasor: signed raw real and imaginary components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhasorIntRect {
    pub real: i16,
    pub imag: i16,
}

impl PhasorIntRect {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 4 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected 4 bytes for int rect phasor, got {}", bytes.len()),
            });
        }
        Ok(PhasorIntRect {
            real: i16::from_be_bytes([bytes[0], bytes[1]]),
            imag: i16::from_be_bytes([bytes[2], bytes[3]]),
        })
    }

    pub fn to_hex(&self) -> [u8; 4] {
        let mut result = [0u8; 4];
        result[0..2].copy_from_slice(&self.real.to_be_bytes());
        result[2..4].copy_from_slice(&self.imag.to_be_bytes());
        result
    }

    pub fn to_float_polar(&self, scale_factor: u32) -> PhasorFloatPolar {
        PhasorFloatPolar {
            magnitude: scale_phasor_value(
                calc_magnitude(self.real as f32, self.imag as f32),
                scale_factor,
            ),
            angle: (self.imag as f32).atan2(self.real as f32),
        }
    }

    pub fn to_float_rect(&self, scale_factor: u32) -> PhasorFloatRect {
        PhasorFloatRect {
            real: scale_phasor_value(self.real as f32, scale_factor),
            imag: scale_phasor_value(self.imag as f32, scale_factor),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn test_polar_rect_conversion() {
        let polar = PhasorFloatPolar {
            magnitude: 1.0,
            angle: PI / 4.0,
        };
        let rect = polar.to_float_rect();
        assert!((rect.real - 0.7071).abs() < 0.001);
        assert!((rect.imag - 0.7071).abs() < 0.001);

        let back = rect.to_float_polar();
        assert!((back.magnitude - 1.0).abs() < 0.001);
        assert!((back.angle - PI / 4.0).abs() < 0.001);
    }

    #[test]
    fn test_int_polar_scaling() {
        // 15708 raw = PI/2 in 10^-4 rad units.
        let raw = PhasorIntPolar {
            magnitude: 500,
            angle: 15708,
        };
        let float_polar = raw.to_float_polar(1000);
        assert!((float_polar.magnitude - 5.0).abs() < 0.001); // 500 * 1000 * 1e-5
        assert!((float_polar.angle - PI / 2.0).abs() < 0.001);
    }

    #[test]
    fn test_scale_phasor_value() {
        // IEEE C37.118-2011 examples: raw 14635 with voltage factor 915527
        // is 134 kV; raw 1092 with current factor 45776 is 500 A.
        let scaled = scale_phasor_value(14635.0, 915_527);
        assert!((scaled - 134_000.0).abs() < 1000.0);

        let scaled = scale_phasor_value(1092.0, 45_776);
        assert!((scaled - 500.0).abs() < 1.0);

        assert_eq!(scale_phasor_value(0.0, 915_527), 0.0);
        assert_eq!(scale_phasor_value(14635.0, 0), 0.0);
    }

    #[test]
    fn test_hex_round_trips() {
        let bytes = [
            0x3F, 0x80, 0x00, 0x00, // 1.0
            0x3F, 0x00, 0x00, 0x00, // 0.5
        ];
        let phasor = PhasorFloatPolar::from_hex(&bytes).unwrap();
        assert_eq!(phasor.magnitude, 1.0);
        assert_eq!(phasor.angle, 0.5);
        assert_eq!(phasor.to_hex(), bytes);

        // Integer polar wire order is magnitude, then angle.
        let int_bytes = [0x00, 0x64, 0xFF, 0x9C]; // magnitude=100, angle=-100
        let int_phasor = PhasorIntPolar::from_hex(&int_bytes).unwrap();
        assert_eq!(int_phasor.magnitude, 100);
        assert_eq!(int_phasor.angle, -100);
        assert_eq!(int_phasor.to_hex(), int_bytes);

        let rect_bytes = [0x00, 0x64, 0x00, 0x32]; // real=100, imag=50
        let rect = PhasorIntRect::from_hex(&rect_bytes).unwrap();
        assert_eq!(rect.real, 100);
        assert_eq!(rect.imag, 50);
        assert_eq!(rect.to_hex(), rect_bytes);
    }

    #[test]
    fn test_from_hex_dispatch() {
        let bytes = [0x39, 0x2B, 0x00, 0x00];
        match PhasorValue::from_hex(&bytes, false, true).unwrap() {
            PhasorValue::IntRect(p) => {
                assert_eq!(p.real, 14635);
                assert_eq!(p.imag, 0);
            }
            other => panic!("expected IntRect, got {:?}", other),
        }

        assert_eq!(
            PhasorValue::from_hex(&bytes, false, true).unwrap().wire_size(),
            4
        );
        assert!(PhasorValue::from_hex(&bytes, true, true).is_err());
    }
}
