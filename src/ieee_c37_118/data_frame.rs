//! # IEEE C37.118 Data Frames
//!
//! Data frames carry the real-time measurements and can only be decoded
//! against the configuration frame that describes their layout: FORMAT bits
//! select field widths and representations, the channel counts bound each
//! PMU section, and the channel-name table labels every value.
//!
//! Fixed-point values are kept in their raw wire form (`FreqValue::Fixed`
//! and friends) so that re-encoding a decoded frame is bit-exact; scaled
//! engineering values are derived on demand.
//!
//! ## Key Components
//!
//! - `DataFrame` / `PMUData`: a decoded frame and its per-PMU sections.
//! - `FreqValue` / `RocofValue`: FREQ and DFREQ in either wire
//!   representation, with conversions to absolute Hz and Hz/s.
//! - `PhasorSample`, `AnalogSample`, `DigitalSample`: named channel values.

use super::common::{FrameType, ParseError, PrefixFrame, StatField};
use super::config::ConfigurationFrame;
use super::phasors::PhasorValue;
use super::units::{AnalogUnits, NominalFrequency};
use super::utils::{calculate_crc, validate_checksum, ByteReader};
use serde::{Deserialize, Serialize};

/// FREQ in its wire representation. Fixed-point is a millihertz offset from
/// the nominal frequency; floating-point is the absolute frequency in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum FreqValue {
    Fixed(i16),
    Float(f32),
}

impl FreqValue {
    /// Absolute frequency in Hz.
    pub fn hz(&self, nominal: NominalFrequency) -> f32 {
        match self {
            FreqValue::Fixed(raw) => nominal.frequency_hz() + *raw as f32 / 1000.0,
            FreqValue::Float(hz) => *hz,
        }
    }

    pub fn to_hex(&self) -> Vec<u8> {
        match self {
            FreqValue::Fixed(raw) => raw.to_be_bytes().to_vec(),
            FreqValue::Float(hz) => hz.to_be_bytes().to_vec(),
        }
    }
}

/// DFREQ (ROCOF) in its wire representation. Fixed-point is Hz/s times 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RocofValue {
    Fixed(i16),
    Float(f32),
}

impl RocofValue {
    /// Rate of change of frequency in Hz/s.
    pub fn hz_per_sec(&self) -> f32 {
        match self {
            RocofValue::Fixed(raw) => *raw as f32 / 100.0,
            RocofValue::Float(v) => *v,
        }
    }

    pub fn to_hex(&self) -> Vec<u8> {
        match self {
            RocofValue::Fixed(raw) => raw.to_be_bytes().to_vec(),
            RocofValue::Float(v) => v.to_be_bytes().to_vec(),
        }
    }
}

/// An analog channel value in its wire representation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AnalogValue {
    Fixed(i16),
    Float(f32),
}

impl AnalogValue {
    /// Engineering value: fixed-point samples scale by the ANUNIT factor,
    /// floating-point samples are already scaled.
    pub fn scaled(&self, units: &AnalogUnits) -> f64 {
        match self {
            AnalogValue::Fixed(raw) => *raw as f64 * units.scale_factor as f64,
            AnalogValue::Float(v) => *v as f64,
        }
    }

    pub fn to_hex(&self) -> Vec<u8> {
        match self {
            AnalogValue::Fixed(raw) => raw.to_be_bytes().to_vec(),
            AnalogValue::Float(v) => v.to_be_bytes().to_vec(),
        }
    }
}

/// A phasor channel with the name assigned by the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorSample {
    pub name: String,
    pub value: PhasorValue,
}

/// An analog channel with the name assigned by the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogSample {
    pub name: String,
    pub value: AnalogValue,
}

/// One bit of a digital status word. Bit `i` of word `w` maps to channel
/// `w * 16 + i` (LSB first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitalSample {
    pub name: String,
    pub value: bool,
}

/// Measurement section of a single PMU within a data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PMUData {
    pub stat: StatField,
    pub phasors: Vec<PhasorSample>,
    pub freq: FreqValue,
    pub dfreq: RocofValue,
    pub analogs: Vec<AnalogSample>,
    pub digitals: Vec<DigitalSample>,
}

/// A decoded IEEE C37.118 data frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub prefix: PrefixFrame,
    pub pmu_data: Vec<PMUData>,
    pub chk: u16,
}

impl DataFrame {
    /// Parses a data frame against the configuration describing its layout.
    pub fn from_hex(bytes: &[u8], config: &ConfigurationFrame) -> Result<Self, ParseError> {
        if bytes.len() < 16 {
            return Err(ParseError::FrameTruncated {
                message: format!("expected at least 16 bytes for a data frame, got {}", bytes.len()),
            });
        }

        let prefix = PrefixFrame::from_hex(bytes)?;
        match prefix.frame_type()? {
            FrameType::Data => (),
            other => {
                return Err(ParseError::UnknownFrameType {
                    message: format!("expected a data frame, got {}", other),
                })
            }
        }

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

        let mut reader = ByteReader::new(&bytes[14..bytes.len() - 2]);
        let mut pmu_data = Vec::with_capacity(config.pmu_configs.len());

        for pmu_config in &config.pmu_configs {
            let stat = StatField::from_raw(reader.read_u16()?);

            let phnmr = pmu_config.phnmr as usize;
            let annmr = pmu_config.annmr as usize;
            let phasor_size = pmu_config.phasor_size();

            let mut phasors = Vec::with_capacity(phnmr);
            for i in 0..phnmr {
                let value = PhasorValue::from_hex(
                    reader.read_bytes(phasor_size)?,
                    pmu_config.phasor_is_float(),
                    pmu_config.phasor_is_rectangular(),
                )?;
                phasors.push(PhasorSample {
                    name: pmu_config.chnam.get(i).cloned().unwrap_or_default(),
                    value,
                });
            }

            let freq = if pmu_config.freq_is_float() {
                FreqValue::Float(reader.read_f32()?)
            } else {
                FreqValue::Fixed(reader.read_i16()?)
            };
            let dfreq = if pmu_config.freq_is_float() {
                RocofValue::Float(reader.read_f32()?)
            } else {
                RocofValue::Fixed(reader.read_i16()?)
            };

            let mut analogs = Vec::with_capacity(annmr);
            for i in 0..annmr {
                let value = if pmu_config.analog_is_float() {
                    AnalogValue::Float(reader.read_f32()?)
                } else {
                    AnalogValue::Fixed(reader.read_i16()?)
                };
                analogs.push(AnalogSample {
                    name: pmu_config.chnam.get(phnmr + i).cloned().unwrap_or_default(),
                    value,
                });
            }

            let mut digitals = Vec::with_capacity(16 * pmu_config.dgnmr as usize);
            for word_index in 0..pmu_config.dgnmr as usize {
                let word = reader.read_u16()?;
                for bit in 0..16 {
                    let name_index = phnmr + annmr + word_index * 16 + bit;
                    digitals.push(DigitalSample {
                        name: pmu_config.chnam.get(name_index).cloned().unwrap_or_default(),
                        value: word & (1 << bit) != 0,
                    });
                }
            }

            pmu_data.push(PMUData {
                stat,
                phasors,
                freq,
                dfreq,
                analogs,
                digitals,
            });
        }

        let chk = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);

        Ok(DataFrame {
            prefix,
            pmu_data,
            chk,
        })
    }

    /// Serializes the frame: body first, then the framesize field is patched
    /// at offset 2 and the CRC appended.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::new();
        result.extend_from_slice(&self.prefix.to_hex());

        for pmu in &self.pmu_data {
            result.extend_from_slice(&pmu.stat.to_raw().to_be_bytes());
            for phasor in &pmu.phasors {
                result.extend_from_slice(&phasor.value.to_hex());
            }
            result.extend_from_slice(&pmu.freq.to_hex());
            result.extend_from_slice(&pmu.dfreq.to_hex());
            for analog in &pmu.analogs {
                result.extend_from_slice(&analog.value.to_hex());
            }
            for bits in pmu.digitals.chunks(16) {
                let mut word = 0u16;
                for (bit, sample) in bits.iter().enumerate() {
                    if sample.value {
                        word |= 1 << bit;
                    }
                }
                result.extend_from_slice(&word.to_be_bytes());
            }
        }

        let framesize = (result.len() + 2) as u16;
        result[2..4].copy_from_slice(&framesize.to_be_bytes());

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::common::{create_sync, Version};
    use crate::ieee_c37_118::config::{encode_name16, PMUConfigurationFrame};
    use crate::ieee_c37_118::phasors::PhasorIntRect;
    use crate::ieee_c37_118::units::{DigitalUnits, MeasurementType, PhasorUnits};

    fn fixed_point_config() -> ConfigurationFrame {
        ConfigurationFrame {
            prefix: PrefixFrame::new(
                create_sync(Version::V2011, FrameType::Config2),
                7,
                Version::V2011,
            ),
            time_base: 1_000_000,
            num_pmu: 1,
            pmu_configs: vec![PMUConfigurationFrame {
                stn: encode_name16("STATION A"),
                idcode: 7,
                format: 0x0001, // everything fixed-point, rectangular phasors
                phnmr: 2,
                annmr: 1,
                dgnmr: 1,
                chnam: {
                    let mut names =
                        vec!["U_A".to_string(), "U_SEQ+".to_string(), "AN_01".to_string()];
                    names.extend((0..16).map(|i| format!("DG_{:02}", i)));
                    names
                },
                phunit: vec![
                    PhasorUnits {
                        channel_type: 0,
                        scale_factor: 915_527,
                    },
                    PhasorUnits {
                        channel_type: 0,
                        scale_factor: 915_527,
                    },
                ],
                anunit: vec![AnalogUnits {
                    measurement_type: MeasurementType::Rms,
                    scale_factor: 10,
                }],
                digunit: vec![DigitalUnits {
                    normal_status_mask: 0,
                    valid_inputs_mask: 0xFFFF,
                }],
                fnom: NominalFrequency::Hz50,
                cfgcnt: 1,
            }],
            data_rate: 50,
            chk: 0,
            cfg_type: 2,
        }
    }

    fn sample_data_frame() -> DataFrame {
        DataFrame {
            prefix: PrefixFrame::new(
                create_sync(Version::V2011, FrameType::Data),
                7,
                Version::V2011,
            ),
            pmu_data: vec![PMUData {
                stat: StatField::from_raw(0x0000),
                phasors: vec![
                    PhasorSample {
                        name: "U_A".to_string(),
                        value: PhasorValue::IntRect(PhasorIntRect { real: 14635, imag: 0 }),
                    },
                    PhasorSample {
                        name: "U_SEQ+".to_string(),
                        value: PhasorValue::IntRect(PhasorIntRect { real: 14000, imag: -230 }),
                    },
                ],
                freq: FreqValue::Fixed(1500),
                dfreq: RocofValue::Fixed(-20),
                analogs: vec![AnalogSample {
                    name: "AN_01".to_string(),
                    value: AnalogValue::Fixed(100),
                }],
                digitals: (0..16)
                    .map(|i| DigitalSample {
                        name: format!("DG_{:02}", i),
                        value: i == 0 || i == 15,
                    })
                    .collect(),
            }],
            chk: 0,
        }
    }

    #[test]
    fn test_data_frame_round_trip() {
        let config = fixed_point_config();
        let frame = sample_data_frame();
        let bytes = frame.to_hex();

        assert_eq!(bytes.len(), config.calc_data_frame_size());

        let decoded = DataFrame::from_hex(&bytes, &config).unwrap();
        assert_eq!(decoded.pmu_data, frame.pmu_data);
        assert_eq!(decoded.to_hex(), bytes);
    }

    #[test]
    fn test_fixed_point_semantics() {
        let config = fixed_point_config();
        let frame = sample_data_frame();
        let bytes = frame.to_hex();
        let decoded = DataFrame::from_hex(&bytes, &config).unwrap();

        let pmu = &decoded.pmu_data[0];
        // FREQ raw 1500 mHz above a 50 Hz nominal.
        assert!((pmu.freq.hz(NominalFrequency::Hz50) - 51.5).abs() < 1e-6);
        // DFREQ raw -20 is -0.2 Hz/s.
        assert!((pmu.dfreq.hz_per_sec() + 0.2).abs() < 1e-6);
        // Analog raw 100 with ANUNIT scale 10.
        let units = &config.pmu_configs[0].anunit[0];
        assert_eq!(pmu.analogs[0].value.scaled(units), 1000.0);
    }

    #[test]
    fn test_digital_bit_mapping_lsb_first() {
        let config = fixed_point_config();
        let frame = sample_data_frame();
        let bytes = frame.to_hex();

        // Word with bits 0 and 15 set is 0x8001 on the wire.
        let word_offset = bytes.len() - 2 - 2;
        assert_eq!(&bytes[word_offset..word_offset + 2], &[0x80, 0x01]);

        let decoded = DataFrame::from_hex(&bytes, &config).unwrap();
        let digitals = &decoded.pmu_data[0].digitals;
        assert_eq!(digitals.len(), 16);
        assert!(digitals[0].value);
        assert!(digitals[15].value);
        assert!(!digitals[7].value);
        assert_eq!(digitals[0].name, "DG_00");
        assert_eq!(digitals[15].name, "DG_15");
    }

    #[test]
    fn test_float_format_round_trip() {
        let mut config = fixed_point_config();
        config.pmu_configs[0].format = 0x000E; // float freq/analog/phasor, polar
        let mut frame = sample_data_frame();
        frame.pmu_data[0].phasors = vec![
            PhasorSample {
                name: "U_A".to_string(),
                value: PhasorValue::FloatPolar(crate::ieee_c37_118::phasors::PhasorFloatPolar {
                    magnitude: 134_000.0,
                    angle: 0.0,
                }),
            },
            PhasorSample {
                name: "U_SEQ+".to_string(),
                value: PhasorValue::FloatPolar(crate::ieee_c37_118::phasors::PhasorFloatPolar {
                    magnitude: 133_500.0,
                    angle: -0.01,
                }),
            },
        ];
        frame.pmu_data[0].freq = FreqValue::Float(49.987);
        frame.pmu_data[0].dfreq = RocofValue::Float(0.004);
        frame.pmu_data[0].analogs[0].value = AnalogValue::Float(42.5);

        let bytes = frame.to_hex();
        assert_eq!(bytes.len(), config.calc_data_frame_size());
        let decoded = DataFrame::from_hex(&bytes, &config).unwrap();
        assert_eq!(decoded.pmu_data, frame.pmu_data);
        assert!((decoded.pmu_data[0].freq.hz(NominalFrequency::Hz50) - 49.987).abs() < 1e-6);
    }

    #[test]
    fn test_data_frame_requires_matching_size() {
        let config = fixed_point_config();
        let frame = sample_data_frame();
        let mut bytes = frame.to_hex();

        bytes.push(0x00);
        assert!(matches!(
            DataFrame::from_hex(&bytes, &config),
            Err(ParseError::FrameSizeMismatch { .. })
        ));
        bytes.pop();

        bytes[16] ^= 0xFF;
        assert!(matches!(
            DataFrame::from_hex(&bytes, &config),
            Err(ParseError::CrcMismatch { .. })
        ));
    }
}
