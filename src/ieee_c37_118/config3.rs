//! # IEEE C37.118 Configuration Frame 3 (CFG-3)
//!
//! CFG-3 extends the CFG-2 metadata with fragmentation (`CONT_IDX`),
//! variable-length names, a global PMU identifier, floating-point scale
//! records (PHSCALE/ANSCALE), geographic coordinates, service class and
//! filter timing. Data frames are still decoded against a CFG-2-shaped view,
//! which `ConfigurationFrame3::to_config2` produces.
//!
//! Some field units ship CFG-3 name tables that omit the per-bit digital
//! channel names; `ChannelNamePolicy::SkipDigitals` reproduces that layout,
//! the default uses the full `phnmr + annmr + 16·dgnmr` count.

use super::common::{create_sync, FrameType, ParseError, PrefixFrame};
use super::config::{encode_name16, ConfigurationFrame, PMUConfigurationFrame};
use super::units::{AnalogUnits, DigitalUnits, MeasurementType, NominalFrequency, PhasorUnits};
use super::utils::{calculate_crc, validate_checksum, ByteReader};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How many entries the CFG-3 channel-name table holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelNamePolicy {
    /// One name per phasor, analog, and digital bit (the standard layout).
    Full,
    /// Names for phasors and analogs only, as emitted by some field units.
    SkipDigitals,
}

/// Service class of a PMU: 'M' (measurement) or 'P' (protection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceClass {
    M,
    P,
}

impl ServiceClass {
    pub fn from_byte(byte: u8) -> Result<Self, ParseError> {
        match byte {
            b'M' => Ok(ServiceClass::M),
            b'P' => Ok(ServiceClass::P),
            other => Err(ParseError::ServiceClassUnknown {
                message: format!("service class byte 0x{:02X} is not 'M' or 'P'", other),
            }),
        }
    }

    pub fn to_byte(&self) -> u8 {
        match self {
            ServiceClass::M => b'M',
            ServiceClass::P => b'P',
        }
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_byte() as char)
    }
}

/// Phasor component identifier from the PHSCALE type/component field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhasorComponent {
    ZeroSequence,     // 0b000
    PositiveSequence, // 0b001
    NegativeSequence, // 0b010
    PhaseA,           // 0b100
    PhaseB,           // 0b101
    PhaseC,           // 0b110
    Reserved(u8),     // 0b011, 0b111
}

impl PhasorComponent {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x07 {
            0b000 => PhasorComponent::ZeroSequence,
            0b001 => PhasorComponent::PositiveSequence,
            0b010 => PhasorComponent::NegativeSequence,
            0b100 => PhasorComponent::PhaseA,
            0b101 => PhasorComponent::PhaseB,
            0b110 => PhasorComponent::PhaseC,
            other => PhasorComponent::Reserved(other),
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            PhasorComponent::ZeroSequence => 0b000,
            PhasorComponent::PositiveSequence => 0b001,
            PhasorComponent::NegativeSequence => 0b010,
            PhasorComponent::PhaseA => 0b100,
            PhasorComponent::PhaseB => 0b101,
            PhasorComponent::PhaseC => 0b110,
            PhasorComponent::Reserved(bits) => bits & 0x07,
        }
    }
}

/// PHSCALE record: 12 bytes of flags, phasor type/component, and
/// floating-point magnitude scale and angle offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhasorScale {
    pub flags: u16,
    pub is_current: bool,
    pub component: PhasorComponent,
    pub scale_factor: f32,
    pub angle_offset: f32,
}

impl PhasorScale {
    pub fn from_reader(reader: &mut ByteReader) -> Result<Self, ParseError> {
        let flags = reader.read_u16()?;
        let type_component = reader.read_u8()?;
        let _reserved = reader.read_u8()?;
        let scale_factor = reader.read_f32()?;
        let angle_offset = reader.read_f32()?;
        Ok(PhasorScale {
            flags,
            is_current: (type_component >> 3) & 0x01 == 1,
            component: PhasorComponent::from_bits(type_component),
            scale_factor,
            angle_offset,
        })
    }

    pub fn to_hex(&self) -> [u8; 12] {
        let mut out = [0u8; 12];
        out[0..2].copy_from_slice(&self.flags.to_be_bytes());
        out[2] = ((self.is_current as u8) << 3) | self.component.bits();
        // out[3] is reserved
        out[4..8].copy_from_slice(&self.scale_factor.to_be_bytes());
        out[8..12].copy_from_slice(&self.angle_offset.to_be_bytes());
        out
    }
}

/// ANSCALE record: floating-point magnitude scale and offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalogScale {
    pub magnitude_scale: f32,
    pub offset: f32,
}

impl AnalogScale {
    pub fn from_reader(reader: &mut ByteReader) -> Result<Self, ParseError> {
        Ok(AnalogScale {
            magnitude_scale: reader.read_f32()?,
            offset: reader.read_f32()?,
        })
    }

    pub fn to_hex(&self) -> [u8; 8] {
        let mut out = [0u8; 8];
        out[0..4].copy_from_slice(&self.magnitude_scale.to_be_bytes());
        out[4..8].copy_from_slice(&self.offset.to_be_bytes());
        out
    }
}

/// One PMU block of a CFG-3 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PMUConfigurationFrame3 {
    pub station_name: String,
    pub idcode: u16,
    pub global_pmu_id: [u8; 16],
    pub format: u16,
    pub phnmr: u16,
    pub annmr: u16,
    pub dgnmr: u16,
    pub chnam: Vec<String>,
    pub phscale: Vec<PhasorScale>,
    pub anscale: Vec<AnalogScale>,
    pub digunit: Vec<DigitalUnits>,
    pub latitude: f32,
    pub longitude: f32,
    pub elevation: f32, // non-finite wire values are normalized to 0.0
    pub service_class: ServiceClass,
    pub window: u32,      // measurement window, microseconds
    pub group_delay: u32, // phasor group delay, microseconds
    pub fnom: NominalFrequency,
}

impl PMUConfigurationFrame3 {
    fn read_name(reader: &mut ByteReader) -> Result<String, ParseError> {
        let len = reader.read_u8()? as usize;
        // Length 0 is permitted and means an empty name.
        Ok(String::from_utf8_lossy(reader.read_bytes(len)?).to_string())
    }

    fn write_name(out: &mut Vec<u8>, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(255);
        out.push(len as u8);
        out.extend_from_slice(&bytes[..len]);
    }

    pub fn from_reader(
        reader: &mut ByteReader,
        policy: ChannelNamePolicy,
    ) -> Result<Self, ParseError> {
        let station_name = Self::read_name(reader)?;
        let idcode = reader.read_u16()?;
        let mut global_pmu_id = [0u8; 16];
        global_pmu_id.copy_from_slice(reader.read_bytes(16)?);
        let format = reader.read_u16()?;
        let phnmr = reader.read_u16()?;
        let annmr = reader.read_u16()?;
        let dgnmr = reader.read_u16()?;

        let name_count = match policy {
            ChannelNamePolicy::Full => phnmr as usize + annmr as usize + 16 * dgnmr as usize,
            ChannelNamePolicy::SkipDigitals => phnmr as usize + annmr as usize,
        };
        let mut chnam = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            chnam.push(Self::read_name(reader)?);
        }

        let mut phscale = Vec::with_capacity(phnmr as usize);
        for _ in 0..phnmr {
            phscale.push(PhasorScale::from_reader(reader)?);
        }
        let mut anscale = Vec::with_capacity(annmr as usize);
        for _ in 0..annmr {
            anscale.push(AnalogScale::from_reader(reader)?);
        }
        let mut digunit = Vec::with_capacity(dgnmr as usize);
        for _ in 0..dgnmr {
            digunit.push(DigitalUnits::from_hex(reader.read_bytes(4)?)?);
        }

        let latitude = reader.read_f32()?;
        let longitude = reader.read_f32()?;
        let raw_elevation = reader.read_f32()?;
        let elevation = if raw_elevation.is_finite() {
            raw_elevation
        } else {
            0.0
        };
        let service_class = ServiceClass::from_byte(reader.read_u8()?)?;
        let window = reader.read_u32()?;
        let group_delay = reader.read_u32()?;
        let fnom = NominalFrequency::from_raw(reader.read_u16()?);

        Ok(PMUConfigurationFrame3 {
            station_name,
            idcode,
            global_pmu_id,
            format,
            phnmr,
            annmr,
            dgnmr,
            chnam,
            phscale,
            anscale,
            digunit,
            latitude,
            longitude,
            elevation,
            service_class,
            window,
            group_delay,
            fnom,
        })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut out = Vec::new();
        Self::write_name(&mut out, &self.station_name);
        out.extend_from_slice(&self.idcode.to_be_bytes());
        out.extend_from_slice(&self.global_pmu_id);
        out.extend_from_slice(&self.format.to_be_bytes());
        out.extend_from_slice(&self.phnmr.to_be_bytes());
        out.extend_from_slice(&self.annmr.to_be_bytes());
        out.extend_from_slice(&self.dgnmr.to_be_bytes());
        for name in &self.chnam {
            Self::write_name(&mut out, name);
        }
        for ph in &self.phscale {
            out.extend_from_slice(&ph.to_hex());
        }
        for an in &self.anscale {
            out.extend_from_slice(&an.to_hex());
        }
        for dg in &self.digunit {
            out.extend_from_slice(&dg.to_hex());
        }
        out.extend_from_slice(&self.latitude.to_be_bytes());
        out.extend_from_slice(&self.longitude.to_be_bytes());
        out.extend_from_slice(&self.elevation.to_be_bytes());
        out.push(self.service_class.to_byte());
        out.extend_from_slice(&self.window.to_be_bytes());
        out.extend_from_slice(&self.group_delay.to_be_bytes());
        out.extend_from_slice(&self.fnom.to_raw().to_be_bytes());
        out
    }
}

/// A complete CFG-3 frame. `data_rate` and `config_count` are stream-level
/// trailer fields, in that order, after the last PMU block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFrame3 {
    pub prefix: PrefixFrame,
    pub cont_idx: u16,
    pub time_base: u32,
    pub num_pmu: u16,
    pub pmu_configs: Vec<PMUConfigurationFrame3>,
    pub data_rate: i16,
    pub config_count: u16,
    pub chk: u16,
}

impl ConfigurationFrame3 {
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        Self::from_hex_with(bytes, ChannelNamePolicy::Full)
    }

    pub fn from_hex_with(bytes: &[u8], policy: ChannelNamePolicy) -> Result<Self, ParseError> {
        if bytes.len() < 16 {
            return Err(ParseError::FrameTruncated {
                message: format!(
                    "expected at least 16 bytes for a configuration frame, got {}",
                    bytes.len()
                ),
            });
        }
        let prefix = PrefixFrame::from_hex(bytes)?;

        match prefix.frame_type()? {
            FrameType::Config3 => (),
            other => {
                return Err(ParseError::UnknownFrameType {
                    message: format!("expected a CFG-3 frame, got {}", other),
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
        let cont_idx = reader.read_u16()?;
        let time_base = reader.read_u32()?;
        let num_pmu = reader.read_u16()?;

        let mut pmu_configs = Vec::with_capacity(num_pmu as usize);
        for _ in 0..num_pmu {
            pmu_configs.push(PMUConfigurationFrame3::from_reader(&mut reader, policy)?);
        }

        let data_rate = reader.read_i16()?;
        let config_count = reader.read_u16()?;
        let chk = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);

        Ok(ConfigurationFrame3 {
            prefix,
            cont_idx,
            time_base,
            num_pmu,
            pmu_configs,
            data_rate,
            config_count,
            chk,
        })
    }

    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::new();
        result.extend_from_slice(&self.prefix.to_hex());
        result.extend_from_slice(&self.cont_idx.to_be_bytes());
        result.extend_from_slice(&self.time_base.to_be_bytes());
        result.extend_from_slice(&self.num_pmu.to_be_bytes());
        for pmu in &self.pmu_configs {
            result.extend_from_slice(&pmu.to_hex());
        }
        result.extend_from_slice(&self.data_rate.to_be_bytes());
        result.extend_from_slice(&self.config_count.to_be_bytes());

        let framesize = (result.len() + 2) as u16;
        result[2..4].copy_from_slice(&framesize.to_be_bytes());

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }

    /// Builds the CFG-2-shaped view used for data-frame decoding and
    /// projection: PHSCALE collapses to PHUNIT (voltage/current bit, scale
    /// re-expressed in 10⁻⁵ units), ANSCALE to a point-on-wave ANUNIT, and
    /// any digital names missing under `SkipDigitals` become empty entries.
    pub fn to_config2(&self) -> ConfigurationFrame {
        let mut prefix = self.prefix.clone();
        prefix.sync = create_sync(prefix.version, FrameType::Config2);

        let pmu_configs = self
            .pmu_configs
            .iter()
            .map(|pmu| {
                let name_count =
                    pmu.phnmr as usize + pmu.annmr as usize + 16 * pmu.dgnmr as usize;
                let mut chnam = pmu.chnam.clone();
                chnam.resize(name_count, String::new());

                let phunit = pmu
                    .phscale
                    .iter()
                    .map(|ph| PhasorUnits {
                        channel_type: if ph.is_current { 1 } else { 0 },
                        scale_factor: (ph.scale_factor as f64 * 1e5)
                            .round()
                            .clamp(0.0, 16_777_215.0) as u32,
                    })
                    .collect();
                let anunit = pmu
                    .anscale
                    .iter()
                    .map(|an| AnalogUnits {
                        measurement_type: MeasurementType::SinglePointOnWave,
                        scale_factor: (an.magnitude_scale as f64)
                            .round()
                            .clamp(-8_388_608.0, 8_388_607.0)
                            as i32,
                    })
                    .collect();

                PMUConfigurationFrame {
                    stn: encode_name16(&pmu.station_name),
                    idcode: pmu.idcode,
                    format: pmu.format,
                    phnmr: pmu.phnmr,
                    annmr: pmu.annmr,
                    dgnmr: pmu.dgnmr,
                    chnam,
                    phunit,
                    anunit,
                    digunit: pmu.digunit.clone(),
                    fnom: pmu.fnom,
                    cfgcnt: self.config_count,
                }
            })
            .collect();

        ConfigurationFrame {
            prefix,
            time_base: self.time_base,
            num_pmu: self.num_pmu,
            pmu_configs,
            data_rate: self.data_rate,
            chk: 0,
            cfg_type: 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::common::Version;

    fn sample_pmu3() -> PMUConfigurationFrame3 {
        PMUConfigurationFrame3 {
            station_name: "ROGOWIEC 220kV".to_string(),
            idcode: 11,
            global_pmu_id: *b"0123456789ABCDEF",
            format: 0x000F, // all float, rectangular
            phnmr: 1,
            annmr: 1,
            dgnmr: 1,
            chnam: {
                let mut names = vec!["U_SEQ+".to_string(), "P_SUM".to_string()];
                names.extend((0..16).map(|i| format!("BRKR_{:02}", i)));
                names
            },
            phscale: vec![PhasorScale {
                flags: 0x0000,
                is_current: false,
                component: PhasorComponent::PositiveSequence,
                scale_factor: 1.0,
                angle_offset: 0.0,
            }],
            anscale: vec![AnalogScale {
                magnitude_scale: 2.5,
                offset: 0.0,
            }],
            digunit: vec![DigitalUnits {
                normal_status_mask: 0,
                valid_inputs_mask: 0xFFFF,
            }],
            latitude: 51.23,
            longitude: 19.32,
            elevation: 188.0,
            service_class: ServiceClass::M,
            window: 80_000,
            group_delay: 40_000,
            fnom: NominalFrequency::Hz50,
        }
    }

    fn sample_config3() -> ConfigurationFrame3 {
        ConfigurationFrame3 {
            prefix: PrefixFrame::new(
                create_sync(Version::V2011, FrameType::Config3),
                11,
                Version::V2011,
            ),
            cont_idx: 0,
            time_base: 1_000_000,
            num_pmu: 1,
            pmu_configs: vec![sample_pmu3()],
            data_rate: 50,
            config_count: 4,
            chk: 0,
        }
    }

    #[test]
    fn test_config3_round_trip() {
        let config = sample_config3();
        let bytes = config.to_hex();

        let decoded = ConfigurationFrame3::from_hex(&bytes).unwrap();
        assert_eq!(decoded.cont_idx, 0);
        assert_eq!(decoded.time_base, 1_000_000);
        assert_eq!(decoded.data_rate, 50);
        assert_eq!(decoded.config_count, 4);
        assert_eq!(decoded.pmu_configs, config.pmu_configs);
        assert_eq!(decoded.to_hex(), bytes);
    }

    #[test]
    fn test_config3_empty_name_permitted() {
        let mut config = sample_config3();
        config.pmu_configs[0].chnam[1] = String::new();
        let bytes = config.to_hex();
        let decoded = ConfigurationFrame3::from_hex(&bytes).unwrap();
        assert_eq!(decoded.pmu_configs[0].chnam[1], "");
    }

    #[test]
    fn test_config3_skip_digitals_policy() {
        let mut config = sample_config3();
        config.pmu_configs[0].chnam.truncate(2); // drop the digital names
        let bytes = config.to_hex();

        // The full policy now misreads the table; the conformance policy
        // decodes it.
        assert!(ConfigurationFrame3::from_hex(&bytes).is_err());
        let decoded =
            ConfigurationFrame3::from_hex_with(&bytes, ChannelNamePolicy::SkipDigitals).unwrap();
        assert_eq!(decoded.pmu_configs[0].chnam.len(), 2);

        // The CFG-2 view pads the missing digital names with empty entries.
        let cfg2 = decoded.to_config2();
        assert_eq!(cfg2.pmu_configs[0].chnam.len(), 18);
        assert_eq!(cfg2.pmu_configs[0].chnam[2], "");
    }

    #[test]
    fn test_config3_elevation_normalized() {
        let mut config = sample_config3();
        config.pmu_configs[0].elevation = f32::INFINITY;
        let bytes = config.to_hex();
        let decoded = ConfigurationFrame3::from_hex(&bytes).unwrap();
        assert_eq!(decoded.pmu_configs[0].elevation, 0.0);
    }

    #[test]
    fn test_config3_rejects_bad_service_class() {
        let config = sample_config3();
        let mut bytes = config.to_hex();
        // The service class byte sits 27 bytes before the end of the frame:
        // window(4) + group_delay(4) + fnom(2) + data_rate(2) +
        // config_count(2) + crc(2) after it, plus lat/lon/elev before it.
        let idx = bytes.len() - 2 - 2 - 2 - 2 - 4 - 4 - 1;
        bytes[idx] = b'X';
        // Re-seal the frame.
        let crc_pos = bytes.len() - 2;
        let crc = calculate_crc(&bytes[..crc_pos]);
        bytes[crc_pos..].copy_from_slice(&crc.to_be_bytes());

        assert!(matches!(
            ConfigurationFrame3::from_hex(&bytes),
            Err(ParseError::ServiceClassUnknown { .. })
        ));
    }

    #[test]
    fn test_to_config2_mapping() {
        let config = sample_config3();
        let cfg2 = config.to_config2();

        assert_eq!(cfg2.cfg_type, 2);
        assert_eq!(
            cfg2.prefix.frame_type().unwrap(),
            crate::ieee_c37_118::common::FrameType::Config2
        );
        let block = &cfg2.pmu_configs[0];
        assert_eq!(block.station_name(), "ROGOWIEC 220kV");
        assert_eq!(block.idcode, 11);
        assert_eq!(block.phnmr, 1);
        assert_eq!(block.chnam[0], "U_SEQ+");
        // PHSCALE 1.0 re-expressed in 10^-5 units.
        assert_eq!(block.phunit[0].scale_factor, 100_000);
        assert!(!block.phunit[0].is_current());
        assert_eq!(block.anunit[0].scale_factor, 3); // 2.5 rounds away from zero
        assert_eq!(block.cfgcnt, 4);
    }
}
