//! # IEEE C37.118 Configuration Frames (CFG-1 / CFG-2)
//!
//! Configuration frames describe the layout of the data frames a PMU or PDC
//! emits: channel counts, FORMAT bits, channel names, unit conversion
//! records, nominal frequency and data rate. CFG-1 (capabilities) and CFG-2
//! (current configuration) share one wire layout and differ only in the
//! frame-type bits.
//!
//! ## Key Components
//!
//! - `PMUConfigurationFrame`: one PMU block, including the FORMAT-derived
//!   field sizes consulted by the data-frame decoder.
//! - `ConfigurationFrame`: a complete frame with prefix, time base, PMU
//!   blocks, stream data rate and checksum.

use super::common::{FrameType, ParseError, PrefixFrame};
use super::units::{AnalogUnits, DigitalUnits, NominalFrequency, PhasorUnits};
use super::utils::{calculate_crc, validate_checksum, ByteReader};
use serde::{Deserialize, Serialize};

/// Decodes a fixed 16-byte channel or station name, trimming NUL padding.
pub(crate) fn decode_name16(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

/// Encodes a name into the fixed 16-byte NUL-padded wire form.
pub(crate) fn encode_name16(name: &str) -> [u8; 16] {
    let mut out = [0u8; 16];
    let bytes = name.as_bytes();
    let n = bytes.len().min(16);
    out[..n].copy_from_slice(&bytes[..n]);
    out
}

/// One PMU block of a CFG-1/CFG-2 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PMUConfigurationFrame {
    pub stn: [u8; 16], // station name, NUL padded
    pub idcode: u16,
    pub format: u16,
    pub phnmr: u16,
    pub annmr: u16,
    pub dgnmr: u16,
    pub chnam: Vec<String>, // phnmr + annmr + 16 * dgnmr names
    pub phunit: Vec<PhasorUnits>,
    pub anunit: Vec<AnalogUnits>,
    pub digunit: Vec<DigitalUnits>,
    pub fnom: NominalFrequency,
    pub cfgcnt: u16,
}

impl PMUConfigurationFrame {
    /// Parses one PMU block from the cursor.
    pub fn from_reader(reader: &mut ByteReader) -> Result<Self, ParseError> {
        let mut stn = [0u8; 16];
        stn.copy_from_slice(reader.read_bytes(16)?);
        let idcode = reader.read_u16()?;
        let format = reader.read_u16()?;
        let phnmr = reader.read_u16()?;
        let annmr = reader.read_u16()?;
        let dgnmr = reader.read_u16()?;

        let name_count = phnmr as usize + annmr as usize + 16 * dgnmr as usize;
        let mut chnam = Vec::with_capacity(name_count);
        for _ in 0..name_count {
            chnam.push(decode_name16(reader.read_bytes(16)?));
        }

        let mut phunit = Vec::with_capacity(phnmr as usize);
        for _ in 0..phnmr {
            phunit.push(PhasorUnits::from_hex(reader.read_bytes(4)?)?);
        }
        let mut anunit = Vec::with_capacity(annmr as usize);
        for _ in 0..annmr {
            anunit.push(AnalogUnits::from_hex(reader.read_bytes(4)?)?);
        }
        let mut digunit = Vec::with_capacity(dgnmr as usize);
        for _ in 0..dgnmr {
            digunit.push(DigitalUnits::from_hex(reader.read_bytes(4)?)?);
        }

        let fnom = NominalFrequency::from_raw(reader.read_u16()?);
        let cfgcnt = reader.read_u16()?;

        Ok(PMUConfigurationFrame {
            stn,
            idcode,
            format,
            phnmr,
            annmr,
            dgnmr,
            chnam,
            phunit,
            anunit,
            digunit,
            fnom,
            cfgcnt,
        })
    }

    /// Serializes the PMU block to its wire form.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.wire_size());
        result.extend_from_slice(&self.stn);
        result.extend_from_slice(&self.idcode.to_be_bytes());
        result.extend_from_slice(&self.format.to_be_bytes());
        result.extend_from_slice(&self.phnmr.to_be_bytes());
        result.extend_from_slice(&self.annmr.to_be_bytes());
        result.extend_from_slice(&self.dgnmr.to_be_bytes());

        for name in &self.chnam {
            result.extend_from_slice(&encode_name16(name));
        }
        for ph in &self.phunit {
            result.extend_from_slice(&ph.to_hex());
        }
        for an in &self.anunit {
            result.extend_from_slice(&an.to_hex());
        }
        for dg in &self.digunit {
            result.extend_from_slice(&dg.to_hex());
        }
        result.extend_from_slice(&self.fnom.to_raw().to_be_bytes());
        result.extend_from_slice(&self.cfgcnt.to_be_bytes());

        result
    }

    /// Size of this block on the wire.
    pub fn wire_size(&self) -> usize {
        let names = self.phnmr as usize + self.annmr as usize + 16 * self.dgnmr as usize;
        let units = self.phnmr as usize + self.annmr as usize + self.dgnmr as usize;
        26 + 16 * names + 4 * units + 4
    }

    pub fn station_name(&self) -> String {
        String::from_utf8_lossy(&self.stn)
            .trim_end_matches('\0')
            .trim_end()
            .to_string()
    }

    pub fn freq_is_float(&self) -> bool {
        self.format & 0x0008 != 0
    }

    pub fn analog_is_float(&self) -> bool {
        self.format & 0x0004 != 0
    }

    pub fn phasor_is_float(&self) -> bool {
        self.format & 0x0002 != 0
    }

    pub fn phasor_is_rectangular(&self) -> bool {
        self.format & 0x0001 != 0
    }

    /// FREQ and DFREQ field size in a data frame: 4 bytes float, 2 fixed.
    pub fn freq_dfreq_size(&self) -> usize {
        if self.freq_is_float() {
            4
        } else {
            2
        }
    }

    /// Analog field size in a data frame.
    pub fn analog_size(&self) -> usize {
        if self.analog_is_float() {
            4
        } else {
            2
        }
    }

    /// Phasor field size in a data frame.
    pub fn phasor_size(&self) -> usize {
        if self.phasor_is_float() {
            8
        } else {
            4
        }
    }

    /// Channel names of the phasor channels only.
    pub fn phasor_names(&self) -> &[String] {
        &self.chnam[..(self.phnmr as usize).min(self.chnam.len())]
    }

    /// Size of this PMU's section in a data frame (STAT included).
    pub fn data_block_size(&self) -> usize {
        2 + self.phasor_size() * self.phnmr as usize
            + 2 * self.freq_dfreq_size()
            + self.analog_size() * self.annmr as usize
            + 2 * self.dgnmr as usize
    }
}

/// A complete CFG-1 or CFG-2 frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationFrame {
    pub prefix: PrefixFrame,
    pub time_base: u32,
    pub num_pmu: u16,
    pub pmu_configs: Vec<PMUConfigurationFrame>,
    pub data_rate: i16,
    pub chk: u16,
    pub cfg_type: u8, // 1 or 2
}

impl ConfigurationFrame {
    /// Parses a full configuration frame, validating frame size and CRC.
    ///
    /// Padding bytes between the data rate and the CRC are tolerated; some
    /// sources emit them.
    pub fn from_hex(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() < 16 {
            return Err(ParseError::FrameTruncated {
                message: format!(
                    "expected at least 16 bytes for a configuration frame, got {}",
                    bytes.len()
                ),
            });
        }
        let prefix = PrefixFrame::from_hex(bytes)?;

        let cfg_type = match prefix.frame_type()? {
            FrameType::Config1 => 1,
            FrameType::Config2 => 2,
            other => {
                return Err(ParseError::UnknownFrameType {
                    message: format!("expected a CFG-1/CFG-2 frame, got {}", other),
                })
            }
        };

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
        let time_base = reader.read_u32()?;
        let num_pmu = reader.read_u16()?;

        let mut pmu_configs = Vec::with_capacity(num_pmu as usize);
        for _ in 0..num_pmu {
            pmu_configs.push(PMUConfigurationFrame::from_reader(&mut reader)?);
        }

        let data_rate = reader.read_i16()?;
        let chk = u16::from_be_bytes([bytes[bytes.len() - 2], bytes[bytes.len() - 1]]);

        Ok(ConfigurationFrame {
            prefix,
            time_base,
            num_pmu,
            pmu_configs,
            data_rate,
            chk,
            cfg_type,
        })
    }

    /// Serializes the frame: body first, then the framesize field is patched
    /// at offset 2 and the CRC appended.
    pub fn to_hex(&self) -> Vec<u8> {
        let mut result = Vec::new();
        result.extend_from_slice(&self.prefix.to_hex());
        result.extend_from_slice(&self.time_base.to_be_bytes());
        result.extend_from_slice(&self.num_pmu.to_be_bytes());
        for pmu in &self.pmu_configs {
            result.extend_from_slice(&pmu.to_hex());
        }
        result.extend_from_slice(&self.data_rate.to_be_bytes());

        let framesize = (result.len() + 2) as u16;
        result[2..4].copy_from_slice(&framesize.to_be_bytes());

        let chk = calculate_crc(&result);
        result.extend_from_slice(&chk.to_be_bytes());
        result
    }

    /// TIME_BASE multiplier: the low 15 bits; upper bits are reserved.
    pub fn time_multiplier(&self) -> u32 {
        self.time_base & 0x7FFF
    }

    /// Input rate in frames per second. Negative data rates mean seconds per
    /// frame.
    pub fn frames_per_second(&self) -> f64 {
        if self.data_rate > 0 {
            self.data_rate as f64
        } else if self.data_rate < 0 {
            1.0 / (-self.data_rate) as f64
        } else {
            0.0
        }
    }

    /// Sum of phasor channels over all PMU blocks.
    pub fn total_phasors(&self) -> u16 {
        self.pmu_configs.iter().map(|p| p.phnmr).sum()
    }

    /// Sum of analog channels over all PMU blocks.
    pub fn total_analogs(&self) -> u16 {
        self.pmu_configs.iter().map(|p| p.annmr).sum()
    }

    /// Sum of digital status words over all PMU blocks.
    pub fn total_digitals(&self) -> u16 {
        self.pmu_configs.iter().map(|p| p.dgnmr).sum()
    }

    /// Expected size of a data frame described by this configuration.
    pub fn calc_data_frame_size(&self) -> usize {
        16 + self
            .pmu_configs
            .iter()
            .map(|p| p.data_block_size())
            .sum::<usize>()
    }
}
