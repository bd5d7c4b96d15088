//! # Synthetic Frame Generator
//!
//! Builds randomized but well-formed configuration and data frames for
//! exercising the codec and the stream pipeline. Channel layouts follow the
//! shape seen on real feeders: three phase voltages plus the positive
//! sequence, a couple of analogs, one digital status word.

use super::common::{create_sync, FrameType, PrefixFrame, StatField, Version};
use super::config::{encode_name16, ConfigurationFrame, PMUConfigurationFrame};
use super::data_frame::{
    AnalogSample, AnalogValue, DataFrame, DigitalSample, FreqValue, PMUData, PhasorSample,
    RocofValue,
};
use super::phasors::{PhasorFloatPolar, PhasorFloatRect, PhasorIntPolar, PhasorIntRect, PhasorValue};
use super::units::{AnalogUnits, DigitalUnits, MeasurementType, NominalFrequency, PhasorUnits};
use super::utils::now_to_hex;
use rand::Rng;

const PHASOR_NAMES: [&str; 4] = ["U_A", "U_B", "U_C", "U_SEQ+"];
const ANALOG_NAMES: [&str; 2] = ["P_SUM", "Q_SUM"];

fn pmu_block(station_index: usize, id_code: u16, format: u16) -> PMUConfigurationFrame {
    let phnmr = PHASOR_NAMES.len() as u16;
    let annmr = ANALOG_NAMES.len() as u16;
    let dgnmr = 1u16;

    let mut chnam: Vec<String> = PHASOR_NAMES.iter().map(|s| s.to_string()).collect();
    chnam.extend(ANALOG_NAMES.iter().map(|s| s.to_string()));
    chnam.extend((0..16).map(|i| format!("DG_{:02}", i)));

    PMUConfigurationFrame {
        stn: encode_name16(&format!("STATION{:02}", station_index)),
        idcode: id_code,
        format,
        phnmr,
        annmr,
        dgnmr,
        chnam,
        phunit: (0..phnmr)
            .map(|_| PhasorUnits {
                channel_type: 0,
                scale_factor: 915_527,
            })
            .collect(),
        anunit: (0..annmr)
            .map(|_| AnalogUnits {
                measurement_type: MeasurementType::Rms,
                scale_factor: 1,
            })
            .collect(),
        digunit: (0..dgnmr)
            .map(|_| DigitalUnits {
                normal_status_mask: 0x0000,
                valid_inputs_mask: 0xFFFF,
            })
            .collect(),
        fnom: NominalFrequency::Hz50,
        cfgcnt: 1,
    }
}

/// Builds a CFG-2 frame with `num_pmus` PMU blocks. Block IDCODEs count up
/// from `id_code`. `use_float` and `rectangular` select the FORMAT bits for
/// every block.
pub fn random_configuration_frame(
    num_pmus: u16,
    id_code: u16,
    use_float: bool,
    rectangular: bool,
) -> ConfigurationFrame {
    let mut format = 0u16;
    if rectangular {
        format |= 0x0001;
    }
    if use_float {
        format |= 0x000E;
    }

    let mut prefix = PrefixFrame::new(
        create_sync(Version::V2011, FrameType::Config2),
        id_code,
        Version::V2011,
    );
    let stamp = now_to_hex(1_000_000);
    prefix.soc = u32::from_be_bytes([stamp[0], stamp[1], stamp[2], stamp[3]]);
    prefix.fracsec = u32::from_be_bytes([0, stamp[5], stamp[6], stamp[7]]);

    ConfigurationFrame {
        prefix,
        time_base: 1_000_000,
        num_pmu: num_pmus,
        pmu_configs: (0..num_pmus)
            .map(|i| pmu_block(i as usize, id_code + i, format))
            .collect(),
        data_rate: 50,
        chk: 0,
        cfg_type: 2,
    }
}

fn random_phasor(rng: &mut impl Rng, is_float: bool, rectangular: bool) -> PhasorValue {
    if is_float {
        if rectangular {
            PhasorValue::FloatRect(PhasorFloatRect {
                real: rng.gen_range(-150_000.0..150_000.0),
                imag: rng.gen_range(-150_000.0..150_000.0),
            })
        } else {
            PhasorValue::FloatPolar(PhasorFloatPolar {
                magnitude: rng.gen_range(0.0..150_000.0),
                angle: rng.gen_range(-3.14..3.14),
            })
        }
    } else if rectangular {
        PhasorValue::IntRect(PhasorIntRect {
            real: rng.gen_range(-15_000..15_000),
            imag: rng.gen_range(-15_000..15_000),
        })
    } else {
        PhasorValue::IntPolar(PhasorIntPolar {
            magnitude: rng.gen_range(0..30_000),
            angle: rng.gen_range(-31_416..31_416),
        })
    }
}

/// Builds a data frame whose layout matches `config`, filled with random
/// measurement values.
pub fn random_data_frame(config: &ConfigurationFrame) -> DataFrame {
    let mut rng = rand::thread_rng();

    let mut prefix = PrefixFrame::new(
        create_sync(config.prefix.version, FrameType::Data),
        config.prefix.idcode,
        config.prefix.version,
    );
    prefix.soc = config.prefix.soc;
    prefix.fracsec = rng.gen_range(0..1_000_000);

    let pmu_data = config
        .pmu_configs
        .iter()
        .map(|pmu| {
            let phasors = pmu
                .chnam
                .iter()
                .take(pmu.phnmr as usize)
                .map(|name| PhasorSample {
                    name: name.clone(),
                    value: random_phasor(
                        &mut rng,
                        pmu.phasor_is_float(),
                        pmu.phasor_is_rectangular(),
                    ),
                })
                .collect();

            let freq = if pmu.freq_is_float() {
                FreqValue::Float(pmu.fnom.frequency_hz() + rng.gen_range(-0.5..0.5))
            } else {
                FreqValue::Fixed(rng.gen_range(-500..500))
            };
            let dfreq = if pmu.freq_is_float() {
                RocofValue::Float(rng.gen_range(-1.0..1.0))
            } else {
                RocofValue::Fixed(rng.gen_range(-100..100))
            };

            let analogs = pmu
                .chnam
                .iter()
                .skip(pmu.phnmr as usize)
                .take(pmu.annmr as usize)
                .map(|name| AnalogSample {
                    name: name.clone(),
                    value: if pmu.analog_is_float() {
                        AnalogValue::Float(rng.gen_range(-1000.0..1000.0))
                    } else {
                        AnalogValue::Fixed(rng.gen_range(-1000..1000))
                    },
                })
                .collect();

            let digitals = (0..16 * pmu.dgnmr as usize)
                .map(|i| DigitalSample {
                    name: pmu
                        .chnam
                        .get(pmu.phnmr as usize + pmu.annmr as usize + i)
                        .cloned()
                        .unwrap_or_default(),
                    value: rng.gen_bool(0.5),
                })
                .collect();

            PMUData {
                stat: StatField::from_raw(0x0000),
                phasors,
                freq,
                dfreq,
                analogs,
                digitals,
            }
        })
        .collect();

    DataFrame {
        prefix,
        pmu_data,
        chk: 0,
    }
}
