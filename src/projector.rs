//! Channel projection and re-serialization.
//!
//! Outbound frames are reduced to the single positive-sequence voltage
//! phasor: the channel whose name contains `U_SEQ+` (or the legacy label
//! `zgodna U` used by some feeders). Everything else — the remaining
//! phasors, all analog samples, all digital words — is dropped.
//!
//! Projected data frames always carry FREQ as an IEEE-754 float in absolute
//! Hz, regardless of the source FORMAT bit; STAT and DFREQ are preserved in
//! their original encoding. Projected configuration frames are rewritten to
//! describe the reduced layout and the target output rate. Frame size and
//! CRC are recomputed on re-serialization.

use crate::ieee_c37_118::config::ConfigurationFrame;
use crate::ieee_c37_118::data_frame::{DataFrame, FreqValue, PMUData};
use crate::ieee_c37_118::units::PhasorUnits;
use std::fmt;

/// Substrings that mark the positive-sequence voltage channel.
pub const SELECTED_PHASOR_MARKERS: [&str; 2] = ["U_SEQ+", "zgodna U"];

/// Canonical channel name stamped on projected configuration frames.
pub const PROJECTED_CHANNEL_NAME: &str = "U_SEQ+";

fn name_matches(name: &str) -> bool {
    SELECTED_PHASOR_MARKERS
        .iter()
        .any(|marker| name.contains(marker))
}

/// Projection failure: the frame carries no positive-sequence voltage
/// phasor. The frame is dropped, never substituted.
#[derive(Debug)]
pub struct SelectedPhasorAbsent {
    pub id_code: u16,
}

impl fmt::Display for SelectedPhasorAbsent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "no phasor matching {:?} in data frame from IDCODE {}",
            SELECTED_PHASOR_MARKERS, self.id_code
        )
    }
}

impl std::error::Error for SelectedPhasorAbsent {}

/// Reduces a data frame to its positive-sequence voltage phasor.
///
/// The first PMU block containing a matching phasor survives, carrying its
/// STAT word and DFREQ unchanged and its FREQ normalized to float absolute
/// Hz. `config` supplies the nominal frequency for that normalization.
pub fn project_data(
    frame: &DataFrame,
    config: &ConfigurationFrame,
) -> Result<DataFrame, SelectedPhasorAbsent> {
    let selected = frame
        .pmu_data
        .iter()
        .zip(config.pmu_configs.iter())
        .find_map(|(block, pmu_config)| {
            block
                .phasors
                .iter()
                .find(|phasor| name_matches(&phasor.name))
                .map(|phasor| (block, pmu_config, phasor))
        });

    let (block, pmu_config, phasor) = selected.ok_or(SelectedPhasorAbsent {
        id_code: frame.prefix.idcode,
    })?;

    Ok(DataFrame {
        prefix: frame.prefix.clone(),
        pmu_data: vec![PMUData {
            stat: block.stat.clone(),
            phasors: vec![phasor.clone()],
            freq: FreqValue::Float(block.freq.hz(pmu_config.fnom)),
            dfreq: block.dfreq,
            analogs: Vec::new(),
            digitals: Vec::new(),
        }],
        chk: 0,
    })
}

/// Rewrites a configuration frame to describe the projected stream: one
/// phasor channel named `U_SEQ+`, no analogs, no digitals, and the target
/// output rate. The PMU block containing the matching phasor is kept (the
/// first block when none matches); its first PHUNIT survives.
pub fn project_configuration(config: &ConfigurationFrame, output_rate: u16) -> ConfigurationFrame {
    let source_block = config
        .pmu_configs
        .iter()
        .find(|pmu| pmu.phasor_names().iter().any(|name| name_matches(name)))
        .or_else(|| config.pmu_configs.first());

    let mut projected = config.clone();
    projected.data_rate = output_rate as i16;

    let Some(source_block) = source_block else {
        // A configuration without PMU blocks only has its rate rewritten.
        projected.num_pmu = 0;
        projected.pmu_configs = Vec::new();
        return projected;
    };

    let mut block = source_block.clone();
    block.phnmr = 1;
    block.annmr = 0;
    block.dgnmr = 0;
    block.chnam = vec![PROJECTED_CHANNEL_NAME.to_string()];
    block.phunit = vec![block.phunit.first().cloned().unwrap_or(PhasorUnits {
        channel_type: 0,
        scale_factor: 0,
    })];
    block.anunit = Vec::new();
    block.digunit = Vec::new();

    projected.num_pmu = 1;
    projected.pmu_configs = vec![block];
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ieee_c37_118::data_frame::RocofValue;
    use crate::ieee_c37_118::random::{random_configuration_frame, random_data_frame};

    #[test]
    fn test_project_configuration() {
        // Four phasors (U_A, U_B, U_C, U_SEQ+), two analogs, one digital word.
        let config = random_configuration_frame(1, 7, false, true);
        let projected = project_configuration(&config, 10);

        assert_eq!(projected.num_pmu, 1);
        let block = &projected.pmu_configs[0];
        assert_eq!(block.phnmr, 1);
        assert_eq!(block.annmr, 0);
        assert_eq!(block.dgnmr, 0);
        assert_eq!(block.chnam, vec!["U_SEQ+".to_string()]);
        assert_eq!(block.phunit.len(), 1);
        assert_eq!(block.phunit[0], config.pmu_configs[0].phunit[0]);
        assert!(block.anunit.is_empty());
        assert!(block.digunit.is_empty());
        assert_eq!(projected.data_rate, 10);

        // The projected frame re-parses cleanly.
        let bytes = projected.to_hex();
        let decoded = crate::ieee_c37_118::config::ConfigurationFrame::from_hex(&bytes).unwrap();
        assert_eq!(decoded.pmu_configs[0].chnam, vec!["U_SEQ+".to_string()]);
    }

    #[test]
    fn test_project_data_keeps_stat_and_rocof() {
        let config = random_configuration_frame(1, 7, false, true);
        let frame = random_data_frame(&config);

        let projected = project_data(&frame, &config).unwrap();
        assert_eq!(projected.pmu_data.len(), 1);

        let block = &projected.pmu_data[0];
        assert_eq!(block.phasors.len(), 1);
        assert!(block.analogs.is_empty());
        assert!(block.digitals.is_empty());
        assert_eq!(block.phasors[0].name, "U_SEQ+");
        assert_eq!(block.phasors[0].value, frame.pmu_data[0].phasors[3].value);

        // STAT and DFREQ preserved byte-for-byte, FREQ normalized to float.
        assert_eq!(block.stat.to_raw(), frame.pmu_data[0].stat.to_raw());
        assert_eq!(block.dfreq, frame.pmu_data[0].dfreq);
        match block.freq {
            FreqValue::Float(hz) => {
                let expected = frame.pmu_data[0]
                    .freq
                    .hz(config.pmu_configs[0].fnom);
                assert_eq!(hz, expected);
            }
            FreqValue::Fixed(_) => panic!("projected FREQ must be float"),
        }
    }

    #[test]
    fn test_projected_data_wire_layout() {
        // Fixed-point source: projected frame is prefix(14) + stat(2) +
        // phasor(4) + freq(4, forced float) + dfreq(2, still fixed) + crc(2).
        let config = random_configuration_frame(1, 7, false, true);
        let frame = random_data_frame(&config);
        let projected = project_data(&frame, &config).unwrap();
        let bytes = projected.to_hex();

        assert_eq!(bytes.len(), 14 + 2 + 4 + 4 + 2 + 2);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]) as usize, bytes.len());
        assert!(matches!(projected.pmu_data[0].dfreq, RocofValue::Fixed(_)));
    }

    #[test]
    fn test_selected_phasor_absent() {
        let config = random_configuration_frame(1, 7, false, true);
        let mut frame = random_data_frame(&config);
        for phasor in &mut frame.pmu_data[0].phasors {
            phasor.name = "I_A".to_string();
        }

        let err = project_data(&frame, &config).unwrap_err();
        assert_eq!(err.id_code, 7);
    }

    #[test]
    fn test_legacy_marker_matches() {
        let config = random_configuration_frame(1, 7, false, true);
        let mut frame = random_data_frame(&config);
        frame.pmu_data[0].phasors[1].name = "skladowa zgodna U".to_string();
        frame.pmu_data[0].phasors[3].name = "I_A".to_string();

        let projected = project_data(&frame, &config).unwrap();
        assert_eq!(projected.pmu_data[0].phasors[0].name, "skladowa zgodna U");
    }

    #[test]
    fn test_multi_block_projection_picks_matching_block() {
        let config = random_configuration_frame(3, 100, true, false);
        let mut frame = random_data_frame(&config);
        // Strip the marker from the first two blocks.
        for block in frame.pmu_data.iter_mut().take(2) {
            for phasor in &mut block.phasors {
                phasor.name = phasor.name.replace("U_SEQ+", "U_X");
            }
        }

        let projected = project_data(&frame, &config).unwrap();
        assert_eq!(
            projected.pmu_data[0].phasors[0].value,
            frame.pmu_data[2].phasors[3].value
        );
        assert_eq!(
            projected.pmu_data[0].stat.to_raw(),
            frame.pmu_data[2].stat.to_raw()
        );
    }
}
