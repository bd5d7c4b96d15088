//! End-to-end pipeline tests: configuration aggregation, rate reduction,
//! projection and the capture format, exercised through the same
//! `StreamProcessor` the UDP listeners share.

use frame_reductor::ieee_c37_118::config::ConfigurationFrame;
use frame_reductor::ieee_c37_118::data_frame::{DataFrame, FreqValue};
use frame_reductor::ieee_c37_118::random::{random_configuration_frame, random_data_frame};
use frame_reductor::pipeline::StreamProcessor;
use frame_reductor::playback::{decode_hex_line, encode_hex};

#[test]
fn aggregates_fleet_then_reduces_and_projects_data() {
    let processor = StreamProcessor::new(10, 3, 999);

    // Three PMUs report their configurations.
    let configs: Vec<_> = [7u16, 11, 13]
        .iter()
        .map(|&id| random_configuration_frame(1, id, true, true))
        .collect();

    let mut aggregate_bytes = Vec::new();
    for config in &configs {
        for emitted in processor.process(&config.to_hex()) {
            aggregate_bytes.push(emitted);
        }
    }
    assert_eq!(aggregate_bytes.len(), 1, "one aggregate for the full fleet");

    let aggregate = ConfigurationFrame::from_hex(&aggregate_bytes[0]).unwrap();
    assert_eq!(aggregate.prefix.idcode, 999);
    assert_eq!(aggregate.data_rate, 10);
    assert_eq!(aggregate.pmu_configs[0].chnam, vec!["U_SEQ+".to_string()]);

    // Each PMU streams 50 data frames at 50 fps; the reducer passes a tenth
    // of the combined stream.
    let mut emitted_data = Vec::new();
    for _ in 0..50 {
        for config in &configs {
            emitted_data.extend(processor.process(&random_data_frame(config).to_hex()));
        }
    }
    assert_eq!(emitted_data.len(), 30, "150 input frames reduced 5:1");

    // Every emitted frame is projected and decodes against its source's
    // projected configuration.
    for bytes in &emitted_data {
        let source_id = u16::from_be_bytes([bytes[4], bytes[5]]);
        let source = configs
            .iter()
            .find(|c| c.prefix.idcode == source_id)
            .expect("emitted frame comes from a known PMU");
        let projected_config =
            frame_reductor::projector::project_configuration(source, 10);
        let frame = DataFrame::from_hex(bytes, &projected_config).unwrap();

        assert_eq!(frame.pmu_data.len(), 1);
        let block = &frame.pmu_data[0];
        assert_eq!(block.phasors.len(), 1);
        assert!(block.analogs.is_empty());
        assert!(block.digitals.is_empty());
        assert!(matches!(block.freq, FreqValue::Float(_)));
    }
}

#[test]
fn data_frames_before_configuration_are_dropped() {
    let processor = StreamProcessor::new(10, 1, 999);
    let config = random_configuration_frame(1, 77, false, true);

    for _ in 0..5 {
        assert!(processor
            .process(&random_data_frame(&config).to_hex())
            .is_empty());
    }

    // Once the configuration arrives the stream flows.
    processor.process(&config.to_hex());
    let mut emitted = 0;
    for _ in 0..50 {
        emitted += processor.process(&random_data_frame(&config).to_hex()).len();
    }
    assert_eq!(emitted, 10);
}

#[test]
fn capture_lines_replay_through_the_processor() {
    // A frame that crossed the capture sink's hex format processes the same
    // as the original bytes.
    let config = random_configuration_frame(1, 5, false, false);
    let config_bytes = config.to_hex();
    let line = encode_hex(&config_bytes);
    let replayed = decode_hex_line(&line).unwrap();
    assert_eq!(replayed, config_bytes);

    let processor = StreamProcessor::new(50, 1, 999);
    assert_eq!(processor.process(&replayed).len(), 1);
}
