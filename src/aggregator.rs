//! Multi-PMU configuration aggregator.
//!
//! When the operator expects configuration frames from N distinct PMUs, the
//! aggregator buffers the most recent Config-2 per source IDCODE and, once
//! all N have reported, emits a single merged Config-2 describing the fleet.
//! The buffer then resets and the next cycle starts with the next
//! configuration frame.
//!
//! Insertion order is tracked explicitly so two replays of the same input
//! sequence produce byte-identical aggregates.

use crate::ieee_c37_118::config::ConfigurationFrame;
use log::warn;
use std::collections::HashMap;

pub const DEFAULT_EXPECTED_PMUS: usize = 3;
pub const DEFAULT_AGGREGATE_ID: u16 = 999;

pub struct ConfigAggregator {
    expected: usize,
    aggregate_id: u16,
    buffer: HashMap<u16, ConfigurationFrame>,
    order: Vec<u16>,
}

impl ConfigAggregator {
    /// `expected` is the number of distinct source IDCODEs to collect;
    /// `aggregate_id` is the synthetic IDCODE stamped on the merged frame.
    pub fn new(expected: usize, aggregate_id: u16) -> Self {
        ConfigAggregator {
            expected: expected.max(1),
            aggregate_id,
            buffer: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Number of distinct IDCODEs currently buffered.
    pub fn pending(&self) -> usize {
        self.order.len()
    }

    /// Stores `frame` for its IDCODE (replacing an earlier one from the same
    /// source, keeping its order slot). Returns the merged frame once the
    /// expected fleet is complete; the buffer is reset afterwards.
    pub fn insert(&mut self, frame: &ConfigurationFrame) -> Option<ConfigurationFrame> {
        let id = frame.prefix.idcode;
        if !self.buffer.contains_key(&id) {
            self.order.push(id);
        }
        self.buffer.insert(id, frame.clone());

        if self.order.len() < self.expected {
            return None;
        }

        let aggregate = self.build();
        self.buffer.clear();
        self.order.clear();
        Some(aggregate)
    }

    fn build(&self) -> ConfigurationFrame {
        let first = &self.buffer[&self.order[0]];

        let mut prefix = first.prefix.clone();
        prefix.idcode = self.aggregate_id;

        // Stream-level fields are assumed homogeneous across the fleet; a
        // member that disagrees with the first-seen one is reported and the
        // first value used regardless.
        let first_fnom = first.pmu_configs.first().map(|p| p.fnom);
        for id in &self.order[1..] {
            let member = &self.buffer[id];
            let member_fnom = member.pmu_configs.first().map(|p| p.fnom);
            if member.time_base != first.time_base
                || member.data_rate != first.data_rate
                || member_fnom != first_fnom
            {
                warn!(
                    "aggregator disagreement: IDCODE {} reports time_base={} data_rate={}, \
                     first-seen IDCODE {} reports time_base={} data_rate={}",
                    id,
                    member.time_base,
                    member.data_rate,
                    first.prefix.idcode,
                    first.time_base,
                    first.data_rate
                );
            }
        }

        // Data frames decoded against the aggregate are only well-defined
        // when every PMU block uses the same FORMAT word.
        let first_format = first.pmu_configs.first().map(|p| p.format);
        for id in &self.order {
            let member = &self.buffer[id];
            for pmu in &member.pmu_configs {
                if Some(pmu.format) != first_format {
                    warn!(
                        "aggregator disagreement: IDCODE {} block {} uses FORMAT 0x{:04X}, \
                         first-seen block uses 0x{:04X}",
                        id,
                        pmu.idcode,
                        pmu.format,
                        first_format.unwrap_or(0)
                    );
                }
            }
        }

        let pmu_configs: Vec<_> = self
            .order
            .iter()
            .flat_map(|id| self.buffer[id].pmu_configs.iter().cloned())
            .collect();

        ConfigurationFrame {
            prefix,
            time_base: first.time_base,
            num_pmu: pmu_configs.len() as u16,
            pmu_configs,
            data_rate: first.data_rate,
            chk: 0,
            cfg_type: 2,
        }
    }
}
