//! Frame-processing pipeline.
//!
//! The synchronous core of the reductor: bytes in, zero or more re-serialized
//! frames out. Configuration frames update the cache and feed the
//! aggregator; when the expected fleet is complete the merged configuration
//! is projected and emitted. Data frames resolve their configuration, pass
//! the rate reducer, and leave projected. Header and command frames are
//! logged and dropped.
//!
//! All I/O stays outside, and there is no global lock on the hot path:
//! every listener task calls [`StreamProcessor::process`] through a shared
//! reference and runs decode, projection and encode on its own. The cache
//! hands out `Arc` snapshots under short read locks; only the aggregator
//! buffer, the reducer accumulator and the missing-configuration log filter
//! sit behind their own mutexes, each held for O(1) work plus the
//! occasional O(N) aggregate build.

use crate::aggregator::ConfigAggregator;
use crate::cache::ConfigCache;
use crate::ieee_c37_118::common::ParseError;
use crate::ieee_c37_118::utils::timestamp_ns;
use crate::ieee_c37_118::Frame;
use crate::projector::{project_configuration, project_data};
use crate::reducer::RateReducer;
use log::{debug, log_enabled, warn, Level};
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

// The guarded state stays consistent across a panic in another task; keep
// the guard and continue.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct StreamProcessor {
    cache: ConfigCache,
    aggregator: Mutex<ConfigAggregator>,
    reducer: Mutex<RateReducer>,
    output_rate: u16,
    missing_config_reported: Mutex<HashSet<u16>>,
}

impl StreamProcessor {
    pub fn new(output_rate: u16, expected_pmus: usize, aggregate_id: u16) -> Self {
        StreamProcessor {
            cache: ConfigCache::new(),
            aggregator: Mutex::new(ConfigAggregator::new(expected_pmus, aggregate_id)),
            reducer: Mutex::new(RateReducer::new(output_rate)),
            output_rate,
            missing_config_reported: Mutex::new(HashSet::new()),
        }
    }

    /// Processes one received frame and returns the frames to forward.
    ///
    /// Every error is confined to the offending frame; the stream always
    /// continues. Safe to call concurrently from any number of intake
    /// tasks.
    pub fn process(&self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let frame = match Frame::from_hex(bytes, |id| self.cache.resolve(id)) {
            Ok(frame) => frame,
            Err(ParseError::MissingConfiguration { id_code }) => {
                // Log once per IDCODE; a PMU that streams data before its
                // configuration does so for every frame.
                if lock(&self.missing_config_reported).insert(id_code) {
                    warn!(
                        "dropping data frames from IDCODE {} until a configuration arrives",
                        id_code
                    );
                } else {
                    debug!("no configuration yet for IDCODE {}, frame dropped", id_code);
                }
                return Vec::new();
            }
            Err(err) => {
                warn!("frame dropped: {}", err);
                return Vec::new();
            }
        };

        match frame {
            Frame::ConfigV2(config) => {
                let id_code = config.prefix.idcode;
                let stored = self.cache.insert_cfg2(config);
                lock(&self.missing_config_reported).remove(&id_code);
                if log_enabled!(Level::Debug) {
                    if let Ok(json) = serde_json::to_string(stored.as_ref()) {
                        debug!("cached configuration for IDCODE {}: {}", id_code, json);
                    }
                }

                // The aggregator lock covers the buffer update and (once per
                // fleet) the merge; projection and encode run outside it.
                let (aggregate, pending) = {
                    let mut aggregator = lock(&self.aggregator);
                    let aggregate = aggregator.insert(&stored);
                    let pending = aggregator.pending();
                    (aggregate, pending)
                };

                match aggregate {
                    Some(aggregate) => {
                        debug!(
                            "fleet complete, emitting aggregate IDCODE {} with {} PMU blocks",
                            aggregate.prefix.idcode, aggregate.num_pmu
                        );
                        vec![project_configuration(&aggregate, self.output_rate).to_hex()]
                    }
                    None => {
                        debug!(
                            "buffered configuration from IDCODE {} ({} of the fleet seen)",
                            id_code, pending
                        );
                        Vec::new()
                    }
                }
            }
            Frame::ConfigV3(config) => {
                let id_code = config.prefix.idcode;
                self.cache.insert_cfg3(config);
                lock(&self.missing_config_reported).remove(&id_code);
                debug!("cached CFG-3 for IDCODE {}", id_code);
                Vec::new()
            }
            Frame::Data(data) => {
                let Some(config) = self.cache.resolve(data.prefix.idcode) else {
                    // The resolver just produced this configuration; it
                    // cannot disappear, the cache never deletes entries.
                    return Vec::new();
                };

                debug!(
                    "data frame from IDCODE {} at {} ns",
                    data.prefix.idcode,
                    timestamp_ns(
                        data.prefix.soc,
                        data.prefix.fracsec,
                        config.time_multiplier()
                    )
                );

                let emit = {
                    let mut reducer = lock(&self.reducer);
                    reducer.set_input_rate(config.frames_per_second());
                    reducer.should_emit()
                };
                if !emit {
                    return Vec::new();
                }

                match project_data(&data, &config) {
                    Ok(projected) => vec![projected.to_hex()],
                    Err(err) => {
                        warn!("frame dropped: {}", err);
                        Vec::new()
                    }
                }
            }
            Frame::Header(header) => {
                debug!(
                    "header frame from IDCODE {}: {}",
                    header.prefix.idcode,
                    header.text().trim()
                );
                Vec::new()
            }
            Frame::Command(prefix) => {
                debug!("command frame from IDCODE {} ignored", prefix.idcode);
                Vec::new()
            }
        }
    }

    /// The configuration currently resolving for `id_code`, if any.
    pub fn resolve(
        &self,
        id_code: u16,
    ) -> Option<std::sync::Arc<crate::ieee_c37_118::config::ConfigurationFrame>> {
        self.cache.resolve(id_code)
    }
}
