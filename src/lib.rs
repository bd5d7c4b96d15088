//! # frame-reductor
//!
//! A streaming frame processor for the IEEE C37.118 synchrophasor protocol.
//! It ingests frames from PMUs or PDCs over UDP (or from hex-dump capture
//! files), decodes the binary wire format, merges multi-PMU configuration
//! fleets into one aggregated Config-2, down-samples data frames to a target
//! rate, projects every frame onto the positive-sequence voltage phasor, and
//! forwards the re-serialized stream over UDP or TCP.
//!
//! ## Modules
//!
//! - [`ieee_c37_118`]: the wire codec — common prefix, CFG-1/2, CFG-3, data
//!   and header frames, CRC-CCITT.
//! - [`cache`]: per-IDCODE configuration store gating data-frame decode.
//! - [`aggregator`]: multi-PMU Config-2 aggregation.
//! - [`reducer`]: deterministic accumulator-based rate reduction.
//! - [`projector`]: channel projection and FREQ normalization.
//! - [`pipeline`]: the synchronous frame-processing core.
//! - [`listener`]: UDP intake tasks.
//! - [`dispatcher`]: outbound UDP/TCP transports.
//! - [`playback`]: hex-dump playback and capture.

pub mod aggregator;
pub mod cache;
pub mod dispatcher;
pub mod ieee_c37_118;
pub mod listener;
pub mod pipeline;
pub mod playback;
pub mod projector;
pub mod reducer;
