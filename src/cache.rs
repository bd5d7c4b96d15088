//! Per-stream configuration store.
//!
//! Data frames cannot be decoded without the configuration of their source,
//! so every Config-2 and Config-3 frame is cached here keyed by IDCODE. A
//! newly received configuration supersedes the cached one only when its
//! change count is greater or equal; entries are never deleted. Config-3
//! entries additionally keep their Config-2-shaped view, which is what the
//! data-frame decoder consumes.
//!
//! The cache is internally synchronized and never serializes frame
//! processing: readers take a short consistent snapshot by cloning the
//! slot's `Arc` under a read lock, and a write holds the map lock only long
//! enough to swap that `Arc`. Each IDCODE's slot is written by the listener
//! task handling that IDCODE's socket, so writes to one slot do not race.

use crate::ieee_c37_118::config::ConfigurationFrame;
use crate::ieee_c37_118::config3::ConfigurationFrame3;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
pub struct ConfigCache {
    cfg2_by_idcode: RwLock<HashMap<u16, Arc<ConfigurationFrame>>>,
    cfg3_by_idcode: RwLock<HashMap<u16, Arc<ConfigurationFrame3>>>,
    cfg3_views: RwLock<HashMap<u16, Arc<ConfigurationFrame>>>,
    latest_cfg2: RwLock<Option<Arc<ConfigurationFrame>>>,
    latest_cfg3: RwLock<Option<Arc<ConfigurationFrame3>>>,
}

fn change_count(frame: &ConfigurationFrame) -> u16 {
    frame.pmu_configs.first().map(|p| p.cfgcnt).unwrap_or(0)
}

// A poisoned lock only means another task panicked mid-swap of an Arc; the
// map itself is still consistent, so recover the guard.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

impl ConfigCache {
    pub fn new() -> Self {
        ConfigCache::default()
    }

    /// Caches a Config-2 (or Config-1) frame and returns the entry now in
    /// effect for its IDCODE. A frame with a lower change count than the
    /// cached one is ignored.
    pub fn insert_cfg2(&self, frame: ConfigurationFrame) -> Arc<ConfigurationFrame> {
        let id = frame.prefix.idcode;
        let stored = {
            let mut map = write(&self.cfg2_by_idcode);
            match map.get(&id) {
                Some(existing) if change_count(&frame) < change_count(existing) => {
                    existing.clone()
                }
                _ => {
                    let shared = Arc::new(frame);
                    map.insert(id, shared.clone());
                    shared
                }
            }
        };
        *write(&self.latest_cfg2) = Some(stored.clone());
        stored
    }

    /// Caches a Config-3 frame along with its Config-2-shaped view and
    /// returns the entry now in effect for its IDCODE.
    pub fn insert_cfg3(&self, frame: ConfigurationFrame3) -> Arc<ConfigurationFrame3> {
        let id = frame.prefix.idcode;
        let stored = {
            let mut map = write(&self.cfg3_by_idcode);
            match map.get(&id) {
                Some(existing) if frame.config_count < existing.config_count => existing.clone(),
                _ => {
                    let shared = Arc::new(frame);
                    let view = Arc::new(shared.to_config2());
                    map.insert(id, shared.clone());
                    write(&self.cfg3_views).insert(id, view);
                    shared
                }
            }
        };
        *write(&self.latest_cfg3) = Some(stored.clone());
        stored
    }

    /// The configuration a data frame from `id_code` must be decoded
    /// against: the cached Config-2, or the Config-2 view of a cached
    /// Config-3. The returned `Arc` is a snapshot; a concurrent update
    /// swaps the slot without disturbing it.
    pub fn resolve(&self, id_code: u16) -> Option<Arc<ConfigurationFrame>> {
        if let Some(found) = read(&self.cfg2_by_idcode).get(&id_code) {
            return Some(found.clone());
        }
        read(&self.cfg3_views).get(&id_code).cloned()
    }

    /// Most recently cached Config-2, for single-stream use.
    pub fn latest_cfg2(&self) -> Option<Arc<ConfigurationFrame>> {
        read(&self.latest_cfg2).clone()
    }

    /// Most recently cached Config-3, for single-stream use.
    pub fn latest_cfg3(&self) -> Option<Arc<ConfigurationFrame3>> {
        read(&self.latest_cfg3).clone()
    }
}
